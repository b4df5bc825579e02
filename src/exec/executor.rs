//! Bounded execution of allowlisted solver binaries

use crate::config::settings::SolverConfig;
use crate::config::types::{Result, SolveError, SolveOptions, SolveResult};
use crate::config::validator::{validate_options, validate_upload};
use crate::exec::args::{build_solve_args, SolveInvocation};
use crate::exec::context::SolveContext;
use crate::extract::{extract_with_dimensions, probe_dimensions};
use crate::observability::audit::{events, input_digest};
use crate::runtime::security::{authorize, SolverBinary};
use crate::safety::workspace::{ScratchArea, StagedArtifacts};
use crate::utils::output::{CombinedOutput, OutputCollector};
use nix::fcntl::OFlag;
use nix::sys::signal::{kill, killpg, Signal};
use nix::unistd::{pipe2, Pid};
use std::ffi::OsStr;
use std::fs::File;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Time between SIGTERM and SIGKILL for the process group
const TERM_GRACE: Duration = Duration::from_millis(200);

/// How long to wait for the output pipe to close after the child is reaped
const OUTPUT_GRACE: Duration = Duration::from_secs(1);

/// What happened to one child process
#[derive(Debug)]
pub struct ProcessOutcome {
    /// Exit status, if the child could be reaped
    pub status: Option<ExitStatus>,
    /// Deadline passed or cancellation requested before exit
    pub timed_out: bool,
    pub output: CombinedOutput,
    pub elapsed: Duration,
}

impl ProcessOutcome {
    pub fn success(&self) -> bool {
        !self.timed_out && self.status.map(|s| s.success()).unwrap_or(false)
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.status.and_then(|s| s.code())
    }
}

/// Runs allowlisted binaries under a wall-clock budget and turns solver runs
/// into [`SolveResult`]s
pub struct Executor {
    config: SolverConfig,
}

impl Executor {
    pub fn new(config: SolverConfig) -> Self {
        Self {
            config: config.clamped(),
        }
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Run a companion tool by name. Names outside the allowlist fail before
    /// anything is spawned.
    pub fn execute_named<S: AsRef<OsStr>>(
        &self,
        name: &str,
        args: &[S],
        ctx: &SolveContext,
    ) -> Result<String> {
        let binary = authorize(name)?;
        self.execute(binary, args, ctx)
    }

    /// Run a tool to completion and return its trimmed combined output
    pub fn execute<S: AsRef<OsStr>>(
        &self,
        binary: SolverBinary,
        args: &[S],
        ctx: &SolveContext,
    ) -> Result<String> {
        let outcome = self.run(binary, args, ctx)?;
        if outcome.timed_out {
            return Err(SolveError::Timeout {
                binary: binary.name().to_string(),
                limit: self.effective_limit(ctx),
            });
        }

        let code = outcome.exit_code();
        let output = outcome.output.text();
        if outcome.success() {
            Ok(output)
        } else {
            Err(SolveError::ProcessFailed {
                binary: binary.name().to_string(),
                code,
                output,
            })
        }
    }

    fn effective_limit(&self, ctx: &SolveContext) -> Duration {
        ctx.limit().min(self.config.timeout)
    }

    /// Spawn `binary` in its own process group and supervise it until exit,
    /// deadline or cancellation. On expiry the whole group is terminated.
    pub fn run<S: AsRef<OsStr>>(
        &self,
        binary: SolverBinary,
        args: &[S],
        ctx: &SolveContext,
    ) -> Result<ProcessOutcome> {
        let start = Instant::now();
        let deadline = ctx.deadline().min(start + self.config.timeout);
        let program = binary.program(self.config.binary_dir.as_deref());
        let launch_error = |source: std::io::Error| SolveError::LaunchFailure {
            binary: binary.name().to_string(),
            source,
        };

        // stdout and stderr share one pipe so output keeps its write order.
        // Both ends are close-on-exec: the child only keeps the dup2'd copies
        // on fds 1 and 2, never the read end or another run's pipe.
        let (read_end, write_end) =
            pipe2(OFlag::O_CLOEXEC).map_err(|e| launch_error(e.into()))?;
        let stderr_end = write_end.try_clone().map_err(launch_error)?;

        let mut cmd = Command::new(&program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(write_end))
            .stderr(Stdio::from(stderr_end))
            .process_group(0);

        log::debug!("Spawning {}", program.display());
        let spawned = cmd.spawn();
        // The parent's copies of the write end live in `cmd`
        drop(cmd);
        let mut child = spawned.map_err(|e| {
            log::warn!("Failed to launch {}: {}", program.display(), e);
            launch_error(e)
        })?;

        let pid = child.id();
        let mut collector = OutputCollector::spawn(File::from(read_end), self.config.output_limit);

        let (status, timed_out) = loop {
            match child.try_wait() {
                Ok(Some(status)) => break (Some(status), false),
                Ok(None) => {
                    if ctx.is_done() || Instant::now() >= deadline {
                        terminate_group(pid);
                        let status = child.wait().ok();
                        let elapsed_ms = start.elapsed().as_millis() as u64;
                        log::warn!(
                            "{} (pid {}) killed after {}ms{}",
                            binary,
                            pid,
                            elapsed_ms,
                            if ctx.is_cancelled() { " (cancelled)" } else { "" }
                        );
                        events::deadline_kill(binary.name(), pid, elapsed_ms);
                        break (status, true);
                    }
                    collector.drain();
                    thread::sleep(POLL_INTERVAL);
                }
                Err(e) => {
                    terminate_group(pid);
                    let _ = child.wait();
                    return Err(launch_error(e));
                }
            }
        };

        if !timed_out {
            reap_stragglers(pid);
        }

        let output = collector.finish(OUTPUT_GRACE);
        Ok(ProcessOutcome {
            status,
            timed_out,
            output,
            elapsed: start.elapsed(),
        })
    }

    /// Validate, stage, solve and release one upload.
    ///
    /// Staged files are removed when this returns, on every path, unless
    /// `options.keep_temp_files` is set.
    pub fn solve_upload(
        &self,
        ctx: &SolveContext,
        bytes: &[u8],
        filename: &str,
        options: &SolveOptions,
    ) -> Result<SolveResult> {
        let extension = validate_upload(filename, bytes.len() as u64, &self.config)?;
        for warning in validate_options(options).warnings {
            log::warn!("Option warning: {}", warning);
        }

        let digest = input_digest(bytes);
        let scratch = ScratchArea::new(&self.config.scratch_dir);
        let mut staged = scratch.stage(bytes, &extension)?;
        staged.retain(options.keep_temp_files);

        if let Some(index_path) = &self.config.index_path {
            staged.write_sibling(".cfg", backend_config(index_path).as_bytes())?;
        }

        self.solve_staged(ctx, &staged, options, digest)
    }

    /// Solve an already staged input
    pub fn solve(
        &self,
        ctx: &SolveContext,
        staged: &StagedArtifacts,
        options: &SolveOptions,
    ) -> Result<SolveResult> {
        let digest = input_digest(&std::fs::read(staged.input_path())?);
        self.solve_staged(ctx, staged, options, digest)
    }

    fn solve_staged(
        &self,
        ctx: &SolveContext,
        staged: &StagedArtifacts,
        options: &SolveOptions,
        digest: String,
    ) -> Result<SolveResult> {
        let binary = SolverBinary::SolveField;
        let config_path = staged.sibling(".cfg");
        let invocation = SolveInvocation {
            options,
            input: staged.input_path(),
            backend_config: config_path.exists().then_some(config_path.as_path()),
            time_limit: ctx.remaining().min(self.config.timeout),
        };
        let args = build_solve_args(&invocation);

        events::solve_start(staged.run_id(), binary.name(), digest);
        let outcome = self.run(binary, &args, ctx)?;
        let result = self.classify(binary, ctx, staged, outcome);
        events::solve_end(staged.run_id(), result.solved, result.solve_time);

        Ok(result)
    }

    fn classify(
        &self,
        binary: SolverBinary,
        ctx: &SolveContext,
        staged: &StagedArtifacts,
        outcome: ProcessOutcome,
    ) -> SolveResult {
        let solve_time = outcome.elapsed.as_secs_f64();
        let raw_output = outcome.output.text();

        if outcome.timed_out {
            let err = SolveError::Timeout {
                binary: binary.name().to_string(),
                limit: self.effective_limit(ctx),
            };
            return SolveResult::failed(solve_time, raw_output, &err);
        }

        let sidecar = staged.sidecar_path();
        if !sidecar.exists() {
            log::info!(
                "No solution for {} (exit code {:?})",
                staged.run_id(),
                outcome.exit_code()
            );
            return SolveResult::unsolved(solve_time, raw_output);
        }

        let dims = probe_dimensions(staged.input_path());
        match extract_with_dimensions(&sidecar, dims) {
            Ok(solution) => {
                log::info!(
                    "Solved {}: RA={:.6}, Dec={:.6}, PixelScale={:.2}, Time={:.2}s",
                    staged.run_id(),
                    solution.ra,
                    solution.dec,
                    solution.pixel_scale,
                    solve_time
                );
                SolveResult {
                    solved: true,
                    ra: Some(solution.ra),
                    dec: Some(solution.dec),
                    pixel_scale: Some(solution.pixel_scale),
                    rotation: Some(solution.rotation),
                    field_width: Some(solution.field_width),
                    field_height: Some(solution.field_height),
                    wcs_header: Some(solution.header),
                    ..SolveResult::unsolved(solve_time, raw_output)
                }
            }
            Err(err) => {
                log::error!("Solution header for {} unusable: {}", staged.run_id(), err);
                SolveResult::failed(solve_time, raw_output, &err)
            }
        }
    }
}

/// Backend configuration pointing the solver at an index directory
pub fn backend_config(index_path: &Path) -> String {
    format!("add_path {}\nautoindex\ninparallel\n", index_path.display())
}

/// Resolve every allowlisted binary, for health reporting
pub fn resolve_all(binary_dir: Option<&Path>) -> Vec<(SolverBinary, Option<PathBuf>)> {
    SolverBinary::ALL
        .iter()
        .map(|b| (*b, crate::runtime::security::locate(*b, binary_dir)))
        .collect()
}

// SIGTERM the group, give it a moment, then SIGKILL whatever is left
fn terminate_group(pid: u32) {
    let pgid = Pid::from_raw(pid as i32);

    if let Err(e) = killpg(pgid, Signal::SIGTERM) {
        log::debug!("Group SIGTERM to {} failed ({}), signalling leader", pid, e);
        let _ = kill(pgid, Signal::SIGTERM);
    }

    thread::sleep(TERM_GRACE);

    if let Err(e) = killpg(pgid, Signal::SIGKILL) {
        log::debug!("Group SIGKILL to {} failed ({}), signalling leader", pid, e);
        let _ = kill(pgid, Signal::SIGKILL);
    }
}

// Descendants left behind by a leader that already exited. The group id
// can't be reused while any member is alive.
fn reap_stragglers(pid: u32) {
    if killpg(Pid::from_raw(pid as i32), Signal::SIGKILL).is_ok() {
        log::debug!("Killed leftover members of process group {}", pid);
    }
}
