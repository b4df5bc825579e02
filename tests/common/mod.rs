//! Shared harness: a scratch root, a binary directory of stub solver scripts,
//! and a marker directory the stubs can write evidence into.

#![allow(dead_code)]

use platesolve::config::settings::SolverConfig;
use platesolve::Executor;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

/// Header fixture with a known CD matrix: 3.66 arcsec/px, no rotation
pub const REFERENCE_HEADER: &str = "\
SIMPLE  = T
CTYPE1  = 'RA---TAN' / gnomonic projection
CRVAL1  = 10.684 / RA of reference point
CRVAL2  = 41.269 / Dec of reference point
CD1_1   = -0.0010177
CD1_2   = 0.0
CD2_1   = 0.0
CD2_2   = 0.0010177
IMAGEW  = 1000
IMAGEH  = 800
";

pub struct Harness {
    _root: TempDir,
    pub scratch: PathBuf,
    pub bin: PathBuf,
    pub marks: PathBuf,
}

impl Harness {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        let scratch = root.path().join("scratch");
        let bin = root.path().join("bin");
        let marks = root.path().join("marks");
        for dir in [&scratch, &bin, &marks] {
            std::fs::create_dir(dir).unwrap();
        }
        Self {
            _root: root,
            scratch,
            bin,
            marks,
        }
    }

    pub fn config(&self) -> SolverConfig {
        SolverConfig {
            index_path: None,
            scratch_dir: self.scratch.clone(),
            binary_dir: Some(self.bin.clone()),
            timeout: Duration::from_secs(30),
            ..SolverConfig::default()
        }
    }

    pub fn executor(&self) -> Executor {
        Executor::new(self.config())
    }

    /// Install an executable `sh` script under `name`. The body can use
    /// `$INPUT` (last argument), `$BASE` (input without extension) and
    /// `$MARKS`.
    pub fn install_stub(&self, name: &str, body: &str) -> PathBuf {
        let path = self.bin.join(name);
        let script = format!(
            "#!/bin/sh\nMARKS='{}'\nfor INPUT in \"$@\"; do :; done\nBASE=\"${{INPUT%.*}}\"\n{}\n",
            self.marks.display(),
            body
        );
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    /// Stub that writes `header` as the solution sidecar
    pub fn install_solving_stub(&self, header: &str) -> PathBuf {
        self.install_stub(
            "solve-field",
            &format!(
                "echo \"Field 1: solved with index 4107\"\ncat > \"$BASE.wcs\" <<'HDR'\n{}HDR\ntouch \"$BASE.axy\" \"$BASE.corr\" \"$BASE-indx.xyls\"\nexit 0",
                header
            ),
        )
    }

    pub fn scratch_entries(&self) -> Vec<String> {
        entries(&self.scratch)
    }

    pub fn mark(&self, name: &str) -> PathBuf {
        self.marks.join(name)
    }
}

pub fn entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    names
}

/// Liveness via /proc; a zombie counts as gone
pub fn process_alive(pid: i32) -> bool {
    match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
        Ok(stat) => {
            let state = stat
                .rsplit_once(") ")
                .and_then(|(_, rest)| rest.chars().next());
            !matches!(state, Some('Z') | Some('X') | None)
        }
        Err(_) => false,
    }
}

/// Poll until `pid` is gone or `within` elapses
pub fn wait_gone(pid: i32, within: Duration) -> bool {
    let deadline = std::time::Instant::now() + within;
    while std::time::Instant::now() < deadline {
        if !process_alive(pid) {
            return true;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    !process_alive(pid)
}

/// Wait for a marker file and parse its first line as a pid
pub fn read_pid(path: &Path, within: Duration) -> i32 {
    let deadline = std::time::Instant::now() + within;
    loop {
        if let Ok(text) = std::fs::read_to_string(path) {
            if let Ok(pid) = text.trim().parse() {
                return pid;
            }
        }
        assert!(
            std::time::Instant::now() < deadline,
            "no pid written to {}",
            path.display()
        );
        std::thread::sleep(Duration::from_millis(20));
    }
}
