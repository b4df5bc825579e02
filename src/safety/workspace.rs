/// Scratch staging for solver inputs and byproducts
/// Each invocation owns a disjoint set of paths under the scratch root; the
/// guard removes them on every exit path unless retention was requested.
use crate::config::types::{Result, SolveError};
use crate::observability::audit::events;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};
use uuid::Uuid;

/// Prefix shared by every staged base name
pub const STAGED_PREFIX: &str = "astro_";

/// Byproducts `solve-field` writes beside its input, keyed by suffix on the
/// input's base name. `.cfg` is the backend config staged by the pipeline.
pub const SOLVER_BYPRODUCT_SUFFIXES: &[&str] = &[
    ".wcs",
    ".solved",
    ".axy",
    ".corr",
    ".match",
    ".new",
    ".rdls",
    ".xyls",
    "-indx.xyls",
    "-indx.png",
    "-ngc.png",
    "-objs.png",
    ".cfg",
];

static STAGE_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Outcome of releasing a staged artifact set
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CleanupReport {
    pub removed: usize,
    pub failed: Vec<String>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Scratch root that hands out staged artifact sets
#[derive(Debug, Clone)]
pub struct ScratchArea {
    root: PathBuf,
}

impl ScratchArea {
    /// Wrap an existing writable directory; it is not created here
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Persist upload bytes under a fresh collision-resistant name
    pub fn stage(&self, bytes: &[u8], extension: &str) -> Result<StagedArtifacts> {
        let sequence = STAGE_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        let base_name = format!(
            "{}{}_{}_{}",
            STAGED_PREFIX,
            std::process::id(),
            sequence,
            Uuid::new_v4().simple()
        );
        self.stage_named(&base_name, bytes, extension)
    }

    /// Stage under an explicit base name. An existing file at the target path
    /// is a fatal collision and is never overwritten.
    pub(crate) fn stage_named(
        &self,
        base_name: &str,
        bytes: &[u8],
        extension: &str,
    ) -> Result<StagedArtifacts> {
        let extension = sanitize_extension(extension)?;
        let base = self.root.join(base_name);
        let input = self.root.join(format!("{}.{}", base_name, extension));

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&input) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                log::error!("Staged path collision at {}", input.display());
                return Err(SolveError::StagingCollision(input));
            }
            Err(e) => {
                return Err(SolveError::Staging(std::io::Error::new(
                    e.kind(),
                    format!("Failed to create staged file {}: {}", input.display(), e),
                )))
            }
        };

        // From here on the guard owns the file, so a failed write still cleans up.
        let staged = StagedArtifacts {
            run_id: base_name.to_string(),
            base,
            input,
            registered: Vec::new(),
            keep: false,
            released: false,
        };

        file.write_all(bytes)?;
        file.sync_all()?;
        log::debug!(
            "Staged {} bytes at {}",
            bytes.len(),
            staged.input.display()
        );
        Ok(staged)
    }

    /// Remove staged files older than `max_age` (leftovers from retained or
    /// crashed runs). Returns the number of files removed.
    pub fn sweep_stale(&self, max_age: Duration) -> Result<usize> {
        let now = SystemTime::now();
        let mut cleaned = 0;

        for entry in fs::read_dir(&self.root)? {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    log::warn!("Failed to read scratch entry: {}", e);
                    continue;
                }
            };

            let name = entry.file_name();
            if !name.to_string_lossy().starts_with(STAGED_PREFIX) {
                continue;
            }

            let path = entry.path();
            let modified = match entry.metadata().and_then(|m| m.modified()) {
                Ok(m) => m,
                Err(e) => {
                    log::warn!("Failed to get modified time for {}: {}", path.display(), e);
                    continue;
                }
            };

            let age = match now.duration_since(modified) {
                Ok(d) => d,
                Err(_) => continue,
            };

            if age >= max_age && path.is_file() {
                match fs::remove_file(&path) {
                    Ok(()) => cleaned += 1,
                    Err(e) => log::warn!("Failed to remove stale {}: {}", path.display(), e),
                }
            }
        }

        Ok(cleaned)
    }
}

fn sanitize_extension(extension: &str) -> Result<String> {
    let extension = extension.trim_start_matches('.');
    if extension.is_empty() || !extension.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(SolveError::InvalidUpload(format!(
            "unusable file extension: {:?}",
            extension
        )));
    }
    Ok(extension.to_ascii_lowercase())
}

/// Input file plus every sibling the solver may write next to it.
///
/// Dropping the guard releases the set, including during unwinding.
#[derive(Debug)]
pub struct StagedArtifacts {
    run_id: String,
    base: PathBuf,
    input: PathBuf,
    registered: Vec<PathBuf>,
    keep: bool,
    released: bool,
}

impl StagedArtifacts {
    /// Unique identifier of this staging (the base file name)
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Staged upload
    pub fn input_path(&self) -> &Path {
        &self.input
    }

    /// Coordinate header the solver writes on success
    pub fn sidecar_path(&self) -> PathBuf {
        self.sibling(".wcs")
    }

    /// Path sharing the input's base name with `suffix` appended
    pub fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = self.base.as_os_str().to_os_string();
        name.push(suffix);
        PathBuf::from(name)
    }

    /// Every path this guard will try to remove
    pub fn artifact_paths(&self) -> Vec<PathBuf> {
        let mut paths = vec![self.input.clone()];
        paths.extend(SOLVER_BYPRODUCT_SUFFIXES.iter().map(|s| self.sibling(s)));
        for path in &self.registered {
            if !paths.contains(path) {
                paths.push(path.clone());
            }
        }
        paths
    }

    /// Write an extra file beside the input and take ownership of it
    pub fn write_sibling(&mut self, suffix: &str, contents: &[u8]) -> Result<PathBuf> {
        let path = self.sibling(suffix);
        self.registered.push(path.clone());
        fs::write(&path, contents).map_err(|e| {
            SolveError::Staging(std::io::Error::new(
                e.kind(),
                format!("Failed to write {}: {}", path.display(), e),
            ))
        })?;
        Ok(path)
    }

    /// Transfer responsibility for the files to the caller
    pub fn retain(&mut self, keep: bool) {
        self.keep = keep;
    }

    pub fn is_retained(&self) -> bool {
        self.keep
    }

    /// Remove every artifact of this run (idempotent)
    pub fn release(&mut self) -> CleanupReport {
        let mut report = CleanupReport::default();
        if self.released {
            return report;
        }
        self.released = true;

        for path in self.artifact_paths() {
            remove_if_present(&path, &mut report);
        }

        // Catch byproducts outside the documented set; the base name is unique
        // to this run so nothing else can match.
        if let (Some(parent), Some(stem)) = (self.base.parent(), self.base.file_name()) {
            let stem = stem.to_string_lossy().to_string();
            if let Ok(entries) = fs::read_dir(parent) {
                for entry in entries.flatten() {
                    let name = entry.file_name().to_string_lossy().to_string();
                    let owned = name.strip_prefix(&stem).map_or(false, |rest| {
                        rest.starts_with('.') || rest.starts_with('-')
                    });
                    if owned {
                        remove_if_present(&entry.path(), &mut report);
                    }
                }
            }
        }

        if report.is_clean() {
            events::cleanup_success(&self.run_id, report.removed);
        } else {
            events::cleanup_failure(&self.run_id, report.failed.clone());
        }
        report
    }
}

fn remove_if_present(path: &Path, report: &mut CleanupReport) {
    match fs::remove_file(path) {
        Ok(()) => report.removed += 1,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            log::warn!("Failed to remove staged file {}: {}", path.display(), e);
            report.failed.push(path.display().to_string());
        }
    }
}

impl Drop for StagedArtifacts {
    fn drop(&mut self) {
        if self.keep {
            if !self.released {
                events::artifacts_retained(&self.run_id, &self.input.display().to_string());
            }
            return;
        }
        let _ = self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn dir_entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_stage_writes_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = ScratchArea::new(dir.path());

        let staged = scratch.stage(b"image-bytes", ".PNG").unwrap();
        assert!(staged.input_path().starts_with(dir.path()));
        assert_eq!(staged.input_path().extension().unwrap(), "png");
        assert_eq!(fs::read(staged.input_path()).unwrap(), b"image-bytes");
        assert!(staged
            .sidecar_path()
            .to_string_lossy()
            .ends_with(".wcs"));
    }

    #[test]
    fn test_drop_removes_input_and_byproducts() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = ScratchArea::new(dir.path());

        {
            let mut staged = scratch.stage(b"x", "fits").unwrap();
            for suffix in [".wcs", ".axy", "-indx.png", ".solved", ".unexpected"] {
                fs::write(staged.sibling(suffix), b"out").unwrap();
            }
            staged.write_sibling(".cfg", b"add_path /data").unwrap();
            assert_eq!(dir_entries(dir.path()).len(), 7);
        }

        assert!(dir_entries(dir.path()).is_empty());
    }

    #[test]
    fn test_release_runs_during_unwind() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = ScratchArea::new(dir.path());

        let result = std::panic::catch_unwind(|| {
            let staged = scratch.stage(b"x", "jpg").unwrap();
            fs::write(staged.sidecar_path(), b"hdr").unwrap();
            panic!("solver wrapper crashed");
        });

        assert!(result.is_err());
        assert!(dir_entries(dir.path()).is_empty());
    }

    #[test]
    fn test_retained_artifacts_survive_drop() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = ScratchArea::new(dir.path());

        let input = {
            let mut staged = scratch.stage(b"x", "jpg").unwrap();
            staged.retain(true);
            staged.input_path().to_path_buf()
        };

        assert!(input.exists());
    }

    #[test]
    fn test_release_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = ScratchArea::new(dir.path());

        let mut staged = scratch.stage(b"x", "png").unwrap();
        let first = staged.release();
        assert_eq!(first.removed, 1);
        assert!(first.is_clean());
        assert_eq!(staged.release(), CleanupReport::default());
    }

    #[test]
    fn test_staged_paths_are_unique() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = ScratchArea::new(dir.path());

        let staged: Vec<StagedArtifacts> =
            (0..200).map(|_| scratch.stage(b"x", "png").unwrap()).collect();
        let unique: HashSet<&Path> = staged.iter().map(|s| s.input_path()).collect();
        assert_eq!(unique.len(), staged.len());
    }

    #[test]
    fn test_collision_is_fatal_and_preserves_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = ScratchArea::new(dir.path());
        let existing = dir.path().join("astro_fixed.png");
        fs::write(&existing, b"someone else's upload").unwrap();

        let err = scratch.stage_named("astro_fixed", b"new", "png").unwrap_err();
        assert!(matches!(err, SolveError::StagingCollision(_)));
        assert_eq!(fs::read(&existing).unwrap(), b"someone else's upload");
    }

    #[test]
    fn test_bad_extension_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = ScratchArea::new(dir.path());
        assert!(scratch.stage(b"x", "../png").is_err());
        assert!(scratch.stage(b"x", "").is_err());
        assert!(dir_entries(dir.path()).is_empty());
    }

    #[test]
    fn test_sweep_stale_only_touches_staged_files() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = ScratchArea::new(dir.path());

        let mut staged = scratch.stage(b"x", "png").unwrap();
        staged.retain(true);
        drop(staged);
        fs::write(dir.path().join("unrelated.txt"), b"keep").unwrap();

        let cleaned = scratch.sweep_stale(Duration::from_secs(0)).unwrap();
        assert_eq!(cleaned, 1);
        assert_eq!(dir_entries(dir.path()), vec!["unrelated.txt".to_string()]);
    }
}
