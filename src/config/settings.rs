/// Service-level configuration for the solver core
use crate::config::types::{Result, SolveError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Hard ceiling on a single solve, whatever the caller asks for
pub const MAX_SOLVE_DURATION: Duration = Duration::from_secs(5 * 60);

/// Default upload cap (50 MiB)
pub const DEFAULT_MAX_UPLOAD_SIZE: u64 = 50 * 1024 * 1024;

/// Default cap on captured solver output (4 MiB)
pub const DEFAULT_OUTPUT_LIMIT: usize = 4 * 1024 * 1024;

/// Configuration supplied by the environment layer
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Directory holding astrometry.net index files
    pub index_path: Option<PathBuf>,
    /// Writable scratch root for staged uploads (must already exist)
    pub scratch_dir: PathBuf,
    /// Directory containing the solver binaries; `None` resolves through `PATH`
    pub binary_dir: Option<PathBuf>,
    /// Wall clock limit per invocation, never above `MAX_SOLVE_DURATION`
    pub timeout: Duration,
    /// Largest accepted upload in bytes
    pub max_upload_size: u64,
    /// Largest captured combined output in bytes
    pub output_limit: usize,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            index_path: Some(PathBuf::from("/data/indexes")),
            scratch_dir: std::env::temp_dir(),
            binary_dir: None,
            timeout: MAX_SOLVE_DURATION,
            max_upload_size: DEFAULT_MAX_UPLOAD_SIZE,
            output_limit: DEFAULT_OUTPUT_LIMIT,
        }
    }
}

impl SolverConfig {
    /// Load configuration from `ASTROMETRY_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(index) = get("ASTROMETRY_INDEX_PATH") {
            config.index_path = Some(PathBuf::from(index));
        }
        if let Some(dir) = get("ASTROMETRY_TEMP_DIR") {
            config.scratch_dir = PathBuf::from(dir);
        }
        if let Some(dir) = get("ASTROMETRY_BIN_DIR") {
            config.binary_dir = Some(PathBuf::from(dir));
        }
        if let Some(secs) = get("ASTROMETRY_TIMEOUT_SECS") {
            let secs: u64 = secs.trim().parse().map_err(|_| {
                SolveError::Config(format!("ASTROMETRY_TIMEOUT_SECS is not an integer: {}", secs))
            })?;
            if secs == 0 {
                return Err(SolveError::Config(
                    "ASTROMETRY_TIMEOUT_SECS cannot be zero".to_string(),
                ));
            }
            config.timeout = Duration::from_secs(secs);
        }
        if let Some(bytes) = get("ASTROMETRY_MAX_UPLOAD_BYTES") {
            config.max_upload_size = bytes.trim().parse().map_err(|_| {
                SolveError::Config(format!(
                    "ASTROMETRY_MAX_UPLOAD_BYTES is not an integer: {}",
                    bytes
                ))
            })?;
        }

        Ok(config.clamped())
    }

    /// Apply the fixed system-wide deadline ceiling
    pub fn clamped(mut self) -> Self {
        if self.timeout > MAX_SOLVE_DURATION {
            log::warn!(
                "Configured timeout {:?} exceeds ceiling, using {:?}",
                self.timeout,
                MAX_SOLVE_DURATION
            );
            self.timeout = MAX_SOLVE_DURATION;
        }
        self
    }
}
