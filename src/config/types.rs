/// Core types and structures for platesolve
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Units for the scale bounds handed to the solver
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum ScaleUnits {
    /// Width of the image in degrees
    #[serde(rename = "degwidth")]
    DegreesWidth,
    /// Width of the image in arcminutes
    #[default]
    #[serde(rename = "arcminwidth")]
    ArcminutesWidth,
    /// Arcseconds per pixel
    #[serde(rename = "arcsecperpix")]
    ArcsecondsPerPixel,
}

impl ScaleUnits {
    /// Spelling understood by `solve-field --scale-units`
    pub fn as_solver_arg(self) -> &'static str {
        match self {
            ScaleUnits::DegreesWidth => "degwidth",
            ScaleUnits::ArcminutesWidth => "arcminwidth",
            ScaleUnits::ArcsecondsPerPixel => "arcsecperpix",
        }
    }

    /// Parse the solver spelling (and a few common aliases)
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "degwidth" | "degw" | "dw" => Some(ScaleUnits::DegreesWidth),
            "arcminwidth" | "amw" | "aw" => Some(ScaleUnits::ArcminutesWidth),
            "arcsecperpix" | "app" => Some(ScaleUnits::ArcsecondsPerPixel),
            _ => None,
        }
    }
}

impl std::fmt::Display for ScaleUnits {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_solver_arg())
    }
}

/// Options for a single solve invocation.
///
/// `None` means "let the solver apply its own default"; a populated field is
/// always forwarded as a flag.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SolveOptions {
    /// Lower bound on image scale, in `scale_units`
    pub scale_low: Option<f64>,
    /// Upper bound on image scale, in `scale_units`
    pub scale_high: Option<f64>,
    /// Units for the scale bounds
    #[serde(default)]
    pub scale_units: ScaleUnits,
    /// Downsample factor applied before source extraction
    pub downsample: Option<u32>,
    /// First index depth (number of field stars) to examine
    pub depth_low: Option<u32>,
    /// Last index depth to examine
    pub depth_high: Option<u32>,
    /// Right ascension hint in degrees (J2000)
    pub ra: Option<f64>,
    /// Declination hint in degrees (J2000)
    pub dec: Option<f64>,
    /// Search radius in degrees around the ra/dec hint
    pub radius: Option<f64>,
    /// Leave staged files on disk after the solve
    #[serde(default)]
    pub keep_temp_files: bool,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            scale_low: None,
            scale_high: None,
            scale_units: ScaleUnits::ArcminutesWidth,
            downsample: Some(2),
            depth_low: Some(10),
            depth_high: Some(20),
            ra: None,
            dec: None,
            radius: None,
            keep_temp_files: false,
        }
    }
}

impl SolveOptions {
    /// Options with every optional field unset
    pub fn empty() -> Self {
        Self {
            downsample: None,
            depth_low: None,
            depth_high: None,
            ..Self::default()
        }
    }

    /// Whether a complete position hint (ra and dec) is present
    pub fn has_position_hint(&self) -> bool {
        self.ra.is_some() && self.dec.is_some()
    }
}

/// Result of one solve invocation
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct SolveResult {
    /// Whether the solver produced a coordinate solution
    pub solved: bool,
    /// Field center right ascension (degrees)
    pub ra: Option<f64>,
    /// Field center declination (degrees)
    pub dec: Option<f64>,
    /// Pixel scale (arcsec/pixel)
    pub pixel_scale: Option<f64>,
    /// Field rotation (degrees)
    pub rotation: Option<f64>,
    /// Field width (degrees)
    pub field_width: Option<f64>,
    /// Field height (degrees)
    pub field_height: Option<f64>,
    /// Raw coordinate header, keys verbatim and in file order
    pub wcs_header: Option<IndexMap<String, String>>,
    /// Wall clock time spent on the solve (seconds)
    pub solve_time: f64,
    /// Combined stdout/stderr of the solver
    pub raw_output: String,
    /// Why the solve did not succeed, when a structured reason exists
    pub error_kind: Option<ErrorKind>,
    /// Human readable detail for `error_kind`
    pub error_message: Option<String>,
}

impl SolveResult {
    /// Unsolved result carrying only diagnostics
    pub fn unsolved(solve_time: f64, raw_output: String) -> Self {
        Self {
            solved: false,
            solve_time,
            raw_output,
            ..Self::default()
        }
    }

    /// Unsolved result with a classified failure
    pub fn failed(solve_time: f64, raw_output: String, error: &SolveError) -> Self {
        Self {
            error_kind: Some(error.kind()),
            error_message: Some(error.to_string()),
            ..Self::unsolved(solve_time, raw_output)
        }
    }
}

/// Error taxonomy - closed set
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Requested executable is not on the allowlist
    #[serde(rename = "invalid_binary")]
    InvalidBinary,
    /// Executable missing or not runnable
    #[serde(rename = "launch_failure")]
    LaunchFailure,
    /// Wall clock deadline exceeded
    #[serde(rename = "timeout")]
    Timeout,
    /// Solver claimed success but its header artifact is unreadable
    #[serde(rename = "parse_failure")]
    ParseFailure,
    /// Companion tool exited non-zero
    #[serde(rename = "process_failed")]
    ProcessFailed,
    /// Upload rejected before staging
    #[serde(rename = "invalid_upload")]
    InvalidUpload,
    /// Local staging or configuration fault
    #[serde(rename = "internal")]
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::InvalidBinary => write!(f, "invalid_binary"),
            ErrorKind::LaunchFailure => write!(f, "launch_failure"),
            ErrorKind::Timeout => write!(f, "timeout"),
            ErrorKind::ParseFailure => write!(f, "parse_failure"),
            ErrorKind::ProcessFailed => write!(f, "process_failed"),
            ErrorKind::InvalidUpload => write!(f, "invalid_upload"),
            ErrorKind::Internal => write!(f, "internal"),
        }
    }
}

/// Custom error types for platesolve
#[derive(Error, Debug)]
pub enum SolveError {
    #[error("invalid binary name: {0}")]
    InvalidBinary(String),

    #[error("failed to launch {binary}: {source}")]
    LaunchFailure {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{binary} exceeded deadline of {limit:?}")]
    Timeout { binary: String, limit: Duration },

    #[error("unreadable coordinate header: {0}")]
    ParseFailure(String),

    #[error("{binary} exited with status {code:?}")]
    ProcessFailed {
        binary: String,
        code: Option<i32>,
        output: String,
    },

    #[error("staging error: {0}")]
    Staging(#[from] std::io::Error),

    #[error("staged path already exists: {}", .0.display())]
    StagingCollision(PathBuf),

    #[error("invalid upload: {0}")]
    InvalidUpload(String),

    #[error("no usable camera metadata: {0}")]
    MissingMetadata(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl SolveError {
    /// Map onto the closed taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            SolveError::InvalidBinary(_) => ErrorKind::InvalidBinary,
            SolveError::LaunchFailure { .. } => ErrorKind::LaunchFailure,
            SolveError::Timeout { .. } => ErrorKind::Timeout,
            SolveError::ParseFailure(_) | SolveError::MissingMetadata(_) => {
                ErrorKind::ParseFailure
            }
            SolveError::ProcessFailed { .. } => ErrorKind::ProcessFailed,
            SolveError::InvalidUpload(_) => ErrorKind::InvalidUpload,
            SolveError::Staging(_) | SolveError::StagingCollision(_) | SolveError::Config(_) => {
                ErrorKind::Internal
            }
        }
    }
}

/// Result type alias for platesolve operations
pub type Result<T> = std::result::Result<T, SolveError>;
