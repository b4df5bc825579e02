// Upload and option validation
// Uploads are rejected before anything touches the scratch area; option
// problems are only reported as warnings and still reach the solver.

use crate::config::settings::SolverConfig;
use crate::config::types::{Result, SolveError, SolveOptions};
use std::path::Path;

/// Image extensions the solver accepts
pub const ACCEPTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "fits", "fit"];

/// Validation result with collected warnings
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }

    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Validate an uploaded file name and size, returning the lowercase extension
pub fn validate_upload(filename: &str, size: u64, config: &SolverConfig) -> Result<String> {
    let extension = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    if !ACCEPTED_EXTENSIONS.contains(&extension.as_str()) {
        return Err(SolveError::InvalidUpload(format!(
            "invalid file type for {:?}; supported: {}",
            filename,
            ACCEPTED_EXTENSIONS.join(", ")
        )));
    }

    if size == 0 {
        return Err(SolveError::InvalidUpload("empty upload".to_string()));
    }

    if size > config.max_upload_size {
        return Err(SolveError::InvalidUpload(format!(
            "upload of {} bytes exceeds limit of {} bytes",
            size, config.max_upload_size
        )));
    }

    Ok(extension)
}

/// Check solve options for combinations the solver will ignore or misread
pub fn validate_options(options: &SolveOptions) -> ValidationResult {
    let mut result = ValidationResult::new();

    if options.radius.is_some() && !options.has_position_hint() {
        result.add_warning(
            "radius given without both ra and dec; the solver will ignore the hint".to_string(),
        );
    }

    if let (Some(low), Some(high)) = (options.scale_low, options.scale_high) {
        if low > high {
            result.add_warning(format!("scale_low ({}) > scale_high ({})", low, high));
        }
    }

    if let (Some(low), Some(high)) = (options.depth_low, options.depth_high) {
        if low > high {
            result.add_warning(format!("depth_low ({}) > depth_high ({})", low, high));
        }
    }

    if options.downsample == Some(0) {
        result.add_warning("downsample factor 0 is not meaningful".to_string());
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::ErrorKind;

    #[test]
    fn test_accepted_extensions() {
        let config = SolverConfig::default();
        for name in ["m31.jpg", "M31.JPEG", "field.png", "frame.fits", "frame.FIT"] {
            assert!(validate_upload(name, 10, &config).is_ok(), "{name}");
        }
        assert_eq!(validate_upload("M31.JPEG", 10, &config).unwrap(), "jpeg");
    }

    #[test]
    fn test_rejected_uploads() {
        let config = SolverConfig {
            max_upload_size: 100,
            ..SolverConfig::default()
        };

        for (name, size) in [
            ("image.gif", 10),
            ("noextension", 10),
            ("archive.fits.gz", 10),
            ("image.png", 0),
            ("image.png", 101),
        ] {
            let err = validate_upload(name, size, &config).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidUpload, "{name} {size}");
        }
    }

    #[test]
    fn test_radius_without_hint_is_warning_only() {
        let options = SolveOptions {
            ra: Some(10.0),
            radius: Some(2.0),
            ..SolveOptions::default()
        };
        let result = validate_options(&options);
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("radius"));
    }

    #[test]
    fn test_default_options_are_clean() {
        assert!(validate_options(&SolveOptions::default()).is_clean());
    }

    #[test]
    fn test_inverted_bounds_warn() {
        let options = SolveOptions {
            scale_low: Some(10.0),
            scale_high: Some(1.0),
            depth_low: Some(50),
            depth_high: Some(20),
            ..SolveOptions::default()
        };
        assert_eq!(validate_options(&options).warnings.len(), 2);
    }
}
