/// Binary allowlist for solver invocation
use crate::config::types::{Result, SolveError};
use crate::observability::audit::events;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Executables this crate is permitted to spawn.
///
/// Closed set: any code path that holds a `SolverBinary` has already passed
/// the allowlist, so there is nothing left to check at spawn time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SolverBinary {
    /// Main plate solving command
    #[serde(rename = "solve-field")]
    SolveField,
    /// Source extraction from images
    #[serde(rename = "image2xy")]
    Image2Xy,
    /// Fit a WCS to matched xy lists
    #[serde(rename = "fit-wcs")]
    FitWcs,
    /// Pixel to sky conversion
    #[serde(rename = "wcs-xy2rd")]
    WcsXy2Rd,
    /// Sky to pixel conversion
    #[serde(rename = "wcs-rd2xy")]
    WcsRd2Xy,
}

impl SolverBinary {
    /// Every permitted binary, in a stable order
    pub const ALL: [SolverBinary; 5] = [
        SolverBinary::SolveField,
        SolverBinary::Image2Xy,
        SolverBinary::FitWcs,
        SolverBinary::WcsXy2Rd,
        SolverBinary::WcsRd2Xy,
    ];

    /// Canonical executable name
    pub fn name(self) -> &'static str {
        match self {
            SolverBinary::SolveField => "solve-field",
            SolverBinary::Image2Xy => "image2xy",
            SolverBinary::FitWcs => "fit-wcs",
            SolverBinary::WcsXy2Rd => "wcs-xy2rd",
            SolverBinary::WcsRd2Xy => "wcs-rd2xy",
        }
    }

    /// Program path handed to `Command::new`.
    ///
    /// With no binary directory the bare name is used and the OS resolves it
    /// through `PATH`. The file name component is always the canonical name.
    pub fn program(self, binary_dir: Option<&Path>) -> PathBuf {
        match binary_dir {
            Some(dir) => dir.join(self.name()),
            None => PathBuf::from(self.name()),
        }
    }
}

impl std::fmt::Display for SolverBinary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for SolverBinary {
    type Err = SolveError;

    fn from_str(s: &str) -> Result<Self> {
        authorize(s)
    }
}

/// Validate an externally supplied executable name.
///
/// Exact string match only; no trimming, case folding or path handling, so
/// `../solve-field` and `solve-field; rm -rf /` are both rejected.
pub fn authorize(name: &str) -> Result<SolverBinary> {
    match SolverBinary::ALL.iter().find(|b| b.name() == name) {
        Some(binary) => Ok(*binary),
        None => {
            events::binary_rejected(name);
            Err(SolveError::InvalidBinary(name.to_string()))
        }
    }
}

/// Resolve an allowlisted binary to an existing file, if any.
///
/// Used for dependency checks only; spawning never requires this.
pub fn locate(binary: SolverBinary, binary_dir: Option<&Path>) -> Option<PathBuf> {
    if let Some(dir) = binary_dir {
        let candidate = dir.join(binary.name());
        return candidate.is_file().then_some(candidate);
    }

    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(binary.name()))
        .find(|candidate| candidate.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::ErrorKind;
    use proptest::prelude::*;

    #[test]
    fn test_authorize_accepts_every_allowlisted_name() {
        for binary in SolverBinary::ALL {
            assert_eq!(authorize(binary.name()).unwrap(), binary);
        }
    }

    #[test]
    fn test_authorize_rejects_everything_else() {
        let invalid = [
            "invalid-binary",
            "rm",
            "bash",
            "python",
            "../solve-field",
            "/usr/bin/solve-field",
            "solve-field; rm -rf /",
            "solve-field ",
            " solve-field",
            "SOLVE-FIELD",
            "solve",
            "solve-field2",
            "",
        ];

        for name in invalid {
            let err = authorize(name).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidBinary, "{name:?}");
            assert!(err.to_string().contains("invalid binary name"));
        }
    }

    #[test]
    fn test_binary_names() {
        assert_eq!(SolverBinary::SolveField.name(), "solve-field");
        assert_eq!(SolverBinary::Image2Xy.name(), "image2xy");
        assert_eq!(SolverBinary::FitWcs.name(), "fit-wcs");
        assert_eq!(SolverBinary::WcsXy2Rd.name(), "wcs-xy2rd");
        assert_eq!(SolverBinary::WcsRd2Xy.name(), "wcs-rd2xy");
        assert_eq!(SolverBinary::ALL.len(), 5);
    }

    #[test]
    fn test_program_keeps_canonical_file_name() {
        let program = SolverBinary::SolveField.program(Some(Path::new("/opt/astrometry/bin")));
        assert_eq!(program, PathBuf::from("/opt/astrometry/bin/solve-field"));
        assert_eq!(
            SolverBinary::Image2Xy.program(None),
            PathBuf::from("image2xy")
        );
    }

    #[test]
    fn test_from_str_goes_through_allowlist() {
        assert_eq!("fit-wcs".parse::<SolverBinary>().unwrap(), SolverBinary::FitWcs);
        assert!("sh".parse::<SolverBinary>().is_err());
    }

    #[test]
    fn test_locate_in_binary_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(locate(SolverBinary::SolveField, Some(dir.path())).is_none());

        std::fs::write(dir.path().join("solve-field"), b"").unwrap();
        assert_eq!(
            locate(SolverBinary::SolveField, Some(dir.path())),
            Some(dir.path().join("solve-field"))
        );
    }

    fn is_allowlisted(name: &str) -> bool {
        SolverBinary::ALL.iter().any(|b| b.name() == name)
    }

    fn allowlisted_name() -> impl Strategy<Value = &'static str> {
        proptest::sample::select(SolverBinary::ALL.iter().map(|b| b.name()).collect::<Vec<_>>())
    }

    proptest! {
        #[test]
        fn prop_arbitrary_names_are_rejected(name in any::<String>()) {
            prop_assume!(!is_allowlisted(&name));
            prop_assert!(matches!(authorize(&name), Err(SolveError::InvalidBinary(_))));
        }

        #[test]
        fn prop_decorated_names_are_rejected(
            base in allowlisted_name(),
            prefix in "[ ./;a-zA-Z-]{0,4}",
            suffix in "[ ./;&|a-zA-Z0-9-]{0,4}",
        ) {
            let name = format!("{}{}{}", prefix, base, suffix);
            prop_assume!(!is_allowlisted(&name));
            prop_assert!(matches!(authorize(&name), Err(SolveError::InvalidBinary(_))));
            prop_assert!(authorize(&name.to_uppercase()).is_err());
        }
    }
}
