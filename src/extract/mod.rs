//! Result extraction
//!
//! Turns the solver's coordinate-system sidecar into typed fields, and reads
//! camera metadata for choosing scale bounds before a solve.

pub mod camera;
pub mod header;
pub mod probe;
pub mod wcs;

pub use camera::{analyse_image, CameraAnalysis};
pub use header::{parse_header, read_header, HeaderMap};
pub use probe::probe_dimensions;
pub use wcs::{extract, extract_with_dimensions, WcsSolution};
