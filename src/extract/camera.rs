//! Camera metadata analysis.
//!
//! Reads make, model and focal length from an image's EXIF block and
//! estimates the field of view, so a caller can pick scale bounds before
//! handing the image to the solver. Nothing here runs an external process.

use crate::config::settings::SolverConfig;
use crate::config::types::{Result, ScaleUnits, SolveError};
use crate::config::validator::validate_upload;
use exif::{Exif, Field, In, Tag, Value};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Raster formats that carry EXIF metadata
pub const ANALYSE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Fraction of the estimated field width allowed either side of it
pub const SCALE_MARGIN: f64 = 0.2;

/// Units of the recommended scale bounds
pub const RECOMMENDED_UNITS: ScaleUnits = ScaleUnits::ArcminutesWidth;

/// Physical sensor size
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Sensor {
    pub name: &'static str,
    pub width_mm: f64,
    pub height_mm: f64,
}

impl Sensor {
    const fn new(name: &'static str, width_mm: f64, height_mm: f64) -> Self {
        Self {
            name,
            width_mm,
            height_mm,
        }
    }
}

/// Frame that `FocalLengthIn35mmFilm` is relative to
pub const FULL_FRAME_EQUIVALENT: Sensor = Sensor::new("35mm equivalent", 36.0, 24.0);

const CANON_APSC: Sensor = Sensor::new("Canon APS-C", 22.3, 14.9);
const CANON_FULL_FRAME: Sensor = Sensor::new("Canon full frame", 36.0, 24.0);
const NIKON_DX: Sensor = Sensor::new("Nikon DX", 23.5, 15.6);
const NIKON_FX: Sensor = Sensor::new("Nikon FX", 35.9, 23.9);
const SONY_APSC: Sensor = Sensor::new("Sony APS-C", 23.5, 15.6);
const SONY_FULL_FRAME: Sensor = Sensor::new("Sony full frame", 35.6, 23.8);
const FUJIFILM_APSC: Sensor = Sensor::new("Fujifilm APS-C", 23.5, 15.6);
const FUJIFILM_GFX: Sensor = Sensor::new("Fujifilm GFX", 43.8, 32.9);
const PANASONIC_FULL_FRAME: Sensor = Sensor::new("Panasonic full frame", 35.6, 23.8);
const MICRO_FOUR_THIRDS: Sensor = Sensor::new("Micro Four Thirds", 17.3, 13.0);

// Matched as substrings of the lowercased "make model" string, first hit wins,
// so narrower patterns sit above the broader ones they would otherwise lose to.
const SENSORS: &[(&str, Sensor)] = &[
    ("canon eos 6d", Sensor::new("Canon EOS 6D", 35.8, 23.9)),
    ("canon eos 5d", CANON_FULL_FRAME),
    ("canon eos 1d", CANON_FULL_FRAME),
    ("canon eos rebel", CANON_APSC),
    ("canon eos r7", CANON_APSC),
    ("canon eos r10", CANON_APSC),
    ("canon eos r50", CANON_APSC),
    ("canon eos r", CANON_FULL_FRAME),
    ("canon eos", CANON_APSC),
    ("nikon z 50", NIKON_DX),
    ("nikon z fc", NIKON_DX),
    ("nikon z 30", NIKON_DX),
    ("nikon z", NIKON_FX),
    ("nikon d850", NIKON_FX),
    ("nikon d810", NIKON_FX),
    ("nikon d780", NIKON_FX),
    ("nikon d750", NIKON_FX),
    ("nikon d610", NIKON_FX),
    ("nikon d", NIKON_DX),
    ("sony ilce-7", SONY_FULL_FRAME),
    ("sony ilce-9", SONY_FULL_FRAME),
    ("sony ilce-6", SONY_APSC),
    ("fujifilm gfx", FUJIFILM_GFX),
    ("fujifilm x", FUJIFILM_APSC),
    ("panasonic dc-s", PANASONIC_FULL_FRAME),
    ("panasonic", MICRO_FOUR_THIRDS),
    ("olympus", MICRO_FOUR_THIRDS),
    ("om digital", MICRO_FOUR_THIRDS),
];

/// Where the sensor size came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DetectionSource {
    /// Make and model matched a known sensor
    #[serde(rename = "sensor_database")]
    SensorDatabase,
    /// Camera unknown; the 35mm-equivalent focal length was used instead
    #[serde(rename = "exif_35mm")]
    Exif35mm,
}

/// Angular field of view of the full frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FieldOfView {
    pub width_degrees: f64,
    pub height_degrees: f64,
    pub width_arcmin: f64,
    pub height_arcmin: f64,
    pub diagonal_degrees: f64,
}

impl FieldOfView {
    /// `(scale_low, scale_high)` in [`RECOMMENDED_UNITS`]
    pub fn scale_bounds(&self) -> (f64, f64) {
        (
            self.width_arcmin * (1.0 - SCALE_MARGIN),
            self.width_arcmin * (1.0 + SCALE_MARGIN),
        )
    }
}

/// What could be learned about the camera that took an image
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CameraAnalysis {
    pub make: Option<String>,
    pub model: Option<String>,
    /// Real focal length in millimetres
    pub focal_length: Option<f64>,
    pub sensor: Option<Sensor>,
    pub detected_from: Option<DetectionSource>,
    pub fov: Option<FieldOfView>,
    pub has_exif: bool,
}

impl CameraAnalysis {
    /// Resolve a sensor and field of view from raw metadata values.
    ///
    /// A known camera with a real focal length wins. Otherwise a 35mm
    /// equivalent focal length is applied to a 36x24 mm frame.
    pub fn from_metadata(
        make: Option<String>,
        model: Option<String>,
        focal_length: Option<f64>,
        focal_length_35mm: Option<f64>,
    ) -> Self {
        let known = lookup_sensor(make.as_deref(), model.as_deref());

        let (sensor, detected_from, effective_focal) =
            match (known, focal_length, focal_length_35mm) {
                (Some(sensor), Some(focal), _) => {
                    (Some(sensor), Some(DetectionSource::SensorDatabase), Some(focal))
                }
                (_, _, Some(equivalent)) => (
                    Some(FULL_FRAME_EQUIVALENT),
                    Some(DetectionSource::Exif35mm),
                    Some(equivalent),
                ),
                (Some(sensor), None, None) => {
                    (Some(sensor), Some(DetectionSource::SensorDatabase), None)
                }
                (None, _, None) => (None, None, None),
            };

        let fov = sensor
            .zip(effective_focal)
            .and_then(|(sensor, focal)| field_of_view(&sensor, focal));

        Self {
            make,
            model,
            focal_length,
            sensor,
            detected_from,
            fov,
            has_exif: true,
        }
    }

    /// Recommended `(scale_low, scale_high)`, present only with a field of view
    pub fn scale_bounds(&self) -> Option<(f64, f64)> {
        self.fov.as_ref().map(FieldOfView::scale_bounds)
    }
}

/// Find the sensor for a camera by make and model
pub fn lookup_sensor(make: Option<&str>, model: Option<&str>) -> Option<Sensor> {
    let key = format!("{} {}", make.unwrap_or_default(), model.unwrap_or_default())
        .to_lowercase();
    SENSORS
        .iter()
        .find(|(pattern, _)| key.contains(pattern))
        .map(|(_, sensor)| *sensor)
}

/// Angular extent of `sensor` behind a lens of `focal_length_mm`
pub fn field_of_view(sensor: &Sensor, focal_length_mm: f64) -> Option<FieldOfView> {
    if !focal_length_mm.is_finite() || focal_length_mm <= 0.0 {
        return None;
    }

    let angle = |size_mm: f64| (2.0 * (size_mm / (2.0 * focal_length_mm)).atan()).to_degrees();
    let width = angle(sensor.width_mm);
    let height = angle(sensor.height_mm);

    Some(FieldOfView {
        width_degrees: width,
        height_degrees: height,
        width_arcmin: width * 60.0,
        height_arcmin: height * 60.0,
        diagonal_degrees: angle(sensor.width_mm.hypot(sensor.height_mm)),
    })
}

/// Analyse an image file's EXIF block.
///
/// Only jpg, jpeg and png are accepted, under the same size cap as solve
/// uploads. An image without EXIF is an error.
pub fn analyse_image(path: &Path, config: &SolverConfig) -> Result<CameraAnalysis> {
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    let size = std::fs::metadata(path)
        .map_err(|e| SolveError::InvalidUpload(format!("cannot read {}: {}", path.display(), e)))?
        .len();

    let extension = validate_upload(filename, size, config)?;
    if !ANALYSE_EXTENSIONS.contains(&extension.as_str()) {
        return Err(SolveError::InvalidUpload(format!(
            "invalid file type for {:?}; supported: {}",
            filename,
            ANALYSE_EXTENSIONS.join(", ")
        )));
    }

    log::info!("Analysing image: {} ({:.2} KB)", filename, size as f64 / 1024.0);

    let file = File::open(path)
        .map_err(|e| SolveError::InvalidUpload(format!("cannot open {}: {}", path.display(), e)))?;
    let exif = exif::Reader::new()
        .read_from_container(&mut BufReader::new(file))
        .map_err(|e| SolveError::MissingMetadata(format!("{}: {}", filename, e)))?;

    let analysis = analyse_exif(&exif);
    match &analysis.fov {
        Some(fov) => log::info!(
            "Analysis complete: camera={} {}, focal_length={:.0}mm, fov={:.2}x{:.2} deg",
            analysis.make.as_deref().unwrap_or("?"),
            analysis.model.as_deref().unwrap_or("?"),
            analysis.focal_length.unwrap_or_default(),
            fov.width_degrees,
            fov.height_degrees
        ),
        None => log::info!("Analysis complete: no field of view for {}", filename),
    }
    Ok(analysis)
}

fn analyse_exif(exif: &Exif) -> CameraAnalysis {
    let field = |tag| exif.get_field(tag, In::PRIMARY);

    CameraAnalysis::from_metadata(
        field(Tag::Make).and_then(ascii_value),
        field(Tag::Model).and_then(ascii_value),
        field(Tag::FocalLength).and_then(rational_value),
        field(Tag::FocalLengthIn35mmFilm)
            .and_then(|f| f.value.get_uint(0))
            .map(f64::from)
            .filter(|v| *v > 0.0),
    )
}

fn ascii_value(field: &Field) -> Option<String> {
    match &field.value {
        Value::Ascii(parts) => parts
            .first()
            .map(|raw| {
                String::from_utf8_lossy(raw)
                    .trim_matches(|c: char| c == '\0' || c.is_whitespace())
                    .to_string()
            })
            .filter(|s| !s.is_empty()),
        _ => None,
    }
}

fn rational_value(field: &Field) -> Option<f64> {
    match &field.value {
        Value::Rational(values) => values
            .first()
            .filter(|r| r.denom != 0)
            .map(|r| r.to_f64())
            .filter(|v| *v > 0.0),
        _ => None,
    }
}
