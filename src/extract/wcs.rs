//! Typed solution fields derived from a parsed header.

use crate::config::types::{Result, SolveError};
use crate::extract::header::{get_f64, read_header, HeaderMap};
use std::path::Path;

/// Linear part of the pixel-to-sky transform, degrees per pixel
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CdMatrix {
    pub cd1_1: f64,
    pub cd1_2: f64,
    pub cd2_1: f64,
    pub cd2_2: f64,
}

impl CdMatrix {
    /// CD block if present, otherwise CDELT with optional CROTA2
    pub fn from_header(header: &HeaderMap) -> Option<Self> {
        if let (Some(cd1_1), Some(cd1_2), Some(cd2_1), Some(cd2_2)) = (
            get_f64(header, "CD1_1"),
            get_f64(header, "CD1_2"),
            get_f64(header, "CD2_1"),
            get_f64(header, "CD2_2"),
        ) {
            return Some(Self {
                cd1_1,
                cd1_2,
                cd2_1,
                cd2_2,
            });
        }

        let cdelt1 = get_f64(header, "CDELT1")?;
        let cdelt2 = get_f64(header, "CDELT2")?;
        let crota = get_f64(header, "CROTA2").unwrap_or(0.0).to_radians();
        let (sin_r, cos_r) = crota.sin_cos();

        Some(Self {
            cd1_1: cdelt1 * cos_r,
            cd1_2: -cdelt2 * sin_r,
            cd2_1: cdelt1 * sin_r,
            cd2_2: cdelt2 * cos_r,
        })
    }

    pub fn determinant(&self) -> f64 {
        self.cd1_1 * self.cd2_2 - self.cd1_2 * self.cd2_1
    }

    /// Degrees per pixel
    pub fn scale_degrees(&self) -> f64 {
        self.determinant().abs().sqrt()
    }

    /// Arcseconds per pixel
    pub fn scale_arcsec(&self) -> f64 {
        self.scale_degrees() * 3600.0
    }

    /// Field rotation in degrees, in (-180, 180]
    pub fn rotation_degrees(&self) -> f64 {
        let rotation = self.cd2_1.atan2(self.cd2_2).to_degrees();
        if rotation <= -180.0 {
            rotation + 360.0
        } else {
            rotation
        }
    }
}

/// Fields extracted from a solved sidecar
#[derive(Debug, Clone, PartialEq)]
pub struct WcsSolution {
    /// Right ascension of the reference point, degrees
    pub ra: f64,
    /// Declination of the reference point, degrees
    pub dec: f64,
    /// Arcseconds per pixel
    pub pixel_scale: f64,
    /// Degrees
    pub rotation: f64,
    /// Degrees
    pub field_width: f64,
    /// Degrees
    pub field_height: f64,
    pub header: HeaderMap,
}

/// Extract using only the dimensions recorded in the header
pub fn extract(sidecar: &Path) -> Result<WcsSolution> {
    extract_with_dimensions(sidecar, None)
}

/// Extract, falling back to `image_dims` when the header has no size keys
pub fn extract_with_dimensions(
    sidecar: &Path,
    image_dims: Option<(u32, u32)>,
) -> Result<WcsSolution> {
    let header = read_header(sidecar)?;
    derive(header, image_dims)
}

/// Derive typed fields from an already-parsed header
pub fn derive(header: HeaderMap, image_dims: Option<(u32, u32)>) -> Result<WcsSolution> {
    let ra = require(&header, "CRVAL1")?;
    let dec = require(&header, "CRVAL2")?;
    let cd = CdMatrix::from_header(&header).ok_or_else(|| {
        SolveError::ParseFailure(
            "header has neither a CD matrix nor CDELT1/CDELT2".to_string(),
        )
    })?;

    let (width, height) = dimensions(&header)
        .or_else(|| image_dims.map(|(w, h)| (f64::from(w), f64::from(h))))
        .ok_or_else(|| {
            SolveError::ParseFailure("image dimensions unavailable".to_string())
        })?;

    let scale_deg = cd.scale_degrees();

    Ok(WcsSolution {
        ra,
        dec,
        pixel_scale: cd.scale_arcsec(),
        rotation: cd.rotation_degrees(),
        field_width: scale_deg * width,
        field_height: scale_deg * height,
        header,
    })
}

fn require(header: &HeaderMap, key: &str) -> Result<f64> {
    match header.get(key) {
        None => Err(SolveError::ParseFailure(format!("missing header key {}", key))),
        Some(raw) => raw.trim().parse::<f64>().map_err(|_| {
            SolveError::ParseFailure(format!("header key {} is not numeric: {:?}", key, raw))
        }),
    }
}

fn dimensions(header: &HeaderMap) -> Option<(f64, f64)> {
    let pair = |w: &str, h: &str| match (get_f64(header, w), get_f64(header, h)) {
        (Some(w), Some(h)) if w > 0.0 && h > 0.0 => Some((w, h)),
        _ => None,
    };
    pair("IMAGEW", "IMAGEH").or_else(|| pair("NAXIS1", "NAXIS2"))
}
