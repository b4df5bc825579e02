//! Image dimension probing for the staged input.
//!
//! Used when the solved header does not record the image size.

use crate::extract::header::{get_f64, parse_header, CARD_WIDTH};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// FITS header block size
pub const FITS_BLOCK: usize = 2880;

// Headers longer than this are not worth chasing
const MAX_HEADER_BLOCKS: usize = 64;

/// Width and height in pixels, or `None` if the file can't be probed
pub fn probe_dimensions(path: &Path) -> Option<(u32, u32)> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    let dims = match extension.as_str() {
        "fits" | "fit" => fits_dimensions(path),
        _ => image::image_dimensions(path).ok(),
    };

    if dims.is_none() {
        log::debug!("Could not probe dimensions of {}", path.display());
    }
    dims
}

fn fits_dimensions(path: &Path) -> Option<(u32, u32)> {
    let mut file = File::open(path).ok()?;
    let mut header = Vec::new();
    let mut block = vec![0u8; FITS_BLOCK];

    for _ in 0..MAX_HEADER_BLOCKS {
        file.read_exact(&mut block).ok()?;
        header.extend_from_slice(&block);
        if block
            .chunks(CARD_WIDTH)
            .any(|card| card.starts_with(b"END") && card[3..].iter().all(|b| *b == b' '))
        {
            break;
        }
    }

    let parsed = parse_header(&header);
    let width = get_f64(&parsed, "NAXIS1")?;
    let height = get_f64(&parsed, "NAXIS2")?;
    if width < 1.0 || height < 1.0 {
        return None;
    }
    Some((width as u32, height as u32))
}
