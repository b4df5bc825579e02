//! Coordinate-system header parsing.
//!
//! Accepts the two shapes a sidecar comes in: newline-separated
//! `KEY = VALUE / comment` text, or raw FITS header blocks made of 80-column
//! cards with no line breaks at all.

use crate::config::types::{Result, SolveError};
use indexmap::IndexMap;
use std::path::Path;

/// Width of one FITS header card
pub const CARD_WIDTH: usize = 80;

const SKIPPED_KEYS: &[&str] = &["COMMENT", "HISTORY", "END"];

/// Flat key/value view of a header, in first-seen order
pub type HeaderMap = IndexMap<String, String>;

/// Read and parse a header file
pub fn read_header(path: &Path) -> Result<HeaderMap> {
    let bytes = std::fs::read(path).map_err(|e| {
        SolveError::ParseFailure(format!("cannot read header {}: {}", path.display(), e))
    })?;
    Ok(parse_header(&bytes))
}

/// Parse header bytes in either layout
pub fn parse_header(bytes: &[u8]) -> HeaderMap {
    let mut header = HeaderMap::new();
    for record in records(bytes) {
        if is_end_card(&record) {
            break;
        }
        if let Some((key, value)) = parse_record(&record) {
            header.entry(key).or_insert(value);
        }
    }
    header
}

fn records(bytes: &[u8]) -> Vec<String> {
    if is_card_layout(bytes) {
        bytes
            .chunks(CARD_WIDTH)
            .map(|card| String::from_utf8_lossy(card).to_string())
            .collect()
    } else {
        String::from_utf8_lossy(bytes)
            .lines()
            .map(str::to_string)
            .collect()
    }
}

// Card layout means no line break in any card up to the END card. Without an
// END card the text must also be a whole number of cards.
fn is_card_layout(bytes: &[u8]) -> bool {
    if bytes.len() < CARD_WIDTH {
        return false;
    }
    for card in bytes.chunks(CARD_WIDTH) {
        if card.contains(&b'\n') {
            return false;
        }
        if is_end_card(&String::from_utf8_lossy(card)) {
            return true;
        }
    }
    bytes.len() % CARD_WIDTH == 0
}

fn is_end_card(record: &str) -> bool {
    record.trim_end() == "END"
}

fn parse_record(record: &str) -> Option<(String, String)> {
    let trimmed = record.trim();
    if trimmed.is_empty() {
        return None;
    }

    let first_word = trimmed.split_whitespace().next().unwrap_or_default();
    if SKIPPED_KEYS.contains(&first_word) {
        return None;
    }

    let (key, rest) = trimmed.split_once('=')?;
    let key = key.trim();
    if key.is_empty() || key.contains(char::is_whitespace) {
        return None;
    }

    Some((key.to_string(), parse_value(rest)))
}

// Strips a trailing `/ comment` that sits outside quotes, then the quotes.
// FITS escapes a quote inside a string as two quotes.
fn parse_value(raw: &str) -> String {
    let mut value = String::new();
    let mut quote: Option<char> = None;
    let mut chars = raw.trim().chars().peekable();

    while let Some(c) = chars.next() {
        match quote {
            Some(q) if c == q => {
                if q == '\'' && chars.peek() == Some(&'\'') {
                    chars.next();
                    value.push('\'');
                } else {
                    quote = None;
                }
            }
            Some(_) => value.push(c),
            None if c == '\'' || c == '"' => quote = Some(c),
            None if c == '/' => break,
            None => value.push(c),
        }
    }

    value.trim().to_string()
}

/// Numeric lookup
pub fn get_f64(header: &HeaderMap, key: &str) -> Option<f64> {
    header.get(key).and_then(|v| v.trim().parse::<f64>().ok())
}
