//! Landmark map loading
//!
//! The map is a plain text file. The first number is the landmark count, it
//! is followed by that many `x y` coordinate pairs in meters. Any text after
//! a `#` on a line is ignored.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use std::path::Path;

use super::LocError;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A fixed landmark (cone) in the map frame.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq)]
pub struct Landmark {
    pub x_m: f64,
    pub y_m: f64,
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Load a landmark map from a file.
pub fn load<P: AsRef<Path>>(path: P) -> Result<Vec<Landmark>, LocError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .map_err(|e| LocError::LandmarkFileError(path.to_path_buf(), e))?;

    parse(&text)
}

/// Parse a landmark map.
///
/// An empty map is an error, as is a count which does not match the number
/// of coordinate pairs that follow it.
pub fn parse(text: &str) -> Result<Vec<Landmark>, LocError> {
    let mut tokens = text
        .lines()
        .map(|l| l.split('#').next().unwrap_or(""))
        .flat_map(|l| l.split_whitespace());

    let count: usize = match tokens.next() {
        Some(t) => t
            .parse()
            .map_err(|_| LocError::MalformedLandmarks(format!("invalid count {:?}", t)))?,
        None => return Err(LocError::NoLandmarks),
    };

    if count == 0 {
        return Err(LocError::NoLandmarks);
    }

    let mut landmarks = Vec::with_capacity(count);
    for i in 0..count {
        let x_m = parse_coord(tokens.next(), i)?;
        let y_m = parse_coord(tokens.next(), i)?;
        landmarks.push(Landmark { x_m, y_m });
    }

    if let Some(t) = tokens.next() {
        return Err(LocError::MalformedLandmarks(format!(
            "unexpected trailing data {:?} after {} landmarks",
            t, count
        )));
    }

    Ok(landmarks)
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn parse_coord(token: Option<&str>, index: usize) -> Result<f64, LocError> {
    let t = token.ok_or_else(|| {
        LocError::MalformedLandmarks(format!("missing coordinate for landmark {}", index))
    })?;

    match t.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(LocError::MalformedLandmarks(format!(
            "invalid coordinate {:?} for landmark {}",
            t, index
        ))),
    }
}
