//! # Camera Equipment Communications Module

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use chrono::{DateTime, Utc, serde::ts_milliseconds};
use serde::{Serialize, Deserialize};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// An individual frame from the camera.
///
/// Frames are only carried through the drive software, the pixel data is
/// interpreted by the cone detector and otherwise treated as opaque bytes.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Frame {
    /// UTC timestamp at which the frame was acquired
    #[serde(with = "ts_milliseconds")]
    pub timestamp: DateTime<Utc>,

    /// Width of the image in pixels
    pub width: u32,

    /// Height of the image in pixels
    pub height: u32,

    /// The raw image data
    pub data: Vec<u8>
}

/// A bearing to a detected cone, in radians.
///
/// Zero is straight ahead and positive angles are to the left of the
/// camera's optical axis.
pub type ConeBearing = f32;
