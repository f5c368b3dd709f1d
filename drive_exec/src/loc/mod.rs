//! # Localisation module
//!
//! Localisation is performed with a particle filter over the car's planar
//! pose. Each particle is moved by the wheel odometry and gyro yaw rate, with
//! noise added, and is then weighted by how well the bearings to the cones
//! seen by the camera agree with the bearings it would expect given the cone
//! map.
//!
//! All angles are in radians, positive anticlockwise (to the left) about the
//! map's Z axis. Bearings are measured from the car's forward axis.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod landmarks;
pub mod localizer;
mod params;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

pub use landmarks::Landmark;
pub use localizer::*;
pub use params::LocParams;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The pose of the car in the map frame.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Pose2 {
    pub x_m: f64,
    pub y_m: f64,

    /// Heading from the map X axis, in `(-pi, pi]`
    pub heading_rad: f64,
}

/// A single pose hypothesis.
#[derive(Debug, Copy, Clone, Serialize, Default, PartialEq)]
pub struct Particle {
    pub x_m: f64,
    pub y_m: f64,
    pub heading_rad: f64,

    /// Importance weight, the weights of the set sum to one
    pub weight: f64,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Potential errors raised by the localisation module.
#[derive(Debug, thiserror::Error)]
pub enum LocError {
    #[error("Invalid localiser parameters: {0}")]
    InvalidParams(String),

    #[error("Cannot read the landmark file {0:?}: {1}")]
    LandmarkFileError(std::path::PathBuf, std::io::Error),

    #[error("Malformed landmark data: {0}")]
    MalformedLandmarks(String),

    #[error("The landmark map contains no landmarks")]
    NoLandmarks,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Pose2 {
    pub fn new(x_m: f64, y_m: f64, heading_rad: f64) -> Self {
        Self {
            x_m,
            y_m,
            heading_rad,
        }
    }

    /// Position as a vector.
    pub fn position_m(&self) -> Vector2<f64> {
        Vector2::new(self.x_m, self.y_m)
    }
}

impl Particle {
    pub fn new(x_m: f64, y_m: f64, heading_rad: f64, weight: f64) -> Self {
        Self {
            x_m,
            y_m,
            heading_rad,
            weight,
        }
    }
}
