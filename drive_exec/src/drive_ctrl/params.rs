//! Drive control parameters

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::Deserialize;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for drive control
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Params {
    /// Curvature demand corresponding to full steering lock, 1/m
    pub max_curvature_m: f64,

    /// Integral gain on the lateral error
    pub steering_ki: f64,

    /// Stick deflections smaller than this are ignored in manual mode
    pub manual_deadband: f64,

    /// Braking is only allowed when the target speed is below this fraction
    /// of the current speed
    pub brake_speed_ratio: f64,

    /// Below this magnitude the track curvature does not limit speed
    pub min_traction_curvature_m: f64,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            max_curvature_m: 2.0,
            steering_ki: 0.0,
            manual_deadband: 0.05,
            brake_speed_ratio: 0.9,
            min_traction_curvature_m: 1e-3,
        }
    }
}
