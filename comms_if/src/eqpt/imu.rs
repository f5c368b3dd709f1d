//! # IMU Equipment Communications Module

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Serialize, Deserialize};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A single inertial measurement in the car body frame (X forwards, Y left,
/// Z up).
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq)]
pub struct ImuSample {
    /// Linear acceleration in meters/second^2
    pub accel_ms2: [f32; 3],

    /// Angular rate in radians/second, right handed about each axis
    pub gyro_rads: [f32; 3],

    /// Die temperature in degrees C
    pub temp_c: f32
}

impl ImuSample {
    /// Yaw rate about the body Z axis in radians/second.
    pub fn yaw_rate_rads(&self) -> f32 {
        self.gyro_rads[2]
    }

    /// Returns true if every component is finite.
    pub fn is_valid(&self) -> bool {
        self.accel_ms2.iter().chain(self.gyro_rads.iter()).all(|v| v.is_finite())
    }
}
