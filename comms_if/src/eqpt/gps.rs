//! # GPS Equipment Communications Module

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Serialize, Deserialize};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A navigation solution from the GPS receiver.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq)]
pub struct GpsFix {
    /// Latitude in degrees * 1e7
    pub lat_e7: i32,

    /// Longitude in degrees * 1e7
    pub lon_e7: i32,

    /// Number of satellites used in the solution
    pub num_sv: u8,

    /// Fix type, 0 no fix, 2 2D, 3 3D
    pub fix_type: u8,

    /// Velocity north, east, down in millimeters/second
    pub vel_ned_mm_s: [i32; 3],

    /// Horizontal accuracy estimate in millimeters
    pub h_acc_mm: u32
}

impl GpsFix {
    /// Returns true if the receiver reports at least a 2D fix.
    pub fn has_fix(&self) -> bool {
        self.fix_type >= 2
    }

    /// Ground speed in meters/second.
    pub fn ground_speed_ms(&self) -> f64 {
        let n = self.vel_ned_mm_s[0] as f64 * 1e-3;
        let e = self.vel_ned_mm_s[1] as f64 * 1e-3;
        (n * n + e * e).sqrt()
    }
}
