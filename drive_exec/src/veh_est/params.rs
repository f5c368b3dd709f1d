//! Vehicle estimator parameters

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::Deserialize;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for the vehicle estimator
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Params {
    /// Distance travelled per encoder tick
    pub meters_per_tick: f64,

    /// Consecutive stationary cycles before the gyro bias is learnt from
    /// the mean of their raw readings
    pub bias_settle_cycles: u32,

    /// Below this measured speed the car is considered stationary
    pub stationary_speed_ms: f64,

    /// Throttle commands below this are braking
    pub brake_threshold: f64,

    /// Number of cycles the speed estimate is held after braking
    pub brake_hold_cycles: u32,

    /// Per cycle decay of the held speed estimate
    pub brake_decay: f64,

    /// Servo readback at the straight ahead position
    pub servo_center: f64,

    /// Servo readback counts per unit of normalised steering
    pub servo_scale: f64,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            meters_per_tick: 0.0205,
            bias_settle_cycles: 15,
            stationary_speed_ms: 0.05,
            brake_threshold: -0.05,
            brake_hold_cycles: 5,
            brake_decay: 0.95,
            servo_center: 127.0,
            servo_scale: -100.0,
        }
    }
}
