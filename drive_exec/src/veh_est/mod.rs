//! # Vehicle state estimation module
//!
//! Estimates the forward speed of the car from the front wheel encoders and
//! its yaw rate from the gyro. The speed is propagated with the IMU's forward
//! acceleration and corrected towards the wheel speed, the yaw rate is
//! filtered directly. Both filters use the bandwidths set in the driver
//! configuration.
//!
//! The gyro bias is the mean raw gyro reading over the time the car has been
//! at rest, once it has been at rest for long enough.
//!
//! The estimator also carries the integral terms of the drive controllers,
//! so that resetting the vehicle state resets them too.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod params;
mod state;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

pub use params::Params;
pub use state::*;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Potential errors raised by the estimator.
#[derive(Debug, thiserror::Error)]
pub enum VehEstError {
    #[error("Could not load parameters: {0}")]
    ParamLoadError(util::params::LoadError),

    #[error("Invalid estimator parameters: {0}")]
    InvalidParams(String),
}
