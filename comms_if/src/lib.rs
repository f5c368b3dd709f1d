//! # Communications interface crate.
//!
//! Provides the data types exchanged between the drive software and its
//! external collaborators (camera, IMU, car controller, GPS receiver and
//! gamepad).

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Sensor readings and demands for equipment
pub mod eqpt;

/// Human input device events
pub mod input;
