//! # Drive library.
//!
//! This library allows other crates in the workspace (and the executables in
//! this crate) to access the drive software's modules.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Driver configuration - operator tunable gains and limits, and the menu used to edit them
pub mod config;

/// Control loop - runs one full perception, localisation and control cycle per camera frame
pub mod control_loop;

/// Shared sensor snapshots written by the pollers and read by the control loop
pub mod data_store;

/// Drive control - converts track geometry and vehicle state into throttle and steering
pub mod drive_ctrl;

/// Frame source - delivers camera frames to the control loop
pub mod frame_source;

/// GPS local frame conversion
pub mod gps;

/// Equipment interfaces implemented by hardware drivers and the simulation
pub mod hw;

/// Localisation - particle filter over cone bearings and wheel odometry
pub mod loc;

/// Operator input handling
pub mod operator;

/// Executable parameters
pub mod params;

/// Auxiliary sensor and input pollers
pub mod pollers;

/// Binary frame and sensor recordings
pub mod recorder;

/// Simulated equipment
#[cfg(feature = "sim")]
pub mod sim;

/// Status and telemetry reporting
pub mod status;

/// Track following - nearest point search on the reference track
pub mod track;

/// Vehicle state estimation - speed and yaw rate from encoders and the IMU
pub mod veh_est;
