//! # Drive control module
//!
//! Drive control computes the throttle and steering commands sent to the car.
//!
//! In manual mode the operator's sticks are passed through a deadband and
//! clamp. In autodrive mode the operator's throttle stick instead scales the
//! speed limit to give a target speed, which a PI controller on the
//! estimated speed tracks, and the steering follows the reference track
//! using PD control on the lateral and heading errors with a curvature
//! feed-forward. The target speed is reduced in corners so that the lateral
//! acceleration stays within the traction limit.
//!
//! If the operator's input device stops reporting the car is stopped
//! regardless of mode.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod controllers;
pub mod params;
pub mod state;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// Internal
pub use controllers::*;
pub use params::Params;
pub use state::*;
