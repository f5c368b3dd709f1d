//! # Equipment interfaces
//!
//! The control loop and pollers only talk to equipment through these traits,
//! so the hardware drivers and the simulation can be swapped freely.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use std::time::Duration;

// Internal
use comms_if::{
    eqpt::{
        cam::{ConeBearing, Frame},
        car::{ActuatorDems, CarFeedback},
        gps::GpsFix,
        imu::ImuSample,
    },
    input::InputEvent,
};

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum HwError {
    #[error("Failed to read from the {0}: {1}")]
    ReadFailed(&'static str, String),

    #[error("Failed to write to the {0}: {1}")]
    WriteFailed(&'static str, String),

    #[error("The {0} is disconnected")]
    Disconnected(&'static str),
}

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// Inertial measurement unit.
pub trait Imu: Send {
    fn read(&mut self) -> Result<ImuSample, HwError>;
}

/// Servo and wheel encoder readback from the car controller.
pub trait FeedbackSource: Send {
    fn read_feedback(&mut self) -> Result<CarFeedback, HwError>;
}

/// Throttle, steering and status LED output.
pub trait Actuator {
    fn set_controls(&mut self, dems: &ActuatorDems) -> Result<(), HwError>;
}

/// Extracts cone bearings from a camera frame.
pub trait ConeDetector {
    /// Write the bearings of up to `max_cones` cones into `out`, returning
    /// the number found.
    ///
    /// `gyro_z_rads` is the current yaw rate, which detectors use to correct
    /// for rolling shutter skew.
    fn find_cones(
        &mut self,
        frame: &Frame,
        thresh: f64,
        gyro_z_rads: f32,
        max_cones: usize,
        out: &mut Vec<ConeBearing>,
    ) -> usize;
}

/// Gamepad or other human input device.
pub trait InputDevice: Send {
    /// Wait up to `timeout` for events.
    fn poll(&mut self, timeout: Duration) -> Result<Vec<InputEvent>, HwError>;
}

/// Satellite positioning receiver.
pub trait GpsReceiver: Send {
    /// The newest fix, `None` if no new solution is available yet.
    fn read_fix(&mut self) -> Result<Option<GpsFix>, HwError>;
}
