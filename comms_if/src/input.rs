//! # Human input device interface
//!
//! Events produced by the gamepad once its wire protocol has been decoded.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Serialize, Deserialize};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Full scale of a raw axis reading.
pub const AXIS_FULL_SCALE: f32 = 32767.0;

/// Axis carrying the throttle (left stick Y, up is negative).
pub const THROTTLE_AXIS: u8 = 1;

/// Axis carrying the steering (right stick X).
pub const STEERING_AXIS: u8 = 2;

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Directional pad presses.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum DPad {
    Up,
    Down,
    Left,
    Right
}

/// Gamepad buttons.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Button {
    A,
    B,
    X,
    Y,
    L,
    R,
    Plus,
    Minus,
    Home
}

/// A single decoded input event.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub enum InputEvent {
    DPad(DPad),
    ButtonPress(Button),
    ButtonRelease(Button),

    /// A raw axis reading in `[-32767, 32767]`
    Axis {
        axis: u8,
        value: i16
    }
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Normalise a raw axis reading into `[-1, 1]`.
pub fn normalise_axis(value: i16) -> f32 {
    (value as f32 / AXIS_FULL_SCALE).max(-1.0).min(1.0)
}
