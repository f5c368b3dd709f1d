//! # Car Controller Equipment Communications Module
//!
//! The car controller drives the throttle ESC and the steering servo and
//! reports back the servo position and the wheel encoders.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Serialize, Deserialize};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Feedback read back from the car controller.
///
/// Wheels are ordered front left, front right, rear left, rear right.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq)]
pub struct CarFeedback {
    /// Raw steering servo position
    pub servo_pos: u8,

    /// Free running encoder tick counts, wrapping at `u16::MAX`
    pub wheel_pos: [u16; 4],

    /// Time between the last two ticks of each wheel in microseconds
    pub wheel_dt: [u16; 4]
}

/// Demands sent to the car controller.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq)]
pub struct ActuatorDems {
    /// Status LED state, non zero is lit
    pub led: u8,

    /// Throttle, -127 full reverse/brake to 127 full forward
    pub throttle: i8,

    /// Steering, -127 full right to 127 full left
    pub steering: i8
}

// ------------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// ------------------------------------------------------------------------------------------------

impl CarFeedback {
    /// Encoder ticks travelled by each wheel since `prev`, accounting for
    /// counter wrap.
    pub fn ticks_since(&self, prev: &CarFeedback) -> [u16; 4] {
        let mut ticks = [0u16; 4];
        for i in 0..4 {
            ticks[i] = self.wheel_pos[i].wrapping_sub(prev.wheel_pos[i]);
        }
        ticks
    }
}

impl ActuatorDems {
    /// Build demands from normalised commands in `[-1, 1]`.
    ///
    /// Out of range or NaN commands are clamped (NaN maps to zero).
    pub fn from_normalised(led: u8, throttle: f32, steering: f32) -> Self {
        Self {
            led,
            throttle: to_i8(throttle),
            steering: to_i8(steering)
        }
    }

    /// The all-stop demand, used to park the car.
    pub fn park(led: u8) -> Self {
        Self {
            led,
            throttle: 0,
            steering: 0
        }
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn to_i8(value: f32) -> i8 {
    if value.is_nan() {
        return 0;
    }

    (value.max(-1.0).min(1.0) * 127.0).round() as i8
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_from_normalised() {
        let d = ActuatorDems::from_normalised(0, 1.0, -1.0);
        assert_eq!(d.throttle, 127);
        assert_eq!(d.steering, -127);

        let d = ActuatorDems::from_normalised(0, 5.0, f32::NAN);
        assert_eq!(d.throttle, 127);
        assert_eq!(d.steering, 0);

        let d = ActuatorDems::from_normalised(0, 0.5, -0.25);
        assert_eq!(d.throttle, 64);
        assert_eq!(d.steering, -32);
    }

    #[test]
    fn test_ticks_since_wraps() {
        let prev = CarFeedback { wheel_pos: [65530, 10, 0, 0], ..Default::default() };
        let now = CarFeedback { wheel_pos: [4, 15, 0, 2], ..Default::default() };
        assert_eq!(now.ticks_since(&prev), [10, 5, 0, 2]);
    }
}
