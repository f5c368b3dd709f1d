//! # Drive Executable Parameters
//!
//! This module provide parameters for the drive executable.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Serialize, Deserialize};
use std::time::Duration;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Longest period or timeout accepted in the parameters.
const MAX_PERIOD_S: f64 = 3600.0;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct DriveExecParams {

    /// Nominal camera frame rate, used for the first frame's time step
    pub frame_rate_hz: f64,

    /// Gaps between frames, and real-time stalls in the frame context, longer than this are
    /// reported as warnings
    pub rt_warn_s: f64,

    /// Landmark (cone) map file, relative to the params directory
    pub landmarks_file: String,

    /// Reference track file, relative to the params directory
    pub track_file: String,

    /// True if the last track point joins back to the first
    pub track_closed: bool,

    /// Number of track segments either side of the last match searched by the tracker
    pub track_search_window: usize,

    /// If the local track match is further than this the tracker falls back to a global search
    pub track_reacquire_dist_m: f64,

    /// Driver configuration file, relative to the params directory
    pub driver_config_file: String,

    /// Number of frames skipped between recorded frames
    pub record_frameskip: u32,

    /// Maximum number of cones passed to the localiser per frame
    pub max_cones: usize,

    /// Period of the IMU and car feedback poller
    pub sensor_poll_period_s: f64,

    /// Period of the GPS poller
    pub gps_poll_period_s: f64,

    /// Input device poll timeout
    pub input_poll_timeout_s: f64,

    /// If the input device has not reported within this time the control loop treats it as lost
    pub input_timeout_s: f64,

    /// GPS local frame reference latitude in degrees * 1e7
    pub gps_ref_lat_e7: i32,

    /// GPS local frame reference longitude in degrees * 1e7
    pub gps_ref_lon_e7: i32,

    /// Write per-frame control telemetry to the session archive
    pub archive_telemetry: bool,

    /// Log a telemetry line every this many frames
    pub telemetry_log_period_frames: u64
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ParamsError {
    #[error("frame_rate_hz must be positive and finite, found {0}")]
    InvalidFrameRate(f64),

    #[error("{0} must be between 0 and 3600 s, found {1}")]
    InvalidPeriod(&'static str, f64),

    #[error("{0} must be finite and >= 0, found {1}")]
    InvalidDistance(&'static str, f64),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl DriveExecParams {
    /// Check that every rate, period and distance is usable.
    pub fn validate(&self) -> Result<(), ParamsError> {
        if !(self.frame_rate_hz > 0.0 && self.frame_rate_hz.is_finite()) {
            return Err(ParamsError::InvalidFrameRate(self.frame_rate_hz));
        }

        let periods = [
            ("rt_warn_s", self.rt_warn_s),
            ("sensor_poll_period_s", self.sensor_poll_period_s),
            ("gps_poll_period_s", self.gps_poll_period_s),
            ("input_poll_timeout_s", self.input_poll_timeout_s),
            ("input_timeout_s", self.input_timeout_s),
        ];
        for (name, value) in periods.iter() {
            if !(*value >= 0.0 && *value <= MAX_PERIOD_S) {
                return Err(ParamsError::InvalidPeriod(*name, *value));
            }
        }

        if !(self.track_reacquire_dist_m >= 0.0 && self.track_reacquire_dist_m.is_finite()) {
            return Err(ParamsError::InvalidDistance(
                "track_reacquire_dist_m",
                self.track_reacquire_dist_m,
            ));
        }

        Ok(())
    }

    /// Nominal time between camera frames.
    pub fn frame_period(&self) -> Duration {
        seconds(1.0 / self.frame_rate_hz)
    }

    pub fn sensor_poll_period(&self) -> Duration {
        seconds(self.sensor_poll_period_s)
    }

    pub fn gps_poll_period(&self) -> Duration {
        seconds(self.gps_poll_period_s)
    }

    pub fn input_poll_timeout(&self) -> Duration {
        seconds(self.input_poll_timeout_s)
    }

    pub fn input_timeout(&self) -> Duration {
        seconds(self.input_timeout_s)
    }
}

impl Default for DriveExecParams {
    fn default() -> Self {
        Self {
            frame_rate_hz: 30.0,
            rt_warn_s: 0.1,
            landmarks_file: "lm.txt".into(),
            track_file: "track.txt".into(),
            track_closed: true,
            track_search_window: 10,
            track_reacquire_dist_m: 1.0,
            driver_config_file: "driverconf.toml".into(),
            record_frameskip: 0,
            max_cones: 10,
            sensor_poll_period_s: 0.01,
            gps_poll_period_s: 0.2,
            input_poll_timeout_s: 0.05,
            input_timeout_s: 0.5,
            gps_ref_lat_e7: 0,
            gps_ref_lon_e7: 0,
            archive_telemetry: true,
            telemetry_log_period_frames: 30
        }
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Convert to a `Duration`, mapping anything out of range to the nearest
/// valid period.
fn seconds(s: f64) -> Duration {
    if s > 0.0 {
        Duration::from_secs_f64(s.min(MAX_PERIOD_S))
    } else {
        Duration::from_secs(0)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let p = DriveExecParams::default();
        p.validate().unwrap();
        assert_eq!(p.input_timeout(), Duration::from_millis(500));
        assert!((p.frame_period().as_secs_f64() - 1.0 / 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_periods_rejected() {
        let mut p = DriveExecParams::default();
        p.frame_rate_hz = 0.0;
        assert!(matches!(p.validate(), Err(ParamsError::InvalidFrameRate(_))));

        let mut p = DriveExecParams::default();
        p.gps_poll_period_s = -0.2;
        assert!(matches!(
            p.validate(),
            Err(ParamsError::InvalidPeriod("gps_poll_period_s", _))
        ));

        let mut p = DriveExecParams::default();
        p.input_timeout_s = f64::NAN;
        assert!(matches!(
            p.validate(),
            Err(ParamsError::InvalidPeriod("input_timeout_s", _))
        ));

        let mut p = DriveExecParams::default();
        p.track_reacquire_dist_m = f64::INFINITY;
        assert!(p.validate().is_err());

        // Unvalidated values never panic on conversion
        let mut p = DriveExecParams::default();
        p.frame_rate_hz = 0.0;
        p.input_timeout_s = f64::NAN;
        p.sensor_poll_period_s = -1.0;
        p.gps_poll_period_s = 1e300;
        assert_eq!(p.input_timeout(), Duration::from_secs(0));
        assert_eq!(p.sensor_poll_period(), Duration::from_secs(0));
        assert_eq!(p.gps_poll_period(), Duration::from_secs(3600));
        assert_eq!(p.frame_period(), Duration::from_secs(3600));
    }
}
