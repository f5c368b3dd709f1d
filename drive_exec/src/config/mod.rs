//! # Driver configuration
//!
//! The driver configuration holds the gains and limits the operator tunes at
//! the track side. Every value is stored as a signed 16 bit count of
//! hundredths, so `150` means `1.50`.
//!
//! The configuration is persisted as a TOML table keyed by field. The
//! control loop saves it by handing `to_toml`'s output to the `AsyncWriter`,
//! which replaces the file atomically so that a partially written
//! configuration never reaches the disk.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod menu;

pub use menu::ConfigMenu;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::warn;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Operator tunable configuration, in hundredths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Cone detection threshold
    pub cone_thresh: i16,

    /// Maximum speed in m/s
    pub max_speed: i16,

    /// Maximum lateral acceleration in m/s^2
    pub traction_limit: i16,

    /// Steering proportional gain on lateral error
    pub steering_kp: i16,

    /// Steering derivative gain, applied to the heading error
    pub steering_kd: i16,

    /// Bandwidth of the wheel speed filter in rad/s
    pub motor_bw: i16,

    /// Bandwidth of the yaw rate filter in rad/s
    pub yaw_rate_bw: i16,

    /// Cone bearing precision
    pub cone_precision: i16,

    /// Throttle proportional gain on speed error
    pub motor_gain: i16,

    /// Throttle integral gain on speed error
    pub motor_ki: i16,

    /// Steering trim
    pub servo_offset: i16,

    /// Lowest steering command
    pub servo_min: i16,

    /// Highest steering command
    pub servo_max: i16,
}

/// Describes one field of the configuration for the menu.
pub struct ConfigField {
    /// Name shown to the operator
    pub name: &'static str,

    /// Key used in the persisted file
    pub key: &'static str,

    pub get: fn(&DriverConfig) -> i16,
    pub set: fn(&mut DriverConfig, i16),
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot read the driver configuration {0:?}: {1}")]
    ReadError(PathBuf, std::io::Error),

    #[error("Cannot parse the driver configuration {0:?}: {1}")]
    ParseError(PathBuf, toml::de::Error),

    #[error("Cannot serialise the driver configuration: {0}")]
    SerialiseError(toml::ser::Error),

}

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

macro_rules! field {
    ($name:expr, $key:ident) => {
        ConfigField {
            name: $name,
            key: stringify!($key),
            get: |c| c.$key,
            set: |c, v| c.$key = v,
        }
    };
}

/// The configuration fields in menu order.
pub const FIELDS: &[ConfigField] = &[
    field!("cone thresh", cone_thresh),
    field!("max speed", max_speed),
    field!("traction limit", traction_limit),
    field!("steering kP", steering_kp),
    field!("steering kD", steering_kd),
    field!("motor bw", motor_bw),
    field!("yaw rate bw", yaw_rate_bw),
    field!("cone precision", cone_precision),
    field!("motor gain", motor_gain),
    field!("motor kI", motor_ki),
    field!("servo offset", servo_offset),
    field!("servo min", servo_min),
    field!("servo max", servo_max),
];

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            cone_thresh: 150,
            max_speed: 300,
            traction_limit: 600,
            steering_kp: 50,
            steering_kd: 80,
            motor_bw: 1000,
            yaw_rate_bw: 1000,
            cone_precision: 100,
            motor_gain: 50,
            motor_ki: 20,
            servo_offset: 0,
            servo_min: -100,
            servo_max: 100,
        }
    }
}

impl DriverConfig {
    /// Load the configuration from a TOML file.
    ///
    /// Missing keys take their default values, unknown keys are ignored with
    /// a warning.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(path.to_path_buf(), e))?;

        Self::from_toml(&text).map_err(|e| ConfigError::ParseError(path.to_path_buf(), e))
    }

    /// Parse the configuration from TOML text.
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        let table: toml::value::Table = toml::from_str(text)?;

        for key in table.keys() {
            if !FIELDS.iter().any(|f| f.key == key) {
                warn!("Ignoring unknown driver configuration key {:?}", key);
            }
        }

        toml::Value::Table(table).try_into()
    }

    /// Serialise the configuration to TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string(self).map_err(ConfigError::SerialiseError)
    }

    pub fn cone_thresh(&self) -> f64 {
        hundredths(self.cone_thresh)
    }

    pub fn max_speed_ms(&self) -> f64 {
        hundredths(self.max_speed)
    }

    pub fn traction_limit_ms2(&self) -> f64 {
        hundredths(self.traction_limit)
    }

    pub fn steering_kp(&self) -> f64 {
        hundredths(self.steering_kp)
    }

    pub fn steering_kd(&self) -> f64 {
        hundredths(self.steering_kd)
    }

    pub fn motor_bw_rads(&self) -> f64 {
        hundredths(self.motor_bw)
    }

    pub fn yaw_rate_bw_rads(&self) -> f64 {
        hundredths(self.yaw_rate_bw)
    }

    pub fn cone_precision(&self) -> f64 {
        hundredths(self.cone_precision)
    }

    pub fn motor_gain(&self) -> f64 {
        hundredths(self.motor_gain)
    }

    pub fn motor_ki(&self) -> f64 {
        hundredths(self.motor_ki)
    }

    pub fn servo_offset(&self) -> f64 {
        hundredths(self.servo_offset)
    }

    pub fn servo_min(&self) -> f64 {
        hundredths(self.servo_min)
    }

    pub fn servo_max(&self) -> f64 {
        hundredths(self.servo_max)
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Format a hundredths value for display, e.g. `-5` as `-0.05`.
pub fn format_hundredths(value: i16) -> String {
    let v = value as i32;
    let sign = if v < 0 { "-" } else { "" };
    format!("{}{}.{:02}", sign, v.abs() / 100, v.abs() % 100)
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn hundredths(value: i16) -> f64 {
    value as f64 * 0.01
}
