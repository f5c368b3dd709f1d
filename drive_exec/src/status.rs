//! # Status and telemetry reporting
//!
//! The control loop reports to the operator through a `StatusSink`. The car's
//! screen driver is one implementation, `LogStatusSink` sends everything to
//! the log instead.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::info;
use serde::Serialize;

// Internal
use crate::drive_ctrl::DriveMode;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// RGB565 status colours
pub const STATUS_WHITE: u16 = 0xffff;
pub const STATUS_YELLOW: u16 = 0xffe0;
pub const STATUS_GREEN: u16 = 0x07e0;
pub const STATUS_RED: u16 = 0xf800;

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// Destination for operator facing status.
pub trait StatusSink {
    /// Show a one line status message.
    fn status(&mut self, msg: &str, colour: u16);

    /// Show this cycle's telemetry.
    fn telemetry(&mut self, telem: &Telemetry);

    /// Show the configuration menu.
    fn config(&mut self, lines: &[String]);

    /// Switch to the next display page.
    fn next_display_mode(&mut self);
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Telemetry for one control cycle.
///
/// Kept flat so each cycle is one CSV row.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct Telemetry {
    pub time_s: f64,
    pub frame: u64,
    pub mode: DriveMode,

    // Localisation
    pub x_m: f64,
    pub y_m: f64,
    pub heading_rad: f64,
    pub neff: f64,
    pub num_cones: usize,

    // Track
    pub progress_m: f64,
    pub lat_error_m: f64,
    pub head_error_rad: f64,
    pub curvature_m: f64,

    // Vehicle state
    pub v_ms: f64,
    pub w_rads: f64,
    pub gyro_bias_rads: f64,
    pub target_v_ms: f64,

    // Commands
    pub throttle: f64,
    pub steering: f64,
    pub runaway: bool,
    pub recording: bool,

    // GPS, when a fix is available
    pub gps_east_m: Option<f64>,
    pub gps_north_m: Option<f64>,
    pub gps_speed_ms: Option<f64>,
}

/// Page shown by the `LogStatusSink`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayMode {
    /// Pose, speed and commands
    Drive,

    /// The configuration menu
    Config,

    /// Status messages only
    Quiet,
}

/// Reports status through the log.
pub struct LogStatusSink {
    mode: DisplayMode,

    /// Telemetry is logged every this many frames
    period_frames: u64,

    last_config: Vec<String>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl DisplayMode {
    pub fn next(self) -> Self {
        match self {
            DisplayMode::Drive => DisplayMode::Config,
            DisplayMode::Config => DisplayMode::Quiet,
            DisplayMode::Quiet => DisplayMode::Drive,
        }
    }
}

impl LogStatusSink {
    pub fn new(period_frames: u64) -> Self {
        Self {
            mode: DisplayMode::Drive,
            period_frames: period_frames.max(1),
            last_config: Vec::new(),
        }
    }

    pub fn mode(&self) -> DisplayMode {
        self.mode
    }

    fn log_config(&self) {
        for line in &self.last_config {
            info!("{}", line);
        }
    }
}

impl StatusSink for LogStatusSink {
    fn status(&mut self, msg: &str, colour: u16) {
        info!("[{}] {}", colour_name(colour), msg);
    }

    fn telemetry(&mut self, t: &Telemetry) {
        if self.mode != DisplayMode::Drive || t.frame % self.period_frames != 0 {
            return;
        }

        info!(
            "{:?} pos ({:.2}, {:.2}) hdg {:.1} deg, v {:.2}/{:.2} m/s, \
             u ({:.2}, {:.2}), lat err {:.2} m, {} cones, neff {:.0}",
            t.mode,
            t.x_m,
            t.y_m,
            t.heading_rad.to_degrees(),
            t.v_ms,
            t.target_v_ms,
            t.throttle,
            t.steering,
            t.lat_error_m,
            t.num_cones,
            t.neff
        );

        if let (Some(e), Some(n), Some(s)) = (t.gps_east_m, t.gps_north_m, t.gps_speed_ms) {
            info!("GPS ({:.1}, {:.1}) m, {:.2} m/s", e, n, s);
        }
    }

    fn config(&mut self, lines: &[String]) {
        if self.last_config.as_slice() == lines {
            return;
        }
        self.last_config = lines.to_vec();

        if self.mode == DisplayMode::Config {
            self.log_config();
        }
    }

    fn next_display_mode(&mut self) {
        self.mode = self.mode.next();
        info!("Display mode {:?}", self.mode);

        if self.mode == DisplayMode::Config {
            self.log_config();
        }
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn colour_name(colour: u16) -> &'static str {
    match colour {
        STATUS_WHITE => "info",
        STATUS_YELLOW => "rec",
        STATUS_GREEN => "ok",
        STATUS_RED => "fault",
        _ => "status",
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_display_modes_cycle() {
        let mut sink = LogStatusSink::new(0);
        assert_eq!(sink.mode(), DisplayMode::Drive);

        sink.next_display_mode();
        assert_eq!(sink.mode(), DisplayMode::Config);
        sink.next_display_mode();
        sink.next_display_mode();
        assert_eq!(sink.mode(), DisplayMode::Drive);

        // A zero period doesn't divide by zero
        sink.telemetry(&Telemetry::default());
    }

    #[test]
    fn test_config_lines_kept() {
        let mut sink = LogStatusSink::new(30);
        let lines = vec!["> max speed 3.00".to_string()];
        sink.config(&lines);
        assert_eq!(sink.last_config, lines);
    }

    #[test]
    fn test_colour_names() {
        assert_eq!(colour_name(STATUS_YELLOW), "rec");
        assert_eq!(colour_name(STATUS_GREEN), "ok");
        assert_eq!(colour_name(0x1234), "status");
    }
}
