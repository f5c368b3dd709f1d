//! # Simulated equipment
//!
//! A kinematic car driving around the cone map, with simulated versions of
//! every piece of equipment the drive executable uses. Running
//! `drive_exec --sim` exercises the complete stack without hardware.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod devices;
pub mod world;

pub use devices::*;
pub use world::{SharedWorld, SimWorld};

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::Deserialize;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for the simulation
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct SimParams {
    /// Distance between the axles
    pub wheelbase_m: f64,

    /// Steering angle at full lock
    pub max_steer_rad: f64,

    /// Acceleration at full throttle
    pub max_accel_ms2: f64,

    /// Deceleration at full brake
    pub max_brake_ms2: f64,

    /// Speed proportional drag
    pub drag_per_s: f64,

    /// Distance per encoder tick, matching the estimator's calibration
    pub meters_per_tick: f64,

    /// Half angle of the camera's field of view
    pub camera_half_fov_rad: f64,

    /// Cones further than this are not seen
    pub cone_range_m: f64,

    /// Standard deviation of the detected cone bearings
    pub bearing_noise_rad: f64,

    /// Constant gyro Z bias
    pub gyro_bias_rads: f64,

    /// Standard deviation of the gyro noise
    pub gyro_noise_rads: f64,

    /// Start pose of the car
    pub start_x_m: f64,
    pub start_y_m: f64,
    pub start_heading_rad: f64,

    /// Time after start at which the scripted operator presses Home
    pub home_at_s: f64,

    /// Time after start at which the scripted operator engages autodrive
    pub engage_at_s: f64,

    /// Throttle stick held by the scripted operator once engaged
    pub throttle_stick: f64,

    /// Random seed, zero seeds from entropy
    pub seed: u64,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum SimError {
    #[error("Could not spawn the simulated camera: {0}")]
    SpawnFailed(std::io::Error),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for SimParams {
    fn default() -> Self {
        Self {
            wheelbase_m: 0.26,
            max_steer_rad: 0.5,
            max_accel_ms2: 4.0,
            max_brake_ms2: 8.0,
            drag_per_s: 0.5,
            meters_per_tick: 0.0205,
            camera_half_fov_rad: 0.6,
            cone_range_m: 8.0,
            bearing_noise_rad: 0.01,
            gyro_bias_rads: 0.01,
            gyro_noise_rads: 0.005,
            start_x_m: 0.0,
            start_y_m: 0.0,
            start_heading_rad: 0.0,
            home_at_s: 0.5,
            engage_at_s: 1.0,
            throttle_stick: 0.6,
            seed: 0,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::DriverConfig;
    use crate::hw::{ConeDetector, FeedbackSource, Imu};
    use crate::loc::{landmarks, LocParams, Localizer, Pose2};
    use crate::veh_est::{self, VehicleEstimator};
    use chrono::Utc;
    use comms_if::eqpt::cam::Frame;
    use std::f64::consts::PI;
    use util::maths::wrap_pi;

    const DT: f64 = 1.0 / 30.0;

    /// Pose and curvature a distance `s_m` around the oval the cone map
    /// marks out: 20 m straights joined by 5 m radius turns, anticlockwise
    /// from the origin.
    fn oval(s_m: f64) -> (Pose2, f64) {
        let turn = 5.0 * PI;
        let s = s_m % (40.0 + 2.0 * turn);

        if s < 20.0 {
            (Pose2::new(s, 0.0, 0.0), 0.0)
        } else if s < 20.0 + turn {
            let t = (s - 20.0) / 5.0;
            (Pose2::new(20.0 + 5.0 * t.sin(), 5.0 - 5.0 * t.cos(), wrap_pi(t)), 0.2)
        } else if s < 40.0 + turn {
            (Pose2::new(20.0 - (s - 20.0 - turn), 10.0, PI), 0.0)
        } else {
            let t = (s - 40.0 - turn) / 5.0;
            (Pose2::new(-5.0 * t.sin(), 5.0 + 5.0 * t.cos(), wrap_pi(PI + t)), 0.2)
        }
    }

    #[test]
    fn test_localisation_follows_lap() {
        let cones = landmarks::parse(include_str!("../../../params/lm.txt")).unwrap();

        // Default sensor noise and gyro bias
        let world = SharedWorld::new(SimWorld::new(SimParams {
            seed: 7,
            ..Default::default()
        }));
        let mut imu = SimImu::new(world.clone());
        let mut feedback = SimFeedback::new(world.clone());
        let mut detector = SimConeDetector::new(world.clone(), cones.clone());

        let mut estimator = VehicleEstimator::with_params(veh_est::Params::default()).unwrap();
        let mut localizer = Localizer::new(LocParams {
            num_particles: 200,
            seed: 7,
            ..Default::default()
        })
        .unwrap();
        localizer.set_landmarks(cones).unwrap();

        let config = DriverConfig::default();
        let precision = config.cone_precision as f64 * localizer.params().precision_scale;
        let frame = Frame {
            timestamp: Utc::now(),
            width: 0,
            height: 0,
            data: Vec::new(),
        };

        let speed_ms = 2.0;
        let rest_frames = 30;
        let lap_frames = 1100;

        let mut bearings = Vec::new();
        let mut last_fb = feedback.read_feedback().unwrap();
        let mut max_err_m = 0.0f64;
        let mut max_heading_err_rad = 0.0f64;

        for i in 0..(rest_frames + lap_frames) {
            // A second at rest on the start line, then a lap at constant
            // speed with the car placed exactly on the oval
            if i == rest_frames {
                estimator.capture_gyro_bias();
            }
            if i >= rest_frames {
                let mut w = world.lock();
                let s_m = (i - rest_frames + 1) as f64 * speed_ms * DT;
                let (pose, curvature) = oval(s_m);
                w.pose = pose;
                w.v_ms = speed_ms;
                w.yaw_rate_rads = speed_ms * curvature;
                let ticks = speed_ms * DT / w.params().meters_per_tick;
                w.odometer_ticks += ticks;
                w.time_s += DT;
            }

            let sample = imu.read().unwrap();
            let fb = feedback.read_feedback().unwrap();
            let (state, report) = estimator.update(&veh_est::InputData {
                config,
                throttle: 0.0,
                steering: 0.0,
                imu: Some(sample),
                servo_pos: fb.servo_pos,
                wheel_delta: fb.ticks_since(&last_fb),
                dt_s: DT,
            });
            last_fb = fb;

            if report.ds_m > 0.0 {
                let yaw_rate = sample.yaw_rate_rads() as f64 - state.gyro_bias_rads;
                localizer.predict(report.ds_m, yaw_rate, DT);

                let n = detector.find_cones(&frame, 0.0, sample.yaw_rate_rads(), 10, &mut bearings);
                for &b in bearings.iter().take(n) {
                    localizer.update_lm(b as f64, precision);
                }
            }

            let truth = world.lock().pose;
            let est = localizer.location_estimate();
            max_err_m = max_err_m.max((est.position_m() - truth.position_m()).norm());
            max_heading_err_rad =
                max_heading_err_rad.max(wrap_pi(est.heading_rad - truth.heading_rad).abs());
        }

        assert!(localizer.report().num_updates > 1000);
        assert!(max_err_m < 0.3, "max position error {:.3} m", max_err_m);
        assert!(max_heading_err_rad < 0.1, "max heading error {:.3} rad", max_heading_err_rad);
    }
}
