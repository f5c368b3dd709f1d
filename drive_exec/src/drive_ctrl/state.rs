//! Drive control module state

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{info, warn};
use serde::Serialize;

// Internal
use super::{Params, PiController};
use crate::{config::DriverConfig, track::TrackGeometry, veh_est::VehicleState};
use util::maths::{clamp, deadband};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Drive control module state
pub struct DriveCtrl {
    params: Params,

    mode: DriveMode,

    /// True while the operator input has been lost
    runaway: bool,

    report: StatusReport,
}

/// Input data to drive control for one cycle.
#[derive(Debug, Clone, Copy)]
pub struct InputData {
    /// Operator throttle stick, normalised
    pub js_throttle: f64,

    /// Operator steering stick, normalised
    pub js_steering: f64,

    /// False if the operator input device has stopped reporting
    pub input_fresh: bool,

    /// Track at the car's estimated position
    pub geometry: TrackGeometry,

    pub dt_s: f64,
}

/// Commands for the car, normalised to `[-1, 1]`.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq)]
pub struct OutputData {
    pub throttle: f64,
    pub steering: f64,
}

/// Status report for drive control.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct StatusReport {
    pub mode: DriveMode,

    /// Target speed in autodrive
    pub target_v_ms: f64,

    /// Curvature demand in autodrive
    pub curv_dem_m: f64,

    /// True if the speed target was reduced by the traction limit
    pub traction_limited: bool,

    /// True if the car is being stopped because the operator input was lost
    pub runaway: bool,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// The drive control mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DriveMode {
    Manual,
    Autodrive,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for DriveMode {
    fn default() -> Self {
        DriveMode::Manual
    }
}

impl DriveCtrl {
    pub fn new(params: Params) -> Self {
        Self {
            params,
            mode: DriveMode::Manual,
            runaway: false,
            report: StatusReport::default(),
        }
    }

    pub fn mode(&self) -> DriveMode {
        self.mode
    }

    pub fn report(&self) -> &StatusReport {
        &self.report
    }

    /// Switch to autodrive.
    ///
    /// The integrators are reset so that a stale integral does not bump the
    /// car on engagement.
    pub fn engage(&mut self, state: &mut VehicleState) {
        if self.mode != DriveMode::Autodrive {
            info!("Autodrive ON");
            self.mode = DriveMode::Autodrive;
        }
        reset_integrators(state);
    }

    /// Return to manual control, resetting the integrators.
    pub fn disengage(&mut self, state: &mut VehicleState) {
        if self.mode != DriveMode::Manual {
            info!("Autodrive OFF");
            self.mode = DriveMode::Manual;
        }
        reset_integrators(state);
    }

    /// Compute the commands for this cycle.
    pub fn get_control(
        &mut self,
        config: &DriverConfig,
        state: &mut VehicleState,
        input: &InputData,
    ) -> OutputData {
        self.report = StatusReport {
            mode: self.mode,
            ..Default::default()
        };

        // ---- RUNAWAY ----

        if !input.input_fresh {
            if !self.runaway {
                warn!("Operator input lost, stopping the car");
            }
            self.runaway = true;
            self.report.runaway = true;
            reset_integrators(state);

            return OutputData {
                throttle: 0.0,
                steering: clamp(&config.servo_offset(), &config.servo_min(), &config.servo_max()),
            };
        }
        if self.runaway {
            info!("Operator input restored");
            self.runaway = false;
        }

        match self.mode {
            DriveMode::Manual => self.manual(config, state, input),
            DriveMode::Autodrive => self.autodrive(config, state, input),
        }
    }

    fn manual(
        &mut self,
        config: &DriverConfig,
        state: &mut VehicleState,
        input: &InputData,
    ) -> OutputData {
        reset_integrators(state);

        let throttle = clamp(&deadband(input.js_throttle, self.params.manual_deadband), &-1.0, &1.0);
        let steering = clamp(
            &(deadband(input.js_steering, self.params.manual_deadband) + config.servo_offset()),
            &config.servo_min(),
            &config.servo_max(),
        );

        OutputData {
            throttle: nan_to_zero(throttle),
            steering: nan_to_zero(steering),
        }
    }

    fn autodrive(
        &mut self,
        config: &DriverConfig,
        state: &mut VehicleState,
        input: &InputData,
    ) -> OutputData {
        let geom = &input.geometry;

        // ---- SPEED ----

        let mut target_v = config.max_speed_ms() * clamp(&input.js_throttle, &0.0, &1.0);

        let k_abs = geom.curvature_m.abs();
        if k_abs > self.params.min_traction_curvature_m {
            let v_traction = (config.traction_limit_ms2().max(0.0) / k_abs).sqrt();
            if v_traction < target_v {
                target_v = v_traction;
                self.report.traction_limited = true;
            }
        }
        self.report.target_v_ms = target_v;

        // Only brake if we need to slow down significantly
        let min_throttle = if target_v < state.v_ms * self.params.brake_speed_ratio {
            -1.0
        } else {
            0.0
        };

        let throttle_ctrl = PiController::new(config.motor_gain(), config.motor_ki());
        let throttle = throttle_ctrl.get(
            target_v - state.v_ms,
            input.dt_s,
            &mut state.ierr_v,
            min_throttle,
            1.0,
        );

        // ---- STEERING ----

        // Lateral error integral, frozen when the steering saturates
        if self.params.steering_ki != 0.0 && input.dt_s > 0.0 && input.dt_s.is_finite() {
            let trial = state.ierr_k + geom.lat_error_m * input.dt_s;
            let u = self.steering_from_curvature(config, self.curvature_demand(config, geom, trial));
            if u > config.servo_min() && u < config.servo_max() {
                state.ierr_k = trial;
            }
        }

        let curv_dem = self.curvature_demand(config, geom, state.ierr_k);
        self.report.curv_dem_m = curv_dem;

        let steering = clamp(
            &self.steering_from_curvature(config, curv_dem),
            &config.servo_min(),
            &config.servo_max(),
        );

        OutputData {
            throttle: nan_to_zero(throttle),
            steering: nan_to_zero(steering),
        }
    }

    fn curvature_demand(&self, config: &DriverConfig, geom: &TrackGeometry, ierr_k: f64) -> f64 {
        geom.curvature_m
            - config.steering_kp() * geom.lat_error_m
            - config.steering_kd() * geom.head_error_rad
            - self.params.steering_ki * ierr_k
    }

    fn steering_from_curvature(&self, config: &DriverConfig, curv_m: f64) -> f64 {
        curv_m / self.params.max_curvature_m + config.servo_offset()
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn reset_integrators(state: &mut VehicleState) {
    state.ierr_v = 0.0;
    state.ierr_k = 0.0;
}

fn nan_to_zero(v: f64) -> f64 {
    if v.is_nan() {
        0.0
    } else {
        v
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use nalgebra::Vector2;

    fn geometry(curvature_m: f64, lat_error_m: f64, head_error_rad: f64) -> TrackGeometry {
        TrackGeometry {
            closest_m: Vector2::new(0.0, 0.0),
            tangent: Vector2::new(1.0, 0.0),
            normal: Vector2::new(0.0, 1.0),
            curvature_m,
            progress_m: 0.0,
            lat_error_m,
            head_error_rad,
            segment: 0,
        }
    }

    fn input(js_throttle: f64, js_steering: f64, geometry: TrackGeometry) -> InputData {
        InputData {
            js_throttle,
            js_steering,
            input_fresh: true,
            geometry,
            dt_s: 1.0 / 30.0,
        }
    }

    #[test]
    fn test_manual_passthrough() {
        let mut ctrl = DriveCtrl::new(Params::default());
        let config = DriverConfig::default();
        let mut state = VehicleState { ierr_v: 2.0, ierr_k: 1.0, ..Default::default() };

        let out = ctrl.get_control(&config, &mut state, &input(0.5, -0.3, geometry(0.0, 0.0, 0.0)));
        assert_eq!(out, OutputData { throttle: 0.5, steering: -0.3 });
        assert_eq!(state.ierr_v, 0.0);
        assert_eq!(state.ierr_k, 0.0);

        // Deadband and clamp
        let out = ctrl.get_control(&config, &mut state, &input(0.02, 1.7, geometry(0.0, 0.0, 0.0)));
        assert_eq!(out, OutputData { throttle: 0.0, steering: 1.0 });

        let out = ctrl.get_control(&config, &mut state, &input(f64::NAN, -3.0, geometry(0.0, 0.0, 0.0)));
        assert_eq!(out, OutputData { throttle: 0.0, steering: -1.0 });
    }

    #[test]
    fn test_runaway_stops_car() {
        let mut ctrl = DriveCtrl::new(Params::default());
        let mut config = DriverConfig::default();
        config.servo_offset = 5;
        let mut state = VehicleState::default();

        ctrl.engage(&mut state);
        let mut i = input(1.0, 0.0, geometry(0.0, 0.0, 0.0));
        i.input_fresh = false;

        let out = ctrl.get_control(&config, &mut state, &i);
        assert_eq!(out.throttle, 0.0);
        assert!((out.steering - 0.05).abs() < 1e-12);
        assert!(ctrl.report().runaway);
        assert_eq!(ctrl.mode(), DriveMode::Autodrive);

        // Recovers once the input is back
        i.input_fresh = true;
        let out = ctrl.get_control(&config, &mut state, &i);
        assert!(out.throttle > 0.0);
        assert!(!ctrl.report().runaway);
    }

    #[test]
    fn test_autodrive_speed() {
        let mut ctrl = DriveCtrl::new(Params::default());
        let config = DriverConfig::default();
        let mut state = VehicleState { v_ms: 1.0, ..Default::default() };

        ctrl.engage(&mut state);
        let out = ctrl.get_control(&config, &mut state, &input(0.5, 0.0, geometry(0.0, 0.0, 0.0)));

        assert_eq!(ctrl.report().target_v_ms, 1.5);
        assert!(out.throttle > 0.0);
        assert!(state.ierr_v > 0.0);
        assert_eq!(out.steering, 0.0);

        // Negative stick is no speed, and braking is allowed well above target
        state.v_ms = 3.0;
        let out = ctrl.get_control(&config, &mut state, &input(-1.0, 0.0, geometry(0.0, 0.0, 0.0)));
        assert_eq!(ctrl.report().target_v_ms, 0.0);
        assert!(out.throttle < 0.0);

        // Near the target no braking is allowed
        state.v_ms = 1.6;
        state.ierr_v = 0.0;
        let out = ctrl.get_control(&config, &mut state, &input(0.5, 0.0, geometry(0.0, 0.0, 0.0)));
        assert_eq!(out.throttle, 0.0);
    }

    #[test]
    fn test_traction_limit() {
        let mut ctrl = DriveCtrl::new(Params::default());
        let config = DriverConfig::default();
        let mut state = VehicleState::default();

        ctrl.engage(&mut state);
        ctrl.get_control(&config, &mut state, &input(1.0, 0.0, geometry(1.5, 0.0, 0.0)));

        // sqrt(6 / 1.5) = 2 < 3
        assert!((ctrl.report().target_v_ms - 2.0).abs() < 1e-12);
        assert!(ctrl.report().traction_limited);
    }

    #[test]
    fn test_steering_law() {
        let mut ctrl = DriveCtrl::new(Params::default());
        let config = DriverConfig::default();
        let mut state = VehicleState::default();
        ctrl.engage(&mut state);

        // Feed-forward only
        let out = ctrl.get_control(&config, &mut state, &input(0.0, 0.0, geometry(0.5, 0.0, 0.0)));
        assert!((out.steering - 0.25).abs() < 1e-12);

        // Left of the track and pointing left, steer right
        let out = ctrl.get_control(&config, &mut state, &input(0.0, 0.0, geometry(0.0, 0.4, 0.5)));
        let expected = (-0.5 * 0.4 - 0.8 * 0.5) / 2.0;
        assert!((out.steering - expected).abs() < 1e-12);
        assert!((ctrl.report().curv_dem_m + 0.6).abs() < 1e-12);

        // Saturates at the configured range
        let out = ctrl.get_control(&config, &mut state, &input(0.0, 0.0, geometry(10.0, 0.0, 0.0)));
        assert_eq!(out.steering, 1.0);
    }

    #[test]
    fn test_engage_disengage_resets_integrators() {
        let mut ctrl = DriveCtrl::new(Params::default());
        let config = DriverConfig::default();
        let mut state = VehicleState::default();

        ctrl.engage(&mut state);
        for _ in 0..10 {
            ctrl.get_control(&config, &mut state, &input(0.5, 0.0, geometry(0.0, 0.0, 0.0)));
        }
        assert!(state.ierr_v > 0.0);

        ctrl.disengage(&mut state);
        assert_eq!(ctrl.mode(), DriveMode::Manual);
        assert_eq!(state.ierr_v, 0.0);

        ctrl.engage(&mut state);
        assert_eq!(state.ierr_v, 0.0);
    }
}
