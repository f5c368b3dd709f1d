//! Vehicle estimator state

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, warn};
use serde::Serialize;

// Internal
use super::{Params, VehEstError};
use crate::config::DriverConfig;
use comms_if::eqpt::imu::ImuSample;
use util::{maths::low_pass_alpha, module::State, params, session::Session};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Filtered dynamic state of the car.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq)]
pub struct VehicleState {
    /// Forward speed in m/s
    pub v_ms: f64,

    /// Bias corrected yaw rate in rad/s
    pub w_rads: f64,

    /// Learnt gyro Z bias in rad/s
    pub gyro_bias_rads: f64,

    /// Steering position read back from the servo, normalised
    pub steer_readback: f64,

    /// Integral of the speed error, owned by the throttle controller
    pub ierr_v: f64,

    /// Integral of the lateral error, owned by the steering controller
    pub ierr_k: f64,

    /// True if the last IMU sample was missing and the previous one reused
    pub imu_stale: bool,

    /// True while the speed estimate is held after braking
    pub braking: bool,
}

/// Input data to the estimator for one cycle.
#[derive(Debug, Clone, Copy)]
pub struct InputData {
    pub config: DriverConfig,

    /// Throttle command sent last cycle, normalised
    pub throttle: f64,

    /// Steering command sent last cycle, normalised
    pub steering: f64,

    /// IMU sample for this cycle, `None` if the read failed
    pub imu: Option<ImuSample>,

    /// Raw servo position
    pub servo_pos: u8,

    /// Encoder ticks since the previous cycle, front left, front right,
    /// rear left, rear right
    pub wheel_delta: [u16; 4],

    /// Time since the previous cycle
    pub dt_s: f64,
}

/// Status report for the estimator.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct StatusReport {
    /// Distance travelled this cycle according to the front wheels
    pub ds_m: f64,

    /// Unfiltered front wheel speed
    pub v_meas_ms: f64,

    pub stationary: bool,
    pub imu_stale: bool,

    /// True if the cycle was rejected because of an invalid time step
    pub dt_rejected: bool,
}

/// Vehicle state estimator
#[derive(Debug, Default)]
pub struct VehicleEstimator {
    params: Params,

    state: VehicleState,

    /// Last valid IMU sample, substituted when a read fails
    last_imu: Option<ImuSample>,

    /// Remaining cycles to hold the speed estimate
    brake_cycles_left: u32,

    /// True if the previous throttle command was braking
    prev_braking_cmd: bool,

    /// Sum and count of the raw gyro Z readings since the car came to rest
    still_gyro_sum: f64,
    still_cycles: u32,

    report: StatusReport,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl State for VehicleEstimator {
    type InitData = &'static str;
    type InitError = VehEstError;

    type InputData = InputData;
    type OutputData = VehicleState;
    type StatusReport = StatusReport;
    type ProcError = VehEstError;

    /// Initialise the estimator.
    ///
    /// Expected init data is the path to the parameter file
    fn init(&mut self, init_data: Self::InitData, _session: &Session)
        -> Result<(), Self::InitError>
    {
        let params: Params = params::load(init_data).map_err(VehEstError::ParamLoadError)?;
        *self = Self::with_params(params)?;
        Ok(())
    }

    fn proc(&mut self, input_data: &Self::InputData)
        -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError>
    {
        Ok(self.update(input_data))
    }
}

impl VehicleEstimator {
    /// Create an estimator from parameters.
    pub fn with_params(params: Params) -> Result<Self, VehEstError> {
        if !(params.meters_per_tick > 0.0 && params.meters_per_tick.is_finite()) {
            return Err(VehEstError::InvalidParams(format!(
                "meters_per_tick must be positive, found {}",
                params.meters_per_tick
            )));
        }
        if params.servo_scale == 0.0 || !params.servo_scale.is_finite() {
            return Err(VehEstError::InvalidParams("servo_scale must be non-zero".into()));
        }

        Ok(Self {
            params,
            ..Default::default()
        })
    }

    /// Advance the estimate by one cycle.
    ///
    /// A non-positive or non-finite time step leaves the state untouched.
    pub fn update(&mut self, input: &InputData) -> (VehicleState, StatusReport) {
        self.report = StatusReport::default();

        if !(input.dt_s > 0.0 && input.dt_s.is_finite()) {
            warn!("Rejecting estimator update with dt = {}", input.dt_s);
            self.report.dt_rejected = true;
            return (self.state, self.report);
        }
        let dt = input.dt_s;

        // ---- IMU ----

        let imu = match input.imu {
            Some(s) if s.is_valid() => {
                self.last_imu = Some(s);
                self.state.imu_stale = false;
                s
            }
            _ => {
                if !self.state.imu_stale {
                    warn!("IMU sample missing, reusing the last good sample");
                }
                self.state.imu_stale = true;
                self.last_imu.unwrap_or_default()
            }
        };
        self.report.imu_stale = self.state.imu_stale;

        // ---- SPEED ----

        // Front wheels only, the rears slip under power
        let front_ticks = input.wheel_delta[0] as f64 + input.wheel_delta[1] as f64;
        let ds_m = 0.5 * front_ticks * self.params.meters_per_tick;
        let v_meas = ds_m / dt;
        self.report.ds_m = ds_m;
        self.report.v_meas_ms = v_meas;

        // Forward acceleration propagates the estimate between encoder
        // ticks, a stale sample contributes nothing
        let accel = if self.state.imu_stale {
            0.0
        } else {
            imu.accel_ms2[0] as f64
        };
        let v_pred = self.state.v_ms + accel * dt;

        // Locked wheels under braking read zero, so hold the estimate for a
        // few cycles after the brakes are applied
        let braking_cmd = input.throttle < self.params.brake_threshold;
        if braking_cmd && !self.prev_braking_cmd {
            self.brake_cycles_left = self.params.brake_hold_cycles;
        }
        self.prev_braking_cmd = braking_cmd;

        if self.brake_cycles_left > 0 {
            self.brake_cycles_left -= 1;
            self.state.v_ms = (v_pred * self.params.brake_decay).max(0.0);
            self.state.braking = true;
        } else {
            let a = low_pass_alpha(input.config.motor_bw_rads(), dt);
            self.state.v_ms = v_pred + a * (v_meas - v_pred);
            self.state.braking = false;
        }

        // ---- YAW RATE ----

        let raw_w = imu.yaw_rate_rads() as f64;
        let stationary = v_meas.abs() < self.params.stationary_speed_ms;
        self.report.stationary = stationary;

        if !self.state.imu_stale {
            if stationary {
                self.still_gyro_sum += raw_w;
                self.still_cycles += 1;

                if self.still_cycles >= self.params.bias_settle_cycles {
                    self.state.gyro_bias_rads = self.still_gyro_sum / self.still_cycles as f64;
                }
            } else {
                self.still_gyro_sum = 0.0;
                self.still_cycles = 0;
            }
        }

        let a_yaw = low_pass_alpha(input.config.yaw_rate_bw_rads(), dt);
        self.state.w_rads += a_yaw * ((raw_w - self.state.gyro_bias_rads) - self.state.w_rads);

        // ---- STEERING READBACK ----

        self.state.steer_readback =
            (input.servo_pos as f64 - self.params.servo_center) / self.params.servo_scale;

        (self.state, self.report)
    }

    pub fn state(&self) -> &VehicleState {
        &self.state
    }

    /// Mutable access for the controllers' integral terms.
    pub fn state_mut(&mut self) -> &mut VehicleState {
        &mut self.state
    }

    pub fn report(&self) -> &StatusReport {
        &self.report
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Reset the dynamic state and integrators, keeping the learnt gyro bias.
    pub fn reset(&mut self) {
        self.state = VehicleState {
            gyro_bias_rads: self.state.gyro_bias_rads,
            ..Default::default()
        };
        self.brake_cycles_left = 0;
        self.prev_braking_cmd = false;

        debug!("Vehicle state reset");
    }

    /// Zero the controllers' integral terms.
    pub fn reset_integrators(&mut self) {
        self.state.ierr_v = 0.0;
        self.state.ierr_k = 0.0;
    }

    /// Take the mean raw gyro reading since the car came to rest as the
    /// bias, without waiting for the settling period.
    ///
    /// Does nothing if the car was moving on the last cycle.
    pub fn capture_gyro_bias(&mut self) {
        if self.still_cycles == 0 {
            debug!("Not stationary, keeping the gyro bias of {:.5} rad/s", self.state.gyro_bias_rads);
            return;
        }

        self.state.gyro_bias_rads = self.still_gyro_sum / self.still_cycles as f64;
        debug!(
            "Gyro bias captured over {} cycles: {:.5} rad/s",
            self.still_cycles, self.state.gyro_bias_rads
        );
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const DT: f64 = 1.0 / 30.0;

    fn input(throttle: f64, gyro_z: f32, ticks: u16) -> InputData {
        InputData {
            config: DriverConfig::default(),
            throttle,
            steering: 0.0,
            imu: Some(ImuSample {
                gyro_rads: [0.0, 0.0, gyro_z],
                ..Default::default()
            }),
            servo_pos: 127,
            wheel_delta: [ticks, ticks, 0, 0],
            dt_s: DT,
        }
    }

    fn estimator() -> VehicleEstimator {
        VehicleEstimator::with_params(Params::default()).unwrap()
    }

    #[test]
    fn test_speed_converges() {
        let mut est = estimator();
        let expected = 10.0 * Params::default().meters_per_tick / DT;

        for _ in 0..200 {
            est.update(&input(0.3, 0.0, 10));
        }

        assert!((est.state().v_ms - expected).abs() < 1e-6);
        assert!((est.report().ds_m - 10.0 * Params::default().meters_per_tick).abs() < 1e-12);
        assert!(!est.state().braking);
    }

    #[test]
    fn test_brake_hold() {
        let mut est = estimator();
        for _ in 0..200 {
            est.update(&input(0.3, 0.0, 10));
        }
        let v0 = est.state().v_ms;

        // Wheels lock, the estimate decays rather than dropping to zero
        for i in 1..=5 {
            est.update(&input(-0.5, 0.0, 0));
            assert!(est.state().braking);
            assert!((est.state().v_ms - v0 * 0.95f64.powi(i)).abs() < 1e-9);
        }

        // Hold expires even if the brake stays on
        est.update(&input(-0.5, 0.0, 0));
        assert!(!est.state().braking);
        assert!(est.state().v_ms < v0 * 0.95f64.powi(5));
    }

    #[test]
    fn test_gyro_bias_learnt_when_stationary() {
        let mut est = estimator();
        for _ in 0..2000 {
            est.update(&input(0.0, 0.02, 0));
        }

        assert!((est.state().gyro_bias_rads - 0.02).abs() < 1e-4);
        assert!(est.state().w_rads.abs() < 1e-3);

        // Moving, bias is frozen and the yaw rate tracks the gyro
        for _ in 0..200 {
            est.update(&input(0.3, 0.52, 10));
        }
        assert!((est.state().gyro_bias_rads - 0.02).abs() < 1e-4);
        assert!((est.state().w_rads - 0.5).abs() < 1e-3);
    }

    #[test]
    fn test_capture_gyro_bias() {
        let mut est = estimator();

        // Moving, there is nothing to capture
        for _ in 0..50 {
            est.update(&input(0.3, 0.1, 10));
        }
        est.capture_gyro_bias();
        assert_eq!(est.state().gyro_bias_rads, 0.0);

        // A third of a second at rest is too short to learn the bias
        // automatically, but capturing takes the mean straight away
        for _ in 0..10 {
            est.update(&input(0.0, 0.01, 0));
        }
        assert_eq!(est.state().gyro_bias_rads, 0.0);

        est.capture_gyro_bias();
        assert!((est.state().gyro_bias_rads - 0.01).abs() < 1e-6);
    }

    #[test]
    fn test_heading_holds_after_standstill() {
        let mut est = estimator();
        let bias = 0.01f32;

        // Parked for a second with a biased gyro
        for _ in 0..30 {
            est.update(&input(0.0, bias, 0));
        }
        est.capture_gyro_bias();
        assert!((est.state().gyro_bias_rads - bias as f64).abs() < 1e-9);

        // Driving straight for ten seconds, the integrated heading stays
        // fixed where the raw gyro alone would drift by 0.1 rad
        let mut heading = 0.0;
        for _ in 0..300 {
            let (state, _) = est.update(&input(0.3, bias, 10));
            heading += state.w_rads * DT;
        }
        assert!(heading.abs() < 1e-4, "{}", heading);
    }

    #[test]
    fn test_moving_samples_do_not_corrupt_bias() {
        let mut est = estimator();
        for _ in 0..30 {
            est.update(&input(0.0, 0.01, 0));
        }

        // Turning slowly, with odd cycles between encoder ticks reading as
        // stationary
        for i in 0..300 {
            let ticks = if i % 4 == 0 { 0 } else { 1 };
            est.update(&input(0.3, 0.5, ticks));
        }
        assert!((est.state().gyro_bias_rads - 0.01).abs() < 1e-6);
    }

    #[test]
    fn test_accel_propagates_speed() {
        let mut est = estimator();
        for _ in 0..200 {
            est.update(&input(0.3, 0.0, 10));
        }
        let v0 = est.state().v_ms;

        let mut i = input(0.3, 0.0, 10);
        i.imu = Some(ImuSample {
            accel_ms2: [3.0, 0.0, 9.81],
            ..Default::default()
        });
        let v1 = est.update(&i).0.v_ms;

        let a = low_pass_alpha(DriverConfig::default().motor_bw_rads(), DT);
        assert!((v1 - v0 - (1.0 - a) * 3.0 * DT).abs() < 1e-9);

        // Braking with the wheels locked, the deceleration adds to the decay
        let mut i = input(-0.5, 0.0, 0);
        i.imu = Some(ImuSample {
            accel_ms2: [-6.0, 0.0, 9.81],
            ..Default::default()
        });
        let v2 = est.update(&i).0.v_ms;
        assert!((v2 - (v1 - 6.0 * DT) * 0.95).abs() < 1e-9);
    }

    #[test]
    fn test_missing_imu_reuses_last_sample() {
        let mut est = estimator();
        for _ in 0..200 {
            est.update(&input(0.3, 0.4, 10));
        }
        let w = est.state().w_rads;

        let mut i = input(0.3, 0.0, 10);
        i.imu = None;
        let (state, report) = est.update(&i);
        assert!(state.imu_stale);
        assert!(report.imu_stale);
        assert!((state.w_rads - w).abs() < 1e-6);

        let mut i = input(0.3, 0.0, 10);
        i.imu = Some(ImuSample { gyro_rads: [0.0, 0.0, f32::NAN], ..Default::default() });
        assert!(est.update(&i).0.imu_stale);

        assert!(!est.update(&input(0.3, 0.4, 10)).0.imu_stale);
    }

    #[test]
    fn test_invalid_dt_keeps_state() {
        let mut est = estimator();
        for _ in 0..10 {
            est.update(&input(0.3, 0.1, 10));
        }
        let before = *est.state();

        for dt in [0.0, -1.0, f64::NAN, f64::INFINITY].iter() {
            let mut i = input(0.3, 0.1, 10);
            i.dt_s = *dt;
            let (state, report) = est.update(&i);
            assert!(report.dt_rejected);
            assert_eq!(state, before);
        }
    }

    #[test]
    fn test_reset_keeps_bias() {
        let mut est = estimator();
        for _ in 0..2000 {
            est.update(&input(0.0, 0.02, 0));
        }
        est.state_mut().ierr_v = 3.0;
        est.state_mut().ierr_k = -1.0;
        est.state_mut().v_ms = 2.0;

        est.reset_integrators();
        assert_eq!(est.state().ierr_v, 0.0);
        assert_eq!(est.state().v_ms, 2.0);

        let bias = est.state().gyro_bias_rads;
        est.reset();
        assert_eq!(est.state().v_ms, 0.0);
        assert_eq!(est.state().gyro_bias_rads, bias);
    }

    #[test]
    fn test_steer_readback() {
        let mut est = estimator();
        let mut i = input(0.0, 0.0, 0);
        i.servo_pos = 27;
        assert!((est.update(&i).0.steer_readback - 1.0).abs() < 1e-12);
    }
}
