//! Simulated car dynamics

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use std::sync::{Arc, Mutex, MutexGuard};

// Internal
use super::SimParams;
use crate::loc::Pose2;
use util::maths::{clamp, wrap_pi};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// World shared between the simulated devices.
#[derive(Clone)]
pub struct SharedWorld(Arc<Mutex<SimWorld>>);

/// Kinematic bicycle model of the car.
#[derive(Debug, Clone)]
pub struct SimWorld {
    params: SimParams,

    pub pose: Pose2,

    /// Forward speed, never negative
    pub v_ms: f64,

    pub yaw_rate_rads: f64,

    /// Commands last sent by the actuator, normalised
    pub throttle: f64,
    pub steering: f64,

    /// Distance covered, in encoder ticks
    pub odometer_ticks: f64,

    pub time_s: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl SharedWorld {
    pub fn new(world: SimWorld) -> Self {
        Self(Arc::new(Mutex::new(world)))
    }

    pub fn lock(&self) -> MutexGuard<'_, SimWorld> {
        match self.0.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl SimWorld {
    pub fn new(params: SimParams) -> Self {
        Self {
            pose: Pose2::new(params.start_x_m, params.start_y_m, params.start_heading_rad),
            params,
            v_ms: 0.0,
            yaw_rate_rads: 0.0,
            throttle: 0.0,
            steering: 0.0,
            odometer_ticks: 0.0,
            time_s: 0.0,
        }
    }

    pub fn params(&self) -> &SimParams {
        &self.params
    }

    /// Advance the car by `dt_s`.
    pub fn step(&mut self, dt_s: f64) {
        if !(dt_s > 0.0) {
            return;
        }
        let p = &self.params;

        let throttle = clamp(&self.throttle, &-1.0, &1.0);
        let accel = if throttle >= 0.0 {
            throttle * p.max_accel_ms2 - p.drag_per_s * self.v_ms
        } else {
            throttle * p.max_brake_ms2 - p.drag_per_s * self.v_ms
        };
        self.v_ms = (self.v_ms + accel * dt_s).max(0.0);

        // Positive steering turns left
        let delta = clamp(&self.steering, &-1.0, &1.0) * p.max_steer_rad;
        self.yaw_rate_rads = self.v_ms * delta.tan() / p.wheelbase_m;

        let ds = self.v_ms * dt_s;
        self.pose.heading_rad = wrap_pi(self.pose.heading_rad + self.yaw_rate_rads * dt_s);
        self.pose.x_m += ds * self.pose.heading_rad.cos();
        self.pose.y_m += ds * self.pose.heading_rad.sin();

        self.odometer_ticks += ds / p.meters_per_tick;
        self.time_s += dt_s;
    }

    /// Raw encoder count, wrapping like the real counters.
    pub fn encoder(&self) -> u16 {
        (self.odometer_ticks as u64 % (u16::MAX as u64 + 1)) as u16
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_straight_and_turn() {
        let mut w = SimWorld::new(SimParams::default());

        w.throttle = 1.0;
        for _ in 0..100 {
            w.step(0.01);
        }
        assert!(w.v_ms > 3.0);
        assert!(w.pose.x_m > 1.0);
        assert_eq!(w.pose.y_m, 0.0);
        assert!((w.odometer_ticks - w.pose.x_m / 0.0205).abs() < 1e-6);

        w.steering = 0.5;
        w.step(0.01);
        assert!(w.yaw_rate_rads > 0.0);
        assert!(w.pose.heading_rad > 0.0);

        // Braking stops without reversing
        w.throttle = -1.0;
        for _ in 0..200 {
            w.step(0.01);
        }
        assert_eq!(w.v_ms, 0.0);
    }

    #[test]
    fn test_encoder_wraps() {
        let mut w = SimWorld::new(SimParams::default());
        w.odometer_ticks = 65536.0 + 12.5;
        assert_eq!(w.encoder(), 12);
    }
}
