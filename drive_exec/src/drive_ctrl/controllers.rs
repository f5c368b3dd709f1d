//! # Drive controllers module
//!
//! This module provides the PI controller used for the throttle, and the
//! steering law.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::Serialize;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A PI controller with conditional integration anti-windup.
///
/// The integral state is owned by the caller so that it can live with the
/// rest of the vehicle state and be reset alongside it.
#[derive(Debug, Serialize, Clone, Copy)]
pub struct PiController {
    /// Proportional gain
    pub k_p: f64,

    /// Integral gain
    pub k_i: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl PiController {
    /// Create a new controller with the given gains.
    pub fn new(k_p: f64, k_i: f64) -> Self {
        Self { k_p, k_i }
    }

    /// Get the value of the controller for the given error, clamped to
    /// `[min, max]`.
    ///
    /// The integral only accumulates if the unclamped output with the
    /// accumulated integral would lie strictly within the bounds. Once the
    /// output saturates the integral is frozen, and it resumes as soon as
    /// the output comes back out of saturation.
    pub fn get(&self, error: f64, dt_s: f64, integral: &mut f64, min: f64, max: f64) -> f64 {
        if error.is_finite() && dt_s > 0.0 && dt_s.is_finite() {
            let trial = *integral + error * dt_s;
            let unclamped = self.k_p * error + self.k_i * trial;

            if unclamped > min && unclamped < max {
                *integral = trial;
            }
        }

        let out = self.k_p * error + self.k_i * *integral;
        if out.is_nan() {
            return 0.0;
        }

        out.max(min).min(max)
    }
}
