//! Localisation parameters

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::Deserialize;

// Internal
use super::LocError;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for the particle filter
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct LocParams {
    /// Number of particles, fixed for the lifetime of the filter
    pub num_particles: usize,

    /// Start line pose the filter is reset to
    pub start_x_m: f64,
    pub start_y_m: f64,
    pub start_heading_rad: f64,

    /// Standard deviation of the position jitter applied on reset
    pub start_spread_m: f64,

    /// Standard deviation of the heading jitter applied on reset
    pub start_spread_rad: f64,

    /// Standard deviation of the heading noise added on every prediction
    pub heading_noise_rad: f64,

    /// Standard deviation of the odometry distance error, as a fraction of
    /// the distance travelled
    pub dist_noise_frac: f64,

    /// Resample when the effective sample size falls below this fraction of
    /// the particle count
    pub resample_ratio: f64,

    /// Landmarks closer than this to a particle are not associated
    pub min_landmark_range_m: f64,

    /// Landmarks further than this from a particle are not associated. Set
    /// slightly beyond the camera's detection range
    pub max_landmark_range_m: f64,

    /// Landmarks whose predicted bearing is outside `+/-fov_half_rad` are
    /// not associated. Set slightly wider than the camera's field of view
    pub fov_half_rad: f64,

    /// An observation only matches a landmark if the bearing residual is
    /// below this. Particles with no match are given the likelihood of a
    /// residual at this gate
    pub max_bearing_residual_rad: f64,

    /// Multiplier applied to the operator's cone precision setting, in
    /// hundredths, to give the bearing inverse variance in 1/rad^2
    pub precision_scale: f64,

    /// Random seed, zero seeds from entropy
    pub seed: u64,
}

impl Default for LocParams {
    fn default() -> Self {
        Self {
            num_particles: 300,
            start_x_m: 0.0,
            start_y_m: 0.0,
            start_heading_rad: 0.0,
            start_spread_m: 0.1,
            start_spread_rad: 0.05,
            heading_noise_rad: 0.01,
            dist_noise_frac: 0.05,
            resample_ratio: 0.5,
            min_landmark_range_m: 0.05,
            max_landmark_range_m: 9.0,
            fov_half_rad: 0.7,
            max_bearing_residual_rad: 0.25,
            precision_scale: 0.1,
            seed: 0,
        }
    }
}

impl LocParams {
    /// Check that the parameters describe a usable filter.
    pub fn validate(&self) -> Result<(), LocError> {
        if self.num_particles == 0 {
            return Err(LocError::InvalidParams("num_particles must be > 0".into()));
        }

        let noises = [
            ("start_spread_m", self.start_spread_m),
            ("start_spread_rad", self.start_spread_rad),
            ("heading_noise_rad", self.heading_noise_rad),
            ("dist_noise_frac", self.dist_noise_frac),
            ("min_landmark_range_m", self.min_landmark_range_m),
            ("max_landmark_range_m", self.max_landmark_range_m),
            ("precision_scale", self.precision_scale),
        ];
        for (name, value) in noises.iter() {
            if !value.is_finite() || *value < 0.0 {
                return Err(LocError::InvalidParams(format!(
                    "{} must be finite and >= 0, found {}",
                    name, value
                )));
            }
        }

        if self.max_landmark_range_m <= self.min_landmark_range_m {
            return Err(LocError::InvalidParams(format!(
                "max_landmark_range_m ({}) must exceed min_landmark_range_m ({})",
                self.max_landmark_range_m, self.min_landmark_range_m
            )));
        }

        let angles = [
            ("fov_half_rad", self.fov_half_rad),
            ("max_bearing_residual_rad", self.max_bearing_residual_rad),
        ];
        for (name, value) in angles.iter() {
            if !(*value > 0.0 && *value <= std::f64::consts::PI) {
                return Err(LocError::InvalidParams(format!(
                    "{} must be in (0, pi], found {}",
                    name, value
                )));
            }
        }

        if !(0.0..=1.0).contains(&self.resample_ratio) {
            return Err(LocError::InvalidParams(format!(
                "resample_ratio must be in [0, 1], found {}",
                self.resample_ratio
            )));
        }

        Ok(())
    }
}
