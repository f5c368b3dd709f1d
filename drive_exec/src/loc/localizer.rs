//! Particle filter localiser

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, trace, warn};
use rand::{rngs::StdRng, Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::Serialize;
use std::path::Path;

// Internal
use super::{landmarks, Landmark, LocError, LocParams, Particle, Pose2};
use util::maths::wrap_pi;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Monte-Carlo localiser over bearing-only landmark observations.
pub struct Localizer {
    params: LocParams,

    landmarks: Vec<Landmark>,

    particles: Vec<Particle>,

    /// Resampling target, swapped with `particles` so that no allocation
    /// happens in the frame loop
    scratch: Vec<Particle>,

    /// Per-particle weights computed during an update
    new_weights: Vec<f64>,

    rng: StdRng,

    /// Noise distributions, built once from the parameters
    heading_noise: Normal<f64>,
    dist_noise: Normal<f64>,
    start_pos_noise: Normal<f64>,
    start_heading_noise: Normal<f64>,

    report: StatusReport,
}

/// Monitoring quantities for the filter.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct StatusReport {
    /// Effective sample size after the last update
    pub neff: f64,

    /// True if the last update resampled the particle set
    pub resampled: bool,

    /// Number of weight updates applied
    pub num_updates: u64,

    /// Number of updates discarded because every weight collapsed to zero
    pub num_degenerate_updates: u64,

    /// Number of observations skipped because no particle could associate
    /// them with a landmark
    pub num_unmatched_observations: u64,

    /// Number of predictions skipped because of non-finite odometry
    pub num_rejected_predictions: u64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Localizer {
    /// Create a new localiser with its particles seeded around the start
    /// pose.
    ///
    /// Landmarks must be supplied with `load_landmarks` or `set_landmarks`
    /// before the filter is updated.
    pub fn new(params: LocParams) -> Result<Self, LocError> {
        params.validate()?;

        let normal = |std: f64| {
            Normal::new(0.0, std).map_err(|e| LocError::InvalidParams(e.to_string()))
        };

        let rng = match params.seed {
            0 => StdRng::from_entropy(),
            s => StdRng::seed_from_u64(s),
        };

        let n = params.num_particles;
        let mut loc = Self {
            heading_noise: normal(params.heading_noise_rad)?,
            dist_noise: normal(params.dist_noise_frac)?,
            start_pos_noise: normal(params.start_spread_m)?,
            start_heading_noise: normal(params.start_spread_rad)?,
            params,
            landmarks: Vec::new(),
            particles: Vec::with_capacity(n),
            scratch: Vec::with_capacity(n),
            new_weights: vec![0.0; n],
            rng,
            report: StatusReport::default(),
        };

        loc.reset();

        Ok(loc)
    }

    /// Load the landmark map from a file.
    ///
    /// Returns the number of landmarks loaded.
    pub fn load_landmarks<P: AsRef<Path>>(&mut self, path: P) -> Result<usize, LocError> {
        let lms = landmarks::load(path)?;
        self.set_landmarks(lms)?;
        Ok(self.landmarks.len())
    }

    /// Replace the landmark map.
    pub fn set_landmarks(&mut self, landmarks: Vec<Landmark>) -> Result<(), LocError> {
        if landmarks.is_empty() {
            return Err(LocError::NoLandmarks);
        }
        self.landmarks = landmarks;
        Ok(())
    }

    pub fn landmarks(&self) -> &[Landmark] {
        &self.landmarks
    }

    /// Reinitialise the particles around the configured start pose.
    pub fn reset(&mut self) {
        let start = Pose2::new(
            self.params.start_x_m,
            self.params.start_y_m,
            self.params.start_heading_rad,
        );
        self.reset_to(&start);
    }

    /// Reinitialise the particles around the given pose, with the
    /// configured start spreads.
    pub fn reset_to(&mut self, pose: &Pose2) {
        let n = self.params.num_particles;
        let w = 1.0 / n as f64;

        self.particles.clear();
        for _ in 0..n {
            let p = Particle::new(
                pose.x_m + self.start_pos_noise.sample(&mut self.rng),
                pose.y_m + self.start_pos_noise.sample(&mut self.rng),
                wrap_pi(pose.heading_rad + self.start_heading_noise.sample(&mut self.rng)),
                w,
            );
            self.particles.push(p);
        }

        self.report.neff = n as f64;
        self.report.resampled = false;

        debug!("Localiser reset to {:?}", pose);
    }

    /// Replace the particle set.
    ///
    /// The set must have exactly `num_particles` entries, weights are
    /// normalised.
    pub fn set_particles(&mut self, particles: &[Particle]) -> Result<(), LocError> {
        if particles.len() != self.params.num_particles {
            return Err(LocError::InvalidParams(format!(
                "expected {} particles, found {}",
                self.params.num_particles,
                particles.len()
            )));
        }

        let sum: f64 = particles.iter().map(|p| p.weight).sum();
        if !(sum > 0.0 && sum.is_finite()) || particles.iter().any(|p| p.weight < 0.0) {
            return Err(LocError::InvalidParams("particle weights must be >= 0 with a positive sum".into()));
        }

        self.particles.clear();
        self.particles.extend(particles.iter().map(|p| Particle {
            weight: p.weight / sum,
            ..*p
        }));

        Ok(())
    }

    /// Move every particle by the odometry distance `ds_m` along its heading
    /// after turning it by `yaw_rate_rads * dt_s`, with noise.
    pub fn predict(&mut self, ds_m: f64, yaw_rate_rads: f64, dt_s: f64) {
        if !(ds_m.is_finite() && yaw_rate_rads.is_finite() && dt_s.is_finite()) {
            warn!(
                "Rejecting non-finite odometry (ds = {}, w = {}, dt = {})",
                ds_m, yaw_rate_rads, dt_s
            );
            self.report.num_rejected_predictions += 1;
            return;
        }

        let dtheta = yaw_rate_rads * dt_s;

        for p in self.particles.iter_mut() {
            p.heading_rad = wrap_pi(p.heading_rad + dtheta + self.heading_noise.sample(&mut self.rng));

            let d = ds_m * (1.0 + self.dist_noise.sample(&mut self.rng));
            p.x_m += d * p.heading_rad.cos();
            p.y_m += d * p.heading_rad.sin();
        }
    }

    /// Weight the particles by a single observed bearing to a landmark.
    ///
    /// `precision` is the inverse variance of the bearing error in
    /// 1/rad^2. Each particle associates the observation with the landmark
    /// in its field of view and range whose predicted bearing is closest,
    /// provided the residual is inside the gate. Particles with no match
    /// take the likelihood of a residual at the gate. Weights are normalised
    /// afterwards, and the set is resampled if the effective sample size
    /// falls too low.
    ///
    /// If no particle matches the observation, or every weight collapses to
    /// zero, the update is discarded.
    pub fn update_lm(&mut self, bearing_rad: f64, precision: f64) {
        if self.landmarks.is_empty() {
            warn!("Landmark update requested with no landmarks loaded");
            return;
        }

        if !bearing_rad.is_finite() || !precision.is_finite() || precision < 0.0 {
            warn!(
                "Rejecting invalid observation (bearing = {}, precision = {})",
                bearing_rad, precision
            );
            return;
        }

        let gate = Gate::from_params(&self.params);

        let mut matched = 0;
        let mut sum = 0.0;
        for (i, p) in self.particles.iter().enumerate() {
            let err = match associate(p, &self.landmarks, bearing_rad, &gate) {
                Some(e) => {
                    matched += 1;
                    e
                }
                None => gate.max_residual_rad,
            };
            let w = p.weight * (-0.5 * precision * err * err).exp();
            self.new_weights[i] = w;
            sum += w;
        }

        if matched == 0 {
            self.report.num_unmatched_observations += 1;
            trace!("No particle matches bearing {:.3}, skipping", bearing_rad);
            return;
        }

        if !(sum > 0.0 && sum.is_finite()) {
            self.report.num_degenerate_updates += 1;
            debug!("Degenerate landmark update (weight sum {}), ignoring", sum);
            return;
        }

        let mut sum_sq = 0.0;
        for (p, w) in self.particles.iter_mut().zip(self.new_weights.iter()) {
            p.weight = w / sum;
            sum_sq += p.weight * p.weight;
        }

        self.report.num_updates += 1;
        self.report.neff = 1.0 / sum_sq;
        self.report.resampled = false;

        let n = self.particles.len() as f64;
        if self.report.neff < self.params.resample_ratio * n {
            trace!("Neff {:.1} < {:.1}, resampling", self.report.neff, self.params.resample_ratio * n);
            self.resample();
        }
    }

    /// Weighted mean pose of the particle set, using the circular mean for
    /// the heading.
    pub fn location_estimate(&self) -> Pose2 {
        let mut sum_w = 0.0;
        let mut sum_x = 0.0;
        let mut sum_y = 0.0;
        let mut sum_sin = 0.0;
        let mut sum_cos = 0.0;

        for p in self.particles.iter() {
            sum_w += p.weight;
            sum_x += p.weight * p.x_m;
            sum_y += p.weight * p.y_m;
            sum_sin += p.weight * p.heading_rad.sin();
            sum_cos += p.weight * p.heading_rad.cos();
        }

        if !(sum_w > 0.0) {
            // Weights are kept normalised so this only happens for an empty
            // set, fall back to the unweighted mean
            let n = self.particles.len().max(1) as f64;
            return Pose2::new(
                self.particles.iter().map(|p| p.x_m).sum::<f64>() / n,
                self.particles.iter().map(|p| p.y_m).sum::<f64>() / n,
                self.particles
                    .iter()
                    .map(|p| p.heading_rad.sin())
                    .sum::<f64>()
                    .atan2(self.particles.iter().map(|p| p.heading_rad.cos()).sum::<f64>()),
            );
        }

        Pose2::new(sum_x / sum_w, sum_y / sum_w, sum_sin.atan2(sum_cos))
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub fn params(&self) -> &LocParams {
        &self.params
    }

    /// Effective sample size of the current weights.
    pub fn neff(&self) -> f64 {
        let sum_sq: f64 = self.particles.iter().map(|p| p.weight * p.weight).sum();
        if sum_sq > 0.0 {
            1.0 / sum_sq
        } else {
            0.0
        }
    }

    pub fn report(&self) -> &StatusReport {
        &self.report
    }

    /// Low variance resampling into the scratch buffer.
    fn resample(&mut self) {
        let n = self.particles.len();
        let step = 1.0 / n as f64;

        let mut r = self.rng.gen::<f64>() * step;
        let mut c = self.particles[0].weight;
        let mut idx = 0;

        self.scratch.clear();
        for _ in 0..n {
            while r > c && idx < n - 1 {
                idx += 1;
                c += self.particles[idx].weight;
            }

            self.scratch.push(Particle {
                weight: step,
                ..self.particles[idx]
            });

            r += step;
        }

        std::mem::swap(&mut self.particles, &mut self.scratch);

        self.report.resampled = true;
        self.report.neff = n as f64;
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Visibility and residual limits for associating an observation.
struct Gate {
    min_range_sq: f64,
    max_range_sq: f64,
    fov_half_rad: f64,
    max_residual_rad: f64,
}

impl Gate {
    fn from_params(params: &LocParams) -> Self {
        Self {
            min_range_sq: params.min_landmark_range_m.powi(2),
            max_range_sq: params.max_landmark_range_m.powi(2),
            fov_half_rad: params.fov_half_rad,
            max_residual_rad: params.max_bearing_residual_rad,
        }
    }
}

/// Absolute bearing residual to the landmark that best explains the
/// observation from the particle's pose.
///
/// Only landmarks within range and inside the field of view are candidates.
/// Returns `None` if no candidate is within the residual gate.
fn associate(p: &Particle, landmarks: &[Landmark], bearing_rad: f64, gate: &Gate) -> Option<f64> {
    let mut best: Option<f64> = None;

    for lm in landmarks {
        let dx = lm.x_m - p.x_m;
        let dy = lm.y_m - p.y_m;

        let range_sq = dx * dx + dy * dy;
        if range_sq < gate.min_range_sq || range_sq > gate.max_range_sq {
            continue;
        }

        let predicted = wrap_pi(dy.atan2(dx) - p.heading_rad);
        if predicted.abs() > gate.fov_half_rad {
            continue;
        }

        let err = wrap_pi(bearing_rad - predicted).abs();
        if err > gate.max_residual_rad {
            continue;
        }

        if best.map_or(true, |b| err < b) {
            best = Some(err);
        }
    }

    best
}
