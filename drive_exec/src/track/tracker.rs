//! Nearest point search on the reference track

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::debug;
use nalgebra::Vector2;
use serde::Serialize;

// Internal
use super::Track;
use crate::loc::Pose2;
use util::maths::wrap_pi;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Candidates whose distances differ by less than this are tied, and the one
/// furthest along the track wins.
const TIE_TOLERANCE_M: f64 = 1e-9;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The track at the point nearest the car.
#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct TrackGeometry {
    /// Nearest point on the track
    pub closest_m: Vector2<f64>,

    /// Unit tangent in the direction of travel
    pub tangent: Vector2<f64>,

    /// Unit normal pointing to the left of the track
    pub normal: Vector2<f64>,

    /// Signed curvature in 1/m
    pub curvature_m: f64,

    /// Arc length from the first track point, in `[0, length)` on a closed
    /// track
    pub progress_m: f64,

    /// Distance of the car to the left of the track
    pub lat_error_m: f64,

    /// Heading of the car relative to the tangent, positive to the left
    pub head_error_rad: f64,

    /// Segment the nearest point lies on
    pub segment: usize,
}

/// Finds the nearest point on a track, following the car from cycle to
/// cycle.
pub struct PathTracker {
    track: Track,

    /// Segment matched on the previous call to `track`
    last_segment: Option<usize>,

    /// Number of segments either side of the last match searched locally
    search_window: usize,

    /// Local matches further than this trigger a global search
    reacquire_dist_m: f64,
}

/// A projection of a point onto one segment.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    segment: usize,
    t: f64,
    point: Vector2<f64>,
    dist_m: f64,
    progress_m: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl PathTracker {
    pub fn new(track: Track, search_window: usize, reacquire_dist_m: f64) -> Self {
        Self {
            track,
            last_segment: None,
            search_window,
            reacquire_dist_m,
        }
    }

    pub fn track_ref(&self) -> &Track {
        &self.track
    }

    /// Forget the last match so the next call to `track` searches globally.
    pub fn reset(&mut self) {
        self.last_segment = None;
    }

    /// Geometry at the globally nearest point on the track.
    ///
    /// Ties break towards the larger progress.
    pub fn get_target(&self, x_m: f64, y_m: f64, heading_rad: f64) -> TrackGeometry {
        let p = Vector2::new(x_m, y_m);
        let best = self.search(&p, 0..self.track.num_segments());
        self.geometry(&best, &p, heading_rad)
    }

    /// Geometry at the nearest point on the track, searching near the
    /// previous match first.
    ///
    /// The local search stops the match jumping between parts of the track
    /// which pass close to each other. If the local match is too far away
    /// the whole track is searched.
    pub fn track(&mut self, pose: &Pose2) -> TrackGeometry {
        let p = pose.position_m();
        let n = self.track.num_segments();

        let local = match self.last_segment {
            Some(last) if 2 * self.search_window + 1 < n => {
                let c = self.search_window_around(&p, last);
                if c.dist_m <= self.reacquire_dist_m {
                    Some(c)
                } else {
                    debug!(
                        "Local track match {:.2} m away, searching globally",
                        c.dist_m
                    );
                    None
                }
            }
            _ => None,
        };

        let best = match local {
            Some(c) => c,
            None => self.search(&p, 0..n),
        };

        self.last_segment = Some(best.segment);
        self.geometry(&best, &p, pose.heading_rad)
    }

    fn search_window_around(&self, p: &Vector2<f64>, centre: usize) -> Candidate {
        let n = self.track.num_segments();
        let w = self.search_window;

        if self.track.is_closed() {
            let start = centre + n - w;
            self.search(p, (start..=start + 2 * w).map(|i| i % n))
        } else {
            let start = centre.saturating_sub(w);
            let end = (centre + w).min(n - 1);
            self.search(p, start..=end)
        }
    }

    /// Nearest candidate over the given segments.
    fn search<I: IntoIterator<Item = usize>>(&self, p: &Vector2<f64>, segments: I) -> Candidate {
        let mut best: Option<Candidate> = None;

        for i in segments {
            let c = self.project(p, i);
            best = match best {
                None => Some(c),
                Some(b) => {
                    if c.dist_m < b.dist_m - TIE_TOLERANCE_M {
                        Some(c)
                    } else if (c.dist_m - b.dist_m).abs() <= TIE_TOLERANCE_M
                        && c.progress_m > b.progress_m
                    {
                        Some(c)
                    } else {
                        Some(b)
                    }
                }
            };
        }

        // Tracks always have at least one segment
        match best {
            Some(b) => b,
            None => self.project(p, 0),
        }
    }

    fn project(&self, p: &Vector2<f64>, segment: usize) -> Candidate {
        let (a, b) = self.track.segment(segment);
        let d = b - a;
        let len = d.norm();

        let t = ((p - a).dot(&d) / (len * len)).max(0.0).min(1.0);
        let point = a + d * t;

        let mut progress_m = self.track.segment_start_m(segment) + t * len;
        if self.track.is_closed() && progress_m >= self.track.length_m() {
            progress_m -= self.track.length_m();
        }

        Candidate {
            segment,
            t,
            point,
            dist_m: (p - point).norm(),
            progress_m,
        }
    }

    fn geometry(&self, c: &Candidate, p: &Vector2<f64>, heading_rad: f64) -> TrackGeometry {
        let (a, b) = self.track.segment(c.segment);
        let tangent = (b - a).normalize();
        let normal = Vector2::new(-tangent[1], tangent[0]);

        TrackGeometry {
            closest_m: c.point,
            tangent,
            normal,
            curvature_m: self.track.curvature_at(c.segment, c.t),
            progress_m: c.progress_m,
            lat_error_m: (p - c.point).dot(&normal),
            head_error_rad: wrap_pi(heading_rad - tangent[1].atan2(tangent[0])),
            segment: c.segment,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::f64::consts::{FRAC_PI_2, TAU};

    fn square() -> Track {
        Track::parse("0 0\n2 0\n2 2\n0 2\n", true).unwrap()
    }

    #[test]
    fn test_straight_line() {
        let track = Track::parse("0 0\n10 0\n", false).unwrap();
        let tracker = PathTracker::new(track, 5, 1.0);

        let g = tracker.get_target(3.0, 0.5, 0.1);
        assert!((g.closest_m - Vector2::new(3.0, 0.0)).norm() < 1e-12);
        assert_eq!(g.tangent, Vector2::new(1.0, 0.0));
        assert_eq!(g.normal, Vector2::new(0.0, 1.0));
        assert!((g.lat_error_m - 0.5).abs() < 1e-12);
        assert!((g.head_error_rad - 0.1).abs() < 1e-12);
        assert!((g.progress_m - 3.0).abs() < 1e-12);
        assert_eq!(g.curvature_m, 0.0);

        // Beyond the end the end point is nearest
        let g = tracker.get_target(12.0, -1.0, 0.0);
        assert_eq!(g.closest_m, Vector2::new(10.0, 0.0));
        assert!((g.lat_error_m + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_circle_geometry() {
        let r = 5.0;
        let n = 360;
        let points = (0..n)
            .map(|i| {
                let a = TAU * i as f64 / n as f64;
                Vector2::new(r * a.cos(), r * a.sin())
            })
            .collect();
        let track = Track::new(points, true).unwrap();
        let length = track.length_m();
        let tracker = PathTracker::new(track, 5, 1.0);

        // Quarter way round, just outside, facing along the track
        let g = tracker.get_target(0.0, 5.2, std::f64::consts::PI);
        assert!((g.curvature_m - 0.2).abs() < 1e-9);
        assert!((g.progress_m - length / 4.0).abs() < 1e-3);
        assert!((g.lat_error_m + 0.2).abs() < 1e-3);
        assert!(g.head_error_rad.abs() < 0.01);
        assert!((g.tangent - Vector2::new(-1.0, 0.0)).norm() < 0.01);
    }

    #[test]
    fn test_tie_breaks_to_larger_progress() {
        let tracker = PathTracker::new(square(), 1, 1.0);

        // Centre of the square is 1 m from the middle of every side
        for _ in 0..10 {
            let g = tracker.get_target(1.0, 1.0, 0.0);
            assert!((g.progress_m - 7.0).abs() < 1e-12, "{:?}", g);
            assert_eq!(g.segment, 3);
        }

        // Equidistant from the first and second sides only
        let g = tracker.get_target(1.5, 0.5, 0.0);
        assert!((g.progress_m - 2.5).abs() < 1e-12, "{:?}", g);

        // A small perturbation selects the truly nearest side
        let g = tracker.get_target(1.5, 0.5 - 1e-3, 0.0);
        assert!((g.progress_m - 1.5).abs() < 1e-12, "{:?}", g);
    }

    #[test]
    fn test_progress_wraps_on_closed_track() {
        let tracker = PathTracker::new(square(), 1, 1.0);

        // Just before the start on the closing side
        let g = tracker.get_target(-0.1, 0.01, -FRAC_PI_2);
        assert!(g.progress_m < 8.0 && g.progress_m > 7.9, "{:?}", g);

        // On the start point the end of the closing segment wraps to 0,
        // which ties with the start of the first segment
        let g = tracker.get_target(-0.1, -0.1, 0.0);
        assert!(g.progress_m >= 0.0 && g.progress_m < 8.0);
        assert!((g.closest_m - Vector2::new(0.0, 0.0)).norm() < 1e-12);
    }

    #[test]
    fn test_local_search_follows_car() {
        // A hairpin: out along y = 0 and back along y = 0.6
        let track = Track::parse("0 0\n1 0\n2 0\n3 0\n4 0\n4 0.6\n3 0.6\n2 0.6\n1 0.6\n0 0.6\n", true).unwrap();
        let mut tracker = PathTracker::new(track, 1, 1.0);

        // Start on the outbound leg
        let g = tracker.track(&Pose2::new(0.5, 0.0, 0.0));
        assert_eq!(g.segment, 0);

        // Drift towards the return leg while moving forward, the local
        // search keeps us on the outbound leg
        let g = tracker.track(&Pose2::new(1.2, 0.32, 0.0));
        assert_eq!(g.segment, 1);
        assert!(g.lat_error_m > 0.3);

        // The global search alone would have jumped to the return leg
        let g = tracker.get_target(1.2, 0.32, 0.0);
        assert_eq!(g.segment, 7);

        // Far from the local window, the tracker reacquires globally. The
        // point is 0.1 m from segment 5 (4 0.6 -> 3 0.6) and 0.51 m from its
        // neighbours
        let mut tracker = PathTracker::new(tracker.track_ref().clone(), 1, 1.0);
        tracker.track(&Pose2::new(0.5, 0.0, 0.0));
        let g = tracker.track(&Pose2::new(3.5, 0.7, 0.0));
        assert_eq!(g.segment, 5);
        assert!((g.closest_m - Vector2::new(3.5, 0.6)).norm() < 1e-9);
    }
}
