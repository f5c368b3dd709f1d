//! Reference track geometry

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use nalgebra::Vector2;
use serde::Serialize;
use std::path::Path;

// Internal
use super::TrackError;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Segments shorter than this are treated as coincident points
const MIN_SEGMENT_LENGTH_M: f64 = 1e-6;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// An immutable reference track.
#[derive(Clone, Debug, Serialize)]
pub struct Track {
    points_m: Vec<Vector2<f64>>,

    /// Arc length at each point
    cum_length_m: Vec<f64>,

    /// Signed curvature at each point
    curvature_m: Vec<f64>,

    closed: bool,

    length_m: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Track {
    /// Build a track from its points.
    ///
    /// For a closed track a final point equal to the first is dropped, the
    /// closing segment is implied.
    pub fn new(mut points_m: Vec<Vector2<f64>>, closed: bool) -> Result<Self, TrackError> {
        if closed && points_m.len() > 2 {
            let n = points_m.len();
            if (points_m[n - 1] - points_m[0]).norm() < MIN_SEGMENT_LENGTH_M {
                points_m.pop();
            }
        }

        let n = points_m.len();
        if n < 2 {
            return Err(TrackError::TooFewPoints(n));
        }

        let num_segments = if closed { n } else { n - 1 };

        let mut cum_length_m = Vec::with_capacity(n);
        let mut length_m = 0.0;
        for i in 0..num_segments {
            cum_length_m.push(length_m);

            let j = (i + 1) % n;
            let l = (points_m[j] - points_m[i]).norm();
            if l < MIN_SEGMENT_LENGTH_M {
                return Err(TrackError::CoincidentPoints(i, j));
            }
            length_m += l;
        }
        if !closed {
            cum_length_m.push(length_m);
        }

        let mut curvature_m = vec![0.0; n];
        for i in 0..n {
            if !closed && (i == 0 || i == n - 1) {
                continue;
            }
            let a = points_m[(i + n - 1) % n];
            let b = points_m[i];
            let c = points_m[(i + 1) % n];
            curvature_m[i] = menger_curvature(&a, &b, &c);
        }

        Ok(Self {
            points_m,
            cum_length_m,
            curvature_m,
            closed,
            length_m,
        })
    }

    /// Parse a track from text, one `x y` point per line.
    ///
    /// Blank lines and text after a `#` are ignored.
    pub fn parse(text: &str, closed: bool) -> Result<Self, TrackError> {
        let mut points = Vec::new();

        for (i, line) in text.lines().enumerate() {
            let line = line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }

            let mut tokens = line.split_whitespace().map(|t| t.parse::<f64>());
            match (tokens.next(), tokens.next(), tokens.next()) {
                (Some(Ok(x)), Some(Ok(y)), None) if x.is_finite() && y.is_finite() => {
                    points.push(Vector2::new(x, y))
                }
                _ => return Err(TrackError::MalformedPoint(i + 1, line.to_string())),
            }
        }

        Self::new(points, closed)
    }

    /// Load a track from a file.
    pub fn load<P: AsRef<Path>>(path: P, closed: bool) -> Result<Self, TrackError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| TrackError::FileError(path.to_path_buf(), e))?;

        Self::parse(&text, closed)
    }

    pub fn num_points(&self) -> usize {
        self.points_m.len()
    }

    pub fn num_segments(&self) -> usize {
        if self.closed {
            self.points_m.len()
        } else {
            self.points_m.len() - 1
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Total arc length.
    pub fn length_m(&self) -> f64 {
        self.length_m
    }

    pub fn points_m(&self) -> &[Vector2<f64>] {
        &self.points_m
    }

    /// Start and end points of a segment.
    pub fn segment(&self, index: usize) -> (Vector2<f64>, Vector2<f64>) {
        let n = self.points_m.len();
        (self.points_m[index % n], self.points_m[(index + 1) % n])
    }

    /// Arc length at the start of a segment.
    pub fn segment_start_m(&self, index: usize) -> f64 {
        self.cum_length_m[index]
    }

    /// Curvature at a fraction `t` along a segment, interpolated between the
    /// curvature at its end points.
    pub fn curvature_at(&self, index: usize, t: f64) -> f64 {
        let n = self.points_m.len();
        let k0 = self.curvature_m[index % n];
        let k1 = self.curvature_m[(index + 1) % n];
        k0 + t * (k1 - k0)
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Signed curvature of the circle through three points.
fn menger_curvature(a: &Vector2<f64>, b: &Vector2<f64>, c: &Vector2<f64>) -> f64 {
    let ab = b - a;
    let bc = c - b;
    let ac = c - a;

    let denom = ab.norm() * bc.norm() * ac.norm();
    if denom < 1e-12 {
        return 0.0;
    }

    let cross = ab[0] * bc[1] - ab[1] * bc[0];
    2.0 * cross / denom
}

#[cfg(test)]
mod test {
    use super::*;
    use std::f64::consts::TAU;

    #[test]
    fn test_square_lengths() {
        let track = Track::parse("0 0\n2 0\n2 2\n0 2\n", true).unwrap();
        assert_eq!(track.num_segments(), 4);
        assert!((track.length_m() - 8.0).abs() < 1e-12);
        assert_eq!(track.segment_start_m(3), 6.0);

        let open = Track::parse("0 0\n2 0\n2 2\n0 2\n", false).unwrap();
        assert_eq!(open.num_segments(), 3);
        assert!((open.length_m() - 6.0).abs() < 1e-12);
        assert_eq!(open.curvature_at(0, 0.0), 0.0);
    }

    #[test]
    fn test_circle_curvature() {
        let r = 4.0;
        let n = 72;
        let points = (0..n)
            .map(|i| {
                let a = TAU * i as f64 / n as f64;
                Vector2::new(r * a.cos(), r * a.sin())
            })
            .collect();

        let ccw = Track::new(points, true).unwrap();
        for i in 0..n {
            assert!((ccw.curvature_at(i, 0.3) - 1.0 / r).abs() < 1e-9);
        }

        let mut rev: Vec<_> = ccw.points_m().to_vec();
        rev.reverse();
        let cw = Track::new(rev, true).unwrap();
        assert!((cw.curvature_at(5, 0.5) + 1.0 / r).abs() < 1e-9);
    }

    #[test]
    fn test_closing_point_dropped() {
        let track = Track::parse("0 0\n1 0\n1 1\n0 0\n", true).unwrap();
        assert_eq!(track.num_points(), 3);
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(Track::parse("0 0\n", false), Err(TrackError::TooFewPoints(1))));
        assert!(matches!(Track::parse("0 0\n1\n", false), Err(TrackError::MalformedPoint(2, _))));
        assert!(matches!(Track::parse("0 0\n0 0\n1 0\n", false), Err(TrackError::CoincidentPoints(0, 1))));
        assert!(matches!(Track::parse("0 0 0\n1 0\n", false), Err(TrackError::MalformedPoint(1, _))));
    }
}
