//! # Track following module
//!
//! The reference track is a polyline of points in the map frame, either
//! open or closed. The tracker finds the point on the track nearest to the
//! car and describes the track there: the unit tangent and left normal, the
//! signed curvature, the progress (arc length from the first point) and the
//! car's lateral and heading errors relative to it.
//!
//! Curvature is positive for left hand (anticlockwise) turns. Lateral error
//! is positive when the car is to the left of the track.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod path;
pub mod tracker;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

pub use path::Track;
pub use tracker::*;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum TrackError {
    #[error("Cannot read the track file {0:?}: {1}")]
    FileError(std::path::PathBuf, std::io::Error),

    #[error("Malformed track point on line {0}: {1:?}")]
    MalformedPoint(usize, String),

    #[error("A track needs at least two distinct points, found {0}")]
    TooFewPoints(usize),

    #[error("Track points {0} and {1} are coincident")]
    CoincidentPoints(usize, usize),
}
