//! # GPS local frame
//!
//! Converts fixes in integer 1e-7 degrees into metres east and north of a
//! reference point. Over the size of a track the ellipsoid can be treated as
//! flat, so the conversion is a pair of scale factors computed once for the
//! reference latitude, assuming zero altitude.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use nalgebra::Vector2;
use std::f64::consts::PI;

// Internal
use comms_if::eqpt::gps::GpsFix;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// WGS84 semi-major axis
const WGS84_A_M: f64 = 6378137.0;

/// WGS84 inverse flattening
const WGS84_INV_F: f64 = 298.257223563;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A flat east/north frame centred on a reference point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalFrame {
    ref_lat_e7: i32,
    ref_lon_e7: i32,

    /// Metres per 1e-7 degree of latitude
    north_scale_m: f64,

    /// Metres per 1e-7 degree of longitude
    east_scale_m: f64,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum GpsError {
    #[error("No GPS reference point given, set gps_ref_lat_e7 and gps_ref_lon_e7")]
    NoReference,

    #[error("GPS reference latitude {0} is out of range")]
    InvalidReference(i32),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl LocalFrame {
    /// Create a frame centred on the reference, in 1e-7 degrees.
    ///
    /// A zero latitude or longitude is taken to mean the reference was not
    /// configured.
    pub fn new(ref_lat_e7: i32, ref_lon_e7: i32) -> Result<Self, GpsError> {
        if ref_lat_e7 == 0 || ref_lon_e7 == 0 {
            return Err(GpsError::NoReference);
        }
        if ref_lat_e7.abs() >= 900_000_000 {
            return Err(GpsError::InvalidReference(ref_lat_e7));
        }

        let b = WGS84_A_M * (1.0 - 1.0 / WGS84_INV_F);
        let lat_rad = ref_lat_e7 as f64 * PI * 1e-7 / 180.0;

        Ok(Self {
            ref_lat_e7,
            ref_lon_e7,
            north_scale_m: b * PI / 180.0e7,
            east_scale_m: WGS84_A_M * lat_rad.cos() * PI / 180.0e7,
        })
    }

    /// Position of the fix as metres east and north of the reference.
    pub fn to_local(&self, fix: &GpsFix) -> Vector2<f64> {
        // Differences in i64 so a frame near the antimeridian can't overflow
        let d_lat = fix.lat_e7 as i64 - self.ref_lat_e7 as i64;
        let d_lon = fix.lon_e7 as i64 - self.ref_lon_e7 as i64;

        Vector2::new(
            d_lon as f64 * self.east_scale_m,
            d_lat as f64 * self.north_scale_m,
        )
    }

    /// Latitude and longitude in 1e-7 degrees of a local position.
    pub fn to_global(&self, east_m: f64, north_m: f64) -> (i32, i32) {
        let lat = self.ref_lat_e7 as f64 + north_m / self.north_scale_m;
        let lon = self.ref_lon_e7 as f64 + east_m / self.east_scale_m;
        (lat.round() as i32, lon.round() as i32)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_scales() {
        // On the equator a degree of longitude is about 111.3 km
        let f = LocalFrame::new(1, 1).unwrap();
        assert!((f.east_scale_m * 1e7 - 111_319.49).abs() < 0.01);
        assert!((f.north_scale_m * 1e7 - 110_946.26).abs() < 0.01);

        // At 60 degrees it halves
        let f = LocalFrame::new(600_000_000, 1).unwrap();
        assert!((f.east_scale_m * 1e7 - 55_659.75).abs() < 0.01);
    }

    #[test]
    fn test_to_local() {
        let f = LocalFrame::new(377_000_000, -1_224_000_000).unwrap();

        let fix = GpsFix {
            lat_e7: 377_000_000 + 1000,
            lon_e7: -1_224_000_000 - 2000,
            ..Default::default()
        };
        let p = f.to_local(&fix);
        assert!((p[1] - 1000.0 * f.north_scale_m).abs() < 1e-9);
        assert!((p[0] + 2000.0 * f.east_scale_m).abs() < 1e-9);
        assert!(p[0] < 0.0 && p[1] > 0.0);

        assert_eq!(f.to_global(p[0], p[1]), (fix.lat_e7, fix.lon_e7));
    }

    #[test]
    fn test_reference_required() {
        assert!(matches!(LocalFrame::new(0, 5), Err(GpsError::NoReference)));
        assert!(matches!(LocalFrame::new(5, 0), Err(GpsError::NoReference)));
        assert!(matches!(
            LocalFrame::new(900_000_000, 5),
            Err(GpsError::InvalidReference(_))
        ));
    }
}
