//! Utility maths functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use num_traits::{Float, FloatConst};

/// Clamp a value into the range `[min, max]`.
///
/// NaN values are passed through unchanged.
pub fn clamp<T>(value: &T, min: &T, max: &T) -> T 
where
    T: Float
{
    let mut ret = *value;

    if ret > *max {
        ret = *max
    }
    if ret < *min {
        ret = *min
    }

    ret
}

/// Zero any value whose magnitude is below `band`.
pub fn deadband<T>(value: T, band: T) -> T
where
    T: Float
{
    if value.abs() < band {
        T::zero()
    }
    else {
        value
    }
}

/// Wrap an angle into the range `(-pi, pi]`.
pub fn wrap_pi<T>(angle: T) -> T
where
    T: Float + FloatConst
{
    let w = rem_euclid(angle + T::PI(), T::TAU()) - T::PI();

    // rem_euclid may round up to exactly tau, giving -pi rather than pi
    if w <= -T::PI() {
        w + T::TAU()
    }
    else {
        w
    }
}

/// Calculates the least nonnegative remainder of `lhs (mod rhs)`.
/// 
/// In particular, the return value `r` satisfies `0.0 <= r < rhs.abs()` in
/// most cases. However, due to a floating point round-off error it can
/// result in `r == rhs.abs()` if `lhs` is much smaller than `rhs.abs()` in
/// magnitude and `lhs < 0.0`.
pub fn rem_euclid<T>(lhs: T, rhs: T) -> T
where
    T: Float
{
    let r = lhs % rhs;
    if r < T::zero() { r + rhs.abs() } else { r }
}

/// Smoothing factor of a first order low pass filter with bandwidth `bw_rads`
/// sampled every `dt_s` seconds.
///
/// The filter is then `y += alpha * (x - y)`.
pub fn low_pass_alpha<T>(bw_rads: T, dt_s: T) -> T
where
    T: Float
{
    if bw_rads <= T::zero() || dt_s <= T::zero() {
        return T::zero();
    }

    T::one() - (-bw_rads * dt_s).exp()
}

#[cfg(test)]
mod test {
    use super::*;

    const TAU: f64 = std::f64::consts::TAU;
    const PI: f64 = std::f64::consts::PI;

    #[test]
    fn test_wrap_pi() {
        assert!((wrap_pi(0.5f64) - 0.5).abs() < 1e-12);
        assert!((wrap_pi(PI + 0.5) - (0.5 - PI)).abs() < 1e-12);
        assert!((wrap_pi(-PI - 0.5) - (PI - 0.5)).abs() < 1e-12);
        assert!((wrap_pi(3.0 * TAU + 1.0) - 1.0).abs() < 1e-9);
        assert!((wrap_pi(PI) - PI).abs() < 1e-12);
        assert!((wrap_pi(-PI) - PI).abs() < 1e-12);
    }

    #[test]
    fn test_clamp_deadband() {
        assert_eq!(clamp(&2.0f64, &-1.0, &1.0), 1.0);
        assert_eq!(clamp(&-2.0f64, &-1.0, &1.0), -1.0);
        assert_eq!(clamp(&0.3f64, &-1.0, &1.0), 0.3);
        assert_eq!(deadband(0.01f64, 0.05), 0.0);
        assert_eq!(deadband(-0.2f64, 0.05), -0.2);
    }

    #[test]
    fn test_low_pass_alpha() {
        assert_eq!(low_pass_alpha(0.0f64, 0.01), 0.0);
        assert_eq!(low_pass_alpha(10.0f64, -1.0), 0.0);
        let a = low_pass_alpha(10.0f64, 0.01);
        assert!((a - (1.0 - (-0.1f64).exp())).abs() < 1e-12);
        assert!(low_pass_alpha(1e6f64, 1.0) <= 1.0);
    }
}
