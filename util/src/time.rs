//! General time utility functions

use chrono::{DateTime, Utc};

/// Number of nanoseconds in a second
pub const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// Convert a duration into a number of seconds, or `None` if overflow
pub fn duration_to_seconds(duration: chrono::Duration) -> Option<f64> {
    duration
        .num_nanoseconds()
        .map(|ns| ns as f64 / NANOS_PER_SECOND as f64)
}

/// Seconds elapsed between two timestamps. Negative if `later` is before `earlier`.
pub fn seconds_between(earlier: &DateTime<Utc>, later: &DateTime<Utc>) -> f64 {
    match duration_to_seconds(later.signed_duration_since(*earlier)) {
        Some(s) => s,
        None => std::f64::NAN
    }
}

/// Split a timestamp into the `(seconds, microseconds)` pair used in recordings.
///
/// Seconds are truncated to 32 bits, which wraps in 2106.
pub fn to_sec_usec(timestamp: &DateTime<Utc>) -> (u32, u32) {
    (
        timestamp.timestamp() as u32,
        timestamp.timestamp_subsec_micros()
    )
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_seconds_between() {
        let t0 = Utc.timestamp_opt(1_000, 0).unwrap();
        let t1 = Utc.timestamp_opt(1_001, 500_000_000).unwrap();

        assert!((seconds_between(&t0, &t1) - 1.5).abs() < 1e-9);
        assert!((seconds_between(&t1, &t0) + 1.5).abs() < 1e-9);
        assert_eq!(to_sec_usec(&t1), (1_001, 500_000));
    }
}
