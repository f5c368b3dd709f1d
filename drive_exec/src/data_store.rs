//! # Data Store
//!
//! Sensor values shared between the pollers and the control loop. Each value
//! lives in its own `Snapshot`, which is replaced whole under a short lock so
//! the control loop never sees a partially updated sample.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

// Internal
use comms_if::eqpt::{car::CarFeedback, gps::GpsFix, imu::ImuSample};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A value published by one context and read by another.
#[derive(Debug)]
pub struct Snapshot<T> {
    inner: Mutex<Stamped<T>>,
}

/// A copy of a snapshot as seen by the reader.
#[derive(Debug, Clone, Copy)]
pub struct Stamped<T> {
    /// Last value published, `None` until the first successful read
    pub value: Option<T>,

    /// When the value was last published
    pub updated: Option<Instant>,

    /// Number of failed reads since the last successful one
    pub consecutive_faults: u32,

    /// Number of values published
    pub seq: u64,
}

/// Normalised operator stick positions.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AxisState {
    pub throttle: f32,
    pub steering: f32,
}

/// Global sensor store for the executable.
#[derive(Debug, Default)]
pub struct DataStore {
    pub imu: Snapshot<ImuSample>,
    pub car: Snapshot<CarFeedback>,
    pub gps: Snapshot<GpsFix>,
    pub axes: Snapshot<AxisState>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl<T> Default for Stamped<T> {
    fn default() -> Self {
        Self {
            value: None,
            updated: None,
            consecutive_faults: 0,
            seq: 0,
        }
    }
}

impl<T> Stamped<T> {
    /// True if a value was published within `max_age` of `now` and no read
    /// has failed since.
    pub fn is_fresh(&self, now: Instant, max_age: Duration) -> bool {
        self.consecutive_faults == 0
            && match self.updated {
                Some(t) => now.saturating_duration_since(t) <= max_age,
                None => false,
            }
    }
}

impl<T> Default for Snapshot<T> {
    fn default() -> Self {
        Self {
            inner: Mutex::new(Stamped::default()),
        }
    }
}

impl<T: Copy> Snapshot<T> {
    /// Replace the value, clearing the fault count.
    pub fn publish(&self, value: T) {
        let mut s = self.lock();
        s.value = Some(value);
        s.updated = Some(Instant::now());
        s.consecutive_faults = 0;
        s.seq = s.seq.wrapping_add(1);
    }

    /// Note a failed read, keeping the last good value.
    ///
    /// Returns the number of consecutive faults.
    pub fn record_fault(&self) -> u32 {
        let mut s = self.lock();
        s.consecutive_faults = s.consecutive_faults.saturating_add(1);
        s.consecutive_faults
    }

    /// Copy of the whole snapshot.
    pub fn read(&self) -> Stamped<T> {
        *self.lock()
    }

    /// Last value published.
    pub fn latest(&self) -> Option<T> {
        self.lock().value
    }

    fn lock(&self) -> MutexGuard<'_, Stamped<T>> {
        // Updates are plain assignments, a poisoned snapshot is still whole
        match self.inner.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
