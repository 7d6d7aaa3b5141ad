//! Time sources consulted by the sale window check.

use std::fmt::Debug;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};

/// Supplies the current logical time.
pub trait Clock: Debug + Send + Sync {
    /// Returns the current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock for tests and scripted scenarios.
///
/// Time only moves forward.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Creates a clock frozen at `start`.
    #[must_use]
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Moves the clock to `at`. Returns false (and leaves the clock alone)
    /// if `at` lies in the past.
    pub fn advance_to(&self, at: DateTime<Utc>) -> bool {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        if at < *now {
            return false;
        }
        *now = at;
        true
    }

    /// Moves the clock forward by `by`. Returns false (and leaves the clock
    /// alone) if `by` is negative or the result is out of range.
    pub fn advance(&self, by: Duration) -> bool {
        if by < Duration::zero() {
            return false;
        }
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        match now.checked_add_signed(by) {
            Some(next) => {
                *now = next;
                true
            }
            None => false,
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
