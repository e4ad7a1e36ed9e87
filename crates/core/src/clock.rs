//! Wall-clock sources for the admission limiter.
//!
//! The limiter itself is a pure function of stored state and the `now` it is
//! handed; callers obtain `now` from a [`Clock`] so tests can drive time
//! explicitly with [`ManualClock`].

use std::fmt::Debug;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::types::EpochMillis;

/// Source of the current wall-clock time.
pub trait Clock: Send + Sync + Debug {
    /// Milliseconds since the Unix epoch.
    fn now_millis(&self) -> EpochMillis;
}

/// System clock backed by `chrono::Utc::now()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> EpochMillis {
        Utc::now().timestamp_millis()
    }
}

/// Manually driven clock.
///
/// Clones share the same underlying time, so advancing one clone is visible
/// through all of them.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    millis: Arc<AtomicI64>,
}

impl ManualClock {
    /// Create a clock frozen at `start` milliseconds.
    pub fn new(start: EpochMillis) -> Self {
        Self {
            millis: Arc::new(AtomicI64::new(start)),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        self.millis
            .fetch_add(by.as_millis() as i64, Ordering::SeqCst);
    }

    /// Jump to an absolute time.
    pub fn set(&self, millis: EpochMillis) {
        self.millis.store(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> EpochMillis {
        self.millis.load(Ordering::SeqCst)
    }
}
