//! Sliding-window admission limiter.
//!
//! Each client identity owns a [`ClientWindow`] holding the arrival times of
//! its recently admitted requests. A check prunes timestamps that have left
//! the trailing window, rejects when the window is full, and otherwise
//! records the new request. Stale timestamps are only removed when their
//! identity is checked again; nothing sweeps in the background unless the
//! caller opts into [`SlidingWindowLimiter::evict_idle`].
//!
//! Windows are stored in a sharded [`DashMap`]: checks for different
//! identities proceed in parallel, while the entry guard serializes the
//! read-modify-write for a single identity.

use std::collections::VecDeque;

use dashmap::DashMap;
use serde::Serialize;

use crate::error::CoreError;
use crate::types::EpochMillis;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Default number of requests admitted per identity within one window.
pub const DEFAULT_MAX_REQUESTS: usize = 5;

/// Default trailing window length in milliseconds.
pub const DEFAULT_WINDOW_MS: u64 = 30_000;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Limiter tuning, adjustable per deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitConfig {
    /// Requests admitted per identity per window (`MAX_REQUESTS`).
    pub max_requests: usize,
    /// Trailing window length in milliseconds (`WINDOW_MS`).
    pub window_ms: u64,
}

impl RateLimitConfig {
    /// Load from `RATE_LIMIT_MAX_REQUESTS` and `RATE_LIMIT_WINDOW_MS`.
    pub fn from_env() -> Result<Self, CoreError> {
        let config = Self {
            max_requests: crate::config::env_or("RATE_LIMIT_MAX_REQUESTS", DEFAULT_MAX_REQUESTS)?,
            window_ms: crate::config::env_or("RATE_LIMIT_WINDOW_MS", DEFAULT_WINDOW_MS)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Both limits must be at least 1, and the window must fit in
    /// [`EpochMillis`].
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.max_requests == 0 {
            return Err(CoreError::Validation(
                "RATE_LIMIT_MAX_REQUESTS must be at least 1".to_string(),
            ));
        }
        if self.window_ms == 0 {
            return Err(CoreError::Validation(
                "RATE_LIMIT_WINDOW_MS must be at least 1".to_string(),
            ));
        }
        if EpochMillis::try_from(self.window_ms).is_err() {
            return Err(CoreError::Validation(format!(
                "RATE_LIMIT_WINDOW_MS must be at most {}",
                EpochMillis::MAX
            )));
        }
        Ok(())
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: DEFAULT_MAX_REQUESTS,
            window_ms: DEFAULT_WINDOW_MS,
        }
    }
}

// ---------------------------------------------------------------------------
// Decision
// ---------------------------------------------------------------------------

/// Outcome of a single admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Decision {
    pub admit: bool,
    /// Whole seconds until the oldest retained request leaves the window.
    /// Zero when admitted.
    pub retry_after_secs: u64,
    /// Admissions left in the current window after this check.
    pub remaining: usize,
}

impl Decision {
    fn admitted(remaining: usize) -> Self {
        Self {
            admit: true,
            retry_after_secs: 0,
            remaining,
        }
    }

    fn rejected(retry_after_secs: u64) -> Self {
        Self {
            admit: false,
            retry_after_secs,
            remaining: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// ClientWindow
// ---------------------------------------------------------------------------

/// Admitted request timestamps for one identity, in arrival order.
#[derive(Debug, Clone, Default)]
pub struct ClientWindow {
    timestamps: VecDeque<EpochMillis>,
}

impl ClientWindow {
    /// Drop every timestamp at or before `cutoff`.
    fn prune(&mut self, cutoff: EpochMillis) {
        self.timestamps.retain(|&t| t > cutoff);
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Most recent admitted request, if any.
    pub fn newest(&self) -> Option<EpochMillis> {
        self.timestamps.back().copied()
    }
}

// ---------------------------------------------------------------------------
// Limiter
// ---------------------------------------------------------------------------

/// Per-identity sliding-window limiter.
///
/// Share it behind an `Arc`; all methods take `&self`.
#[derive(Debug, Default)]
pub struct SlidingWindowLimiter {
    config: RateLimitConfig,
    windows: DashMap<String, ClientWindow>,
}

impl SlidingWindowLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: DashMap::new(),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Decide whether `identity` may make a request at `now`.
    ///
    /// Admitted requests are recorded; rejected ones are not, so a rejection
    /// never pushes the retry time further out.
    pub fn check(&self, identity: &str, now: EpochMillis) -> Decision {
        let window_ms = as_millis(self.config.window_ms);
        let cutoff = now.saturating_sub(window_ms);

        let mut entry = self.windows.entry(identity.to_owned()).or_default();
        let window = entry.value_mut();
        window.prune(cutoff);

        if window.len() >= self.config.max_requests {
            // The oldest retained request is the first to leave the window,
            // which is the earliest moment a new request can be admitted.
            let oldest = window.timestamps.front().copied().unwrap_or(now);
            let wait_ms = oldest.saturating_add(window_ms).saturating_sub(now).max(0) as u64;
            return Decision::rejected(wait_ms.div_ceil(1000));
        }

        window.timestamps.push_back(now);
        Decision::admitted(self.config.max_requests - window.len())
    }

    /// Number of identities currently holding a window.
    pub fn tracked_identities(&self) -> usize {
        self.windows.len()
    }

    /// Remove identities whose newest admitted request is older than
    /// `idle_ms` (or that hold no timestamps at all). Returns how many were
    /// removed.
    ///
    /// Not called by [`check`](Self::check); callers that want bounded memory
    /// run it periodically.
    pub fn evict_idle(&self, now: EpochMillis, idle_ms: u64) -> usize {
        let cutoff = now.saturating_sub(as_millis(idle_ms));
        let before = self.windows.len();
        self.windows
            .retain(|_, window| window.newest().is_some_and(|newest| newest > cutoff));
        before.saturating_sub(self.windows.len())
    }
}

/// Durations beyond the timestamp range saturate.
fn as_millis(ms: u64) -> EpochMillis {
    EpochMillis::try_from(ms).unwrap_or(EpochMillis::MAX)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn limiter(max_requests: usize, window_ms: u64) -> SlidingWindowLimiter {
        SlidingWindowLimiter::new(RateLimitConfig {
            max_requests,
            window_ms,
        })
    }

    // -- admission ------------------------------------------------------------

    #[test]
    fn admits_up_to_max_requests() {
        let l = SlidingWindowLimiter::default();
        for i in 0..DEFAULT_MAX_REQUESTS {
            let d = l.check("a", i as i64 * 10);
            assert!(d.admit, "check {i} should be admitted");
            assert_eq!(d.remaining, DEFAULT_MAX_REQUESTS - i - 1);
        }
    }

    #[test]
    fn sixth_check_rejected_with_retry_from_oldest() {
        let l = SlidingWindowLimiter::default();
        for _ in 0..5 {
            assert!(l.check("A", 0).admit);
        }
        let d = l.check("A", 100);
        assert!(!d.admit);
        // ceil((0 + 30000 - 100) / 1000) = 30
        assert_eq!(d.retry_after_secs, 30);
        assert_eq!(d.remaining, 0);
    }

    #[test]
    fn retry_uses_oldest_not_newest() {
        let l = limiter(2, 10_000);
        assert!(l.check("a", 0).admit);
        assert!(l.check("a", 7_000).admit);
        let d = l.check("a", 7_500);
        // Oldest (0) leaves at 10_000 -> 2.5s -> 3s. Newest would give 10s.
        assert_eq!(d.retry_after_secs, 3);
    }

    #[test]
    fn retry_after_rounds_up_partial_seconds() {
        let l = limiter(1, 30_000);
        assert!(l.check("a", 0).admit);
        assert_eq!(l.check("a", 29_001).retry_after_secs, 1);
        assert_eq!(l.check("a", 28_999).retry_after_secs, 2);
    }

    #[test]
    fn admitted_again_after_waiting_retry_after() {
        let l = SlidingWindowLimiter::default();
        for _ in 0..5 {
            l.check("a", 0);
        }
        let d = l.check("a", 100);
        assert!(!d.admit);

        let later = 100 + d.retry_after_secs as i64 * 1000;
        assert!(l.check("a", later).admit);
    }

    #[test]
    fn timestamp_exactly_at_window_edge_is_evicted() {
        let l = limiter(1, 1_000);
        assert!(l.check("a", 0).admit);
        assert!(!l.check("a", 999).admit);
        assert!(l.check("a", 1_000).admit);
    }

    #[test]
    fn rejections_do_not_consume_slots() {
        let l = limiter(1, 1_000);
        assert!(l.check("a", 0).admit);
        for t in 1..50 {
            assert!(!l.check("a", t).admit);
        }
        assert!(l.check("a", 1_000).admit);
    }

    #[test]
    fn identities_are_independent() {
        let l = SlidingWindowLimiter::default();
        for _ in 0..5 {
            l.check("A", 0);
        }
        assert!(!l.check("A", 100).admit);
        assert!(l.check("B", 100).admit);
    }

    #[test]
    fn stale_timestamps_pruned_lazily() {
        let l = limiter(3, 1_000);
        l.check("a", 0);
        l.check("a", 10);
        // Nothing evicts until "a" is checked again.
        assert_eq!(l.windows.get("a").unwrap().len(), 2);
        l.check("a", 5_000);
        assert_eq!(l.windows.get("a").unwrap().len(), 1);
    }

    // -- concurrency ----------------------------------------------------------

    #[test]
    fn concurrent_checks_same_identity_admit_exactly_max() {
        let l = Arc::new(limiter(5, 60_000));
        let admitted: usize = std::thread::scope(|s| {
            let handles: Vec<_> = (0..16)
                .map(|_| {
                    let l = Arc::clone(&l);
                    s.spawn(move || (0..10).filter(|_| l.check("shared", 1_000).admit).count())
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });
        assert_eq!(admitted, 5);
    }

    #[test]
    fn concurrent_distinct_identities_each_get_full_quota() {
        let l = Arc::new(limiter(3, 60_000));
        std::thread::scope(|s| {
            for i in 0..8 {
                let l = Arc::clone(&l);
                s.spawn(move || {
                    let id = format!("client-{i}");
                    for _ in 0..3 {
                        assert!(l.check(&id, 0).admit);
                    }
                    assert!(!l.check(&id, 0).admit);
                });
            }
        });
        assert_eq!(l.tracked_identities(), 8);
    }

    // -- idle eviction --------------------------------------------------------

    #[test]
    fn evict_idle_removes_only_quiet_identities() {
        let l = SlidingWindowLimiter::default();
        l.check("old", 0);
        l.check("fresh", 50_000);

        let removed = l.evict_idle(60_000, 30_000);
        assert_eq!(removed, 1);
        assert_eq!(l.tracked_identities(), 1);
        assert!(l.windows.contains_key("fresh"));
    }

    // -- config ---------------------------------------------------------------

    #[test]
    fn config_defaults() {
        let c = RateLimitConfig::default();
        assert_eq!(c.max_requests, 5);
        assert_eq!(c.window_ms, 30_000);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn zero_limits_rejected() {
        assert!(RateLimitConfig {
            max_requests: 0,
            window_ms: 1
        }
        .validate()
        .is_err());
        assert!(RateLimitConfig {
            max_requests: 1,
            window_ms: 0
        }
        .validate()
        .is_err());
    }

    #[test]
    fn window_beyond_timestamp_range_rejected() {
        let config = RateLimitConfig {
            max_requests: 5,
            window_ms: u64::MAX,
        };
        assert!(config.validate().is_err());

        let widest = RateLimitConfig {
            max_requests: 5,
            window_ms: EpochMillis::MAX as u64,
        };
        assert!(widest.validate().is_ok());
    }

    #[test]
    fn huge_window_saturates_instead_of_wrapping() {
        let l = limiter(1, u64::MAX);
        assert!(l.check("a", 1_000).admit);

        let decision = l.check("a", 2_000);
        assert!(!decision.admit);
        assert!(decision.retry_after_secs > 1_000_000);

        // Still inside the window much later.
        assert!(!l.check("a", 1_000_000_000_000).admit);
    }

    #[test]
    fn huge_idle_ttl_evicts_nothing() {
        let l = limiter(5, 1_000);
        l.check("a", -5);
        assert_eq!(l.evict_idle(10, u64::MAX), 0);
        assert_eq!(l.tracked_identities(), 1);
    }
}
