//! Retry backoff policies applied by the job queue after a failed attempt.
//!
//! Exponential backoff doubles per attempt: `delay * 2^(attempts_made - 1)`,
//! so with a 1 s base the waits run 1 s, 2 s, 4 s, 8 s, ...

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Upper bound on the computed delay, so runaway attempt counts cannot
/// overflow or schedule a job decades into the future.
pub const MAX_BACKOFF: Duration = Duration::from_secs(24 * 60 * 60);

/// Shape of the retry delay curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    Exponential,
    Fixed,
}

/// Retry backoff policy attached to each job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    #[serde(rename = "type")]
    pub kind: BackoffKind,
    /// Base delay in milliseconds.
    pub delay_ms: u64,
}

impl BackoffPolicy {
    pub const fn exponential(delay_ms: u64) -> Self {
        Self {
            kind: BackoffKind::Exponential,
            delay_ms,
        }
    }

    pub const fn fixed(delay_ms: u64) -> Self {
        Self {
            kind: BackoffKind::Fixed,
            delay_ms,
        }
    }

    /// Delay before the next attempt, given how many attempts have already
    /// failed (including the one just reported). `attempts_made` of 0 is
    /// treated as 1.
    pub fn delay_for(&self, attempts_made: u32) -> Duration {
        let base = Duration::from_millis(self.delay_ms);
        let delay = match self.kind {
            BackoffKind::Fixed => base,
            BackoffKind::Exponential => {
                let exponent = attempts_made.max(1) - 1;
                let factor = 1u64.checked_shl(exponent).unwrap_or(u64::MAX);
                Duration::from_millis(self.delay_ms.saturating_mul(factor))
            }
        };
        delay.min(MAX_BACKOFF)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::exponential(1_000)
    }
}
