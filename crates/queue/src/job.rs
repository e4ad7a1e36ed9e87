//! Job records and the options accepted at enqueue time.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use throttleq_core::backoff::BackoffPolicy;
use throttleq_core::job_state::JobState;
use throttleq_core::types::{JobId, Timestamp};

use crate::error::QueueError;

/// Attempts granted to a job when the caller does not specify any.
pub const DEFAULT_ATTEMPTS: u32 = 10;

/// Maximum number of log lines kept per job; older lines are dropped first.
pub const MAX_LOG_LINES: usize = 256;

/// A unit of work as seen by workers and API clients.
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    pub id: JobId,
    pub channel: String,
    pub payload: serde_json::Value,
    pub state: JobState,
    /// Failed attempts so far. Releases and expired leases do not count.
    pub attempts_made: u32,
    pub max_attempts: u32,
    pub backoff: BackoffPolicy,
    /// Advisory progress, 0..=100.
    pub progress: u8,
    pub result: Option<serde_json::Value>,
    pub failed_reason: Option<String>,
    pub logs: Vec<String>,
    pub created_at: Timestamp,
    pub processed_at: Option<Timestamp>,
    pub finished_at: Option<Timestamp>,
}

/// Options supplied with [`JobQueue::enqueue`](crate::JobQueue::enqueue).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOptions {
    pub attempts: u32,
    pub backoff: BackoffPolicy,
}

impl JobOptions {
    pub fn validate(&self) -> Result<(), QueueError> {
        if self.attempts == 0 {
            return Err(QueueError::Validation(
                "attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_ATTEMPTS,
            backoff: BackoffPolicy::default(),
        }
    }
}

/// What the queue did with a job after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDisposition {
    /// The job will become available again after `delay`.
    Retrying { attempts_made: u32, delay: Duration },
    /// Attempts exhausted; the job is terminally failed.
    Failed { attempts_made: u32 },
}

/// Number of jobs per state on one channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueCounts {
    pub waiting: usize,
    pub active: usize,
    pub delayed: usize,
    pub completed: usize,
    pub failed: usize,
}

impl QueueCounts {
    pub(crate) fn record(&mut self, state: JobState) {
        match state {
            JobState::Waiting => self.waiting += 1,
            JobState::Active => self.active += 1,
            JobState::Delayed => self.delayed += 1,
            JobState::Completed => self.completed += 1,
            JobState::Failed => self.failed += 1,
        }
    }
}
