use std::fmt::Write;
use std::time::Duration;

use crate::gate::GateError;

/// Why a task attempt did not complete.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error(transparent)]
    Gate(#[from] GateError),

    #[error("Unexpected gate status {status}")]
    UnexpectedStatus { status: u16 },

    /// Admission was refused. Carried as the reason of a pause, never
    /// reported as a failed attempt.
    #[error("Throttled by gate, retry after {retry_after_secs}s")]
    Throttled { retry_after_secs: u64 },

    #[error("{0}")]
    Task(String),
}

/// Exactly one of these is reported for every leased job.
#[derive(Debug)]
pub enum TaskOutcome {
    Completed(serde_json::Value),
    /// Counts as a failed attempt; the queue applies attempts and backoff.
    Failed(TaskError),
    /// Pause the whole channel for `pause` and return the job to waiting
    /// without consuming an attempt.
    PauseChannelAndRetry { pause: Duration, reason: TaskError },
}

impl TaskOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Completed(_) => "completed",
            Self::Failed(_) => "failed",
            Self::PauseChannelAndRetry { .. } => "pause_and_retry",
        }
    }
}

/// Render an error and all of its sources as `outer: inner: root`.
pub fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let _ = write!(out, ": {cause}");
        source = cause.source();
    }
    out
}
