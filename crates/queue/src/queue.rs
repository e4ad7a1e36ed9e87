use async_trait::async_trait;
use throttleq_core::types::JobId;
use tokio::time::Instant;

use crate::error::QueueError;
use crate::job::{FailureDisposition, Job, JobOptions, QueueCounts};

/// Job broker contract consumed by the worker loop and the API.
///
/// Implementations guarantee at most one active lease per job. Every
/// reporting method requires the job to be `active`; reporting a job whose
/// lease has been lost yields [`QueueError::LeaseLost`].
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Add a job to the tail of `channel`.
    async fn enqueue(
        &self,
        channel: &str,
        payload: serde_json::Value,
        options: JobOptions,
    ) -> Result<Job, QueueError>;

    /// Lease the next ready job on `channel`, oldest first.
    ///
    /// Returns `None` when the channel is empty or paused.
    async fn lease(&self, channel: &str) -> Result<Option<Job>, QueueError>;

    /// Mark a leased job completed with its result.
    async fn report_completed(
        &self,
        job_id: JobId,
        result: serde_json::Value,
    ) -> Result<(), QueueError>;

    /// Record a failed attempt; the job's attempt count and backoff policy
    /// decide whether it is retried or terminally failed.
    async fn report_failed(
        &self,
        job_id: JobId,
        error: &str,
    ) -> Result<FailureDisposition, QueueError>;

    /// Return a leased job to the head of its channel without consuming an
    /// attempt.
    async fn release(&self, job_id: JobId) -> Result<(), QueueError>;

    /// Stop dispatching on `channel` until at least `until`. Returns the
    /// effective deadline after merging with any existing pause.
    async fn pause_channel(&self, channel: &str, until: Instant) -> Result<Instant, QueueError>;

    /// Deadline of the channel's pause, if it is currently paused.
    async fn paused_until(&self, channel: &str) -> Result<Option<Instant>, QueueError>;

    /// Look up a job on `channel`.
    async fn get_job(&self, channel: &str, job_id: JobId) -> Result<Option<Job>, QueueError>;

    /// Advisory progress update; also renews the lease.
    async fn update_progress(&self, job_id: JobId, percent: u8) -> Result<(), QueueError>;

    /// Append a line to the job's log.
    async fn append_log(&self, job_id: JobId, line: &str) -> Result<(), QueueError>;

    /// Per-state job counts for `channel`.
    async fn counts(&self, channel: &str) -> Result<QueueCounts, QueueError>;
}
