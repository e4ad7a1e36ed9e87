//! Task seam invoked by the worker loop for each leased job.

use std::sync::Arc;

use async_trait::async_trait;
use throttleq_queue::{Job, JobQueue};

use crate::outcome::TaskOutcome;

#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Run one attempt of the job. Task-level failures are returned as
    /// [`TaskOutcome::Failed`]; a panic is caught by the worker and counted
    /// as a failed attempt.
    async fn handle(&self, ctx: &JobContext) -> TaskOutcome;
}

/// A leased job plus advisory reporting back to its queue.
pub struct JobContext {
    job: Job,
    queue: Arc<dyn JobQueue>,
}

impl JobContext {
    pub fn new(job: Job, queue: Arc<dyn JobQueue>) -> Self {
        Self { job, queue }
    }

    pub fn job(&self) -> &Job {
        &self.job
    }

    /// Log a line to tracing and to the job's log. Queue errors are logged
    /// and otherwise ignored.
    pub async fn log(&self, line: &str) {
        tracing::info!(job_id = self.job.id, channel = %self.job.channel, "{line}");
        if let Err(e) = self.queue.append_log(self.job.id, line).await {
            tracing::warn!(job_id = self.job.id, error = %e, "Failed to append job log");
        }
    }

    /// Report progress (clamped to 100). Also keeps the lease alive.
    pub async fn progress(&self, percent: u8) {
        let percent = percent.min(100);
        if let Err(e) = self.queue.update_progress(self.job.id, percent).await {
            tracing::warn!(job_id = self.job.id, percent, error = %e, "Failed to update job progress");
        }
    }
}
