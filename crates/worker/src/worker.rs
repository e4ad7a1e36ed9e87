//! The lease → execute → report loop.
//!
//! One [`Worker`] handles one job at a time. Between jobs it waits on
//! whichever comes first: cancellation, the poll interval (empty channel) or
//! the channel's pause deadline. A job that is already executing when
//! cancellation arrives runs to completion and is reported. A panicking
//! handler is reported as a failed attempt and the loop keeps running.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use throttleq_core::types::JobId;
use throttleq_queue::{FailureDisposition, Job, JobQueue, QueueError};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::outcome::{error_chain, TaskError, TaskOutcome};
use crate::task::{JobContext, JobHandler};

/// Result of a single [`Worker::poll_once`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Poll {
    /// A job was leased, executed and its outcome reported.
    Processed(JobId),
    /// Nothing was ready on the channel.
    Empty,
    /// The channel is paused until this deadline.
    Paused(Instant),
}

pub struct Worker {
    id: String,
    channel: String,
    queue: Arc<dyn JobQueue>,
    handler: Arc<dyn JobHandler>,
    poll_interval: Duration,
}

impl Worker {
    pub fn new(
        id: impl Into<String>,
        channel: impl Into<String>,
        queue: Arc<dyn JobQueue>,
        handler: Arc<dyn JobHandler>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            id: id.into(),
            channel: channel.into(),
            queue,
            handler,
            poll_interval,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Run the loop until `cancel` is triggered.
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!(
            worker_id = %self.id,
            channel = %self.channel,
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "Worker started",
        );

        while !cancel.is_cancelled() {
            let wake_at = match self.poll_once().await {
                Ok(Poll::Processed(_)) => continue,
                Ok(Poll::Empty) => Instant::now() + self.poll_interval,
                Ok(Poll::Paused(until)) => {
                    tracing::debug!(
                        worker_id = %self.id,
                        channel = %self.channel,
                        remaining_ms = until.saturating_duration_since(Instant::now()).as_millis() as u64,
                        "Channel paused, waiting",
                    );
                    until
                }
                Err(e) => {
                    tracing::error!(
                        worker_id = %self.id,
                        channel = %self.channel,
                        error = %e,
                        "Lease cycle failed",
                    );
                    Instant::now() + self.poll_interval
                }
            };

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep_until(wake_at) => {}
            }
        }

        tracing::info!(worker_id = %self.id, channel = %self.channel, "Worker stopped");
    }

    /// One lease attempt: lease, execute and report.
    pub async fn poll_once(&self) -> Result<Poll, QueueError> {
        if let Some(until) = self.queue.paused_until(&self.channel).await? {
            return Ok(Poll::Paused(until));
        }

        let Some(job) = self.queue.lease(&self.channel).await? else {
            // A pause may have landed between the check and the lease.
            return Ok(match self.queue.paused_until(&self.channel).await? {
                Some(until) => Poll::Paused(until),
                None => Poll::Empty,
            });
        };

        let job_id = job.id;
        tracing::debug!(
            worker_id = %self.id,
            job_id,
            channel = %self.channel,
            attempts_made = job.attempts_made,
            "Job leased",
        );

        let ctx = JobContext::new(job, Arc::clone(&self.queue));
        let outcome = match AssertUnwindSafe(self.handler.handle(&ctx))
            .catch_unwind()
            .await
        {
            Ok(outcome) => outcome,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                tracing::error!(
                    worker_id = %self.id,
                    job_id,
                    channel = %self.channel,
                    panic = %message,
                    "Job handler panicked",
                );
                TaskOutcome::Failed(TaskError::Task(format!("Job handler panicked: {message}")))
            }
        };
        self.report(ctx.job(), outcome).await;

        Ok(Poll::Processed(job_id))
    }

    /// Report exactly one outcome for a leased job. Reporting errors are
    /// logged; the lease expiry recovers the job if a report is lost.
    async fn report(&self, job: &Job, outcome: TaskOutcome) {
        let label = outcome.label();
        let result = match outcome {
            TaskOutcome::Completed(result) => {
                self.queue.report_completed(job.id, result).await.map(|()| {
                    tracing::info!(worker_id = %self.id, job_id = job.id, "Job completed");
                })
            }
            TaskOutcome::Failed(err) => {
                let reason = error_chain(&err);
                match self.queue.report_failed(job.id, &reason).await {
                    Ok(FailureDisposition::Retrying { attempts_made, delay }) => {
                        tracing::warn!(
                            worker_id = %self.id,
                            job_id = job.id,
                            attempts_made,
                            delay_ms = delay.as_millis() as u64,
                            error = %reason,
                            "Job attempt failed, retrying",
                        );
                        Ok(())
                    }
                    Ok(FailureDisposition::Failed { attempts_made }) => {
                        tracing::error!(
                            worker_id = %self.id,
                            job_id = job.id,
                            attempts_made,
                            error = %reason,
                            "Job failed",
                        );
                        Ok(())
                    }
                    Err(e) => Err(e),
                }
            }
            TaskOutcome::PauseChannelAndRetry { pause, reason } => {
                self.pause_and_release(job, pause, &reason.to_string()).await
            }
        };

        if let Err(e) = result {
            tracing::error!(
                worker_id = %self.id,
                job_id = job.id,
                outcome = label,
                error = %e,
                "Failed to report job outcome",
            );
        }
    }

    /// Pause the channel first so no other worker leases in between, then
    /// hand the job back to the head of the channel.
    async fn pause_and_release(
        &self,
        job: &Job,
        pause: Duration,
        reason: &str,
    ) -> Result<(), QueueError> {
        let proposed = Instant::now() + pause;
        let effective = self.queue.pause_channel(&job.channel, proposed).await?;
        tracing::warn!(
            worker_id = %self.id,
            job_id = job.id,
            channel = %job.channel,
            pause_ms = pause.as_millis() as u64,
            effective_pause_ms = effective.saturating_duration_since(Instant::now()).as_millis() as u64,
            reason,
            "Channel paused by gate throttling",
        );
        self.queue.release(job.id).await
    }
}

/// Text of a panic payload, when it carries one.
fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
