//! Email verification task.
//!
//! Walks progress from 1 to 100, logging each step to the job, and returns
//! `{ email_sent, sent_at }`. A payload with `"fail": true` fails the attempt
//! so retries and backoff can be exercised on demand.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;

use crate::outcome::{TaskError, TaskOutcome};
use crate::task::{JobContext, JobHandler};

pub struct EmailVerificationTask {
    step_delay: Duration,
}

impl EmailVerificationTask {
    pub fn new(step_delay: Duration) -> Self {
        Self { step_delay }
    }
}

#[async_trait]
impl JobHandler for EmailVerificationTask {
    async fn handle(&self, ctx: &JobContext) -> TaskOutcome {
        let job = ctx.job();
        tracing::info!(
            job_id = job.id,
            attempts_made = job.attempts_made,
            "Processing email verification",
        );
        ctx.log("Beginning processing...").await;

        if forced_failure(&job.payload) {
            return TaskOutcome::Failed(TaskError::Task(format!("Job {} failed!", job.id)));
        }

        for percent in 1..=100u8 {
            tokio::time::sleep(self.step_delay).await;
            ctx.log("Making progress...").await;
            ctx.progress(percent).await;
        }

        ctx.log("Success!").await;
        TaskOutcome::Completed(json!({
            "email_sent": true,
            "sent_at": Utc::now().timestamp_millis(),
        }))
    }
}

/// `true` when the payload asks for this attempt to fail.
fn forced_failure(payload: &serde_json::Value) -> bool {
    payload.get("fail").and_then(serde_json::Value::as_bool) == Some(true)
}
