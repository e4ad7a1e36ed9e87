//! Throttle-aware "offboard" task.
//!
//! Simulates a unit of work, then asks the admission gate for permission to
//! finish. A throttled gate turns into a channel-wide pause instead of a
//! failed attempt.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};

use crate::gate::{AdmissionGate, GateResponse};
use crate::outcome::{TaskError, TaskOutcome};
use crate::task::{JobContext, JobHandler};

pub struct OffboardTask {
    gate: Arc<dyn AdmissionGate>,
    work_delay: Duration,
}

impl OffboardTask {
    pub fn new(gate: Arc<dyn AdmissionGate>, work_delay: Duration) -> Self {
        Self { gate, work_delay }
    }
}

#[async_trait]
impl JobHandler for OffboardTask {
    async fn handle(&self, ctx: &JobContext) -> TaskOutcome {
        ctx.log(&format!("Processing Job ID #{}", ctx.job().id)).await;

        tokio::time::sleep(self.work_delay).await;
        ctx.progress(50).await;

        match self.gate.request().await {
            Ok(GateResponse::Admitted(data)) => {
                ctx.progress(100).await;
                TaskOutcome::Completed(with_offboarded_at(data))
            }
            Ok(GateResponse::Throttled { retry_after_secs }) => {
                TaskOutcome::PauseChannelAndRetry {
                    pause: Duration::from_secs(retry_after_secs),
                    reason: TaskError::Throttled { retry_after_secs },
                }
            }
            Ok(GateResponse::Unclassified { status }) => {
                TaskOutcome::Failed(TaskError::UnexpectedStatus { status })
            }
            Err(e) => TaskOutcome::Failed(e.into()),
        }
    }
}

/// Merge `offboarded_at` (epoch millis) into the gate's response data.
fn with_offboarded_at(data: Value) -> Value {
    let offboarded_at = Utc::now().timestamp_millis();
    match data {
        Value::Object(mut map) => {
            map.insert("offboarded_at".to_string(), json!(offboarded_at));
            Value::Object(map)
        }
        Value::Null => json!({ "offboarded_at": offboarded_at }),
        other => json!({ "gate": other, "offboarded_at": offboarded_at }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offboarded_at_merged_into_object() {
        let out = with_offboarded_at(json!({ "identity": "10.0.0.1", "remaining": 3 }));
        assert_eq!(out["identity"], "10.0.0.1");
        assert_eq!(out["remaining"], 3);
        assert!(out["offboarded_at"].is_i64());
    }

    #[test]
    fn non_object_data_is_wrapped() {
        let out = with_offboarded_at(json!("ok"));
        assert_eq!(out["gate"], "ok");
        assert!(out["offboarded_at"].is_i64());

        let out = with_offboarded_at(Value::Null);
        assert!(out["offboarded_at"].is_i64());
    }
}
