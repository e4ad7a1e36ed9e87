use throttleq_core::job_state::JobState;
use throttleq_core::types::JobId;

/// Errors reported by [`JobQueue`](crate::JobQueue) operations.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Job {0} not found")]
    JobNotFound(JobId),

    /// The job is no longer leased (completed elsewhere or its lease expired
    /// and it was handed back to the channel).
    #[error("Job {job_id} is not active (state: {state})")]
    LeaseLost { job_id: JobId, state: JobState },

    #[error("Invalid job options: {0}")]
    Validation(String),
}
