//! Job lifecycle states and the transition table enforced by the queue.
//!
//! ```text
//! waiting -> active -> completed
//!                   -> delayed  -> waiting      (retryable failure, after backoff)
//!                   -> waiting                  (released by a channel pause, or lease expired)
//!                   -> failed                   (attempts exhausted)
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Ready to be leased.
    Waiting,
    /// Leased by exactly one worker.
    Active,
    /// Failed an attempt; waiting out its backoff before becoming `Waiting`.
    Delayed,
    /// Finished successfully. Terminal.
    Completed,
    /// Exhausted its attempts. Terminal.
    Failed,
}

impl JobState {
    /// States reachable from `self`.
    pub fn valid_transitions(self) -> &'static [JobState] {
        use JobState::*;
        match self {
            Waiting => &[Active],
            Active => &[Completed, Delayed, Waiting, Failed],
            Delayed => &[Waiting],
            Completed | Failed => &[],
        }
    }

    pub fn can_transition(self, to: JobState) -> bool {
        self.valid_transitions().contains(&to)
    }

    /// Validate a transition, returning a descriptive message for invalid ones.
    pub fn validate_transition(self, to: JobState) -> Result<(), String> {
        if self.can_transition(to) {
            Ok(())
        } else {
            Err(format!("Invalid transition: {self} -> {to}"))
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Waiting => "waiting",
            JobState::Active => "active",
            JobState::Delayed => "delayed",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
