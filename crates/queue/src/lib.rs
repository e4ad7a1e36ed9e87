//! Job queue collaborator for throttleq workers.
//!
//! [`JobQueue`] is the contract the worker loop consumes: named channels of
//! jobs with lease-based dispatch, completion/failure reporting with
//! attempt and backoff bookkeeping, and a channel-wide pause.
//! [`MemoryQueue`] is a process-resident implementation; it keeps no state
//! across restarts.

pub mod error;
pub mod events;
pub mod job;
pub mod memory;
pub mod pause;
pub mod queue;

pub use error::QueueError;
pub use events::{EventBus, QueueEvent};
pub use job::{FailureDisposition, Job, JobOptions, QueueCounts};
pub use memory::{MemoryQueue, QueueConfig};
pub use pause::ChannelPauses;
pub use queue::JobQueue;
