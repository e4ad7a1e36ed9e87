//! `throttleq-worker` library crate.
//!
//! The worker loop leases jobs from a [`JobQueue`](throttleq_queue::JobQueue)
//! channel, runs a [`JobHandler`](task::JobHandler) and reports the outcome.
//! When the admission gate throttles a task, the loop pauses the whole
//! channel for the gate's `Retry-After` interval and hands the job back, so
//! every worker on the channel backs off together. A second task,
//! [`EmailVerificationTask`](email::EmailVerificationTask), runs on its own
//! channel and reports incremental progress.
//!
//! The binary entrypoint lives in `main.rs`.

pub mod config;
pub mod email;
pub mod gate;
pub mod offboard;
pub mod outcome;
pub mod pool;
pub mod task;
pub mod telemetry;
pub mod worker;
