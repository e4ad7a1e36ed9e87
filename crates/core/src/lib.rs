//! Shared domain logic for throttleq.
//!
//! Zero internal dependencies: the sliding-window limiter, backoff maths,
//! the job state machine, clocks and environment parsing all live here so the
//! queue, worker and API crates can share them.

pub mod backoff;
pub mod clock;
pub mod config;
pub mod error;
pub mod job_state;
pub mod rate_limit;
pub mod types;
