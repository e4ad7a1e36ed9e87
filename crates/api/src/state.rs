use std::sync::Arc;

use throttleq_core::clock::Clock;
use throttleq_core::rate_limit::SlidingWindowLimiter;
use throttleq_queue::JobQueue;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable; everything is behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    /// Admission gate limiter.
    pub limiter: Arc<SlidingWindowLimiter>,
    /// Time source for limiter decisions.
    pub clock: Arc<dyn Clock>,
    /// Job broker backing `/jobs` and `/queues`.
    pub queue: Arc<dyn JobQueue>,
}

impl AppState {
    /// Channels jobs can be submitted to over HTTP. The first is the default.
    pub fn job_channels(&self) -> [&str; 2] {
        [
            self.config.worker.email_channel.as_str(),
            self.config.worker.channel.as_str(),
        ]
    }
}
