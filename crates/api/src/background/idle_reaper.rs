//! Periodic eviction of idle limiter identities.
//!
//! Only spawned when `RATE_LIMIT_IDLE_TTL_SECS` is set; without it every
//! identity the gate has seen stays in memory.

use std::sync::Arc;
use std::time::Duration;

use throttleq_core::clock::Clock;
use throttleq_core::rate_limit::SlidingWindowLimiter;
use tokio_util::sync::CancellationToken;

/// Upper bound on the time between sweeps.
const MAX_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Sweep interval for a given idle TTL: half the TTL, at most a minute and
/// at least a second.
pub fn sweep_interval(idle_ttl: Duration) -> Duration {
    (idle_ttl / 2).clamp(Duration::from_secs(1), MAX_SWEEP_INTERVAL)
}

/// Run the reaper loop until `cancel` is triggered.
///
/// An identity is evicted once its newest admitted request is older than
/// `idle_ttl`. Windows never span more than the limiter window, so a TTL at
/// least as long as the window never changes a decision.
pub async fn run(
    limiter: Arc<SlidingWindowLimiter>,
    clock: Arc<dyn Clock>,
    idle_ttl: Duration,
    cancel: CancellationToken,
) {
    let period = sweep_interval(idle_ttl);
    tracing::info!(
        idle_ttl_secs = idle_ttl.as_secs(),
        interval_secs = period.as_secs(),
        "Idle identity reaper started"
    );

    let mut interval = tokio::time::interval(period);
    let idle_ms = idle_ttl.as_millis() as u64;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Idle identity reaper stopping");
                break;
            }
            _ = interval.tick() => {
                let evicted = limiter.evict_idle(clock.now_millis(), idle_ms);
                if evicted > 0 {
                    tracing::info!(
                        evicted,
                        tracked = limiter.tracked_identities(),
                        "Evicted idle identities",
                    );
                } else {
                    tracing::debug!("Idle identity reaper: nothing to evict");
                }
            }
        }
    }
}
