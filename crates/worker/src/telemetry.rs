//! Tracing setup and queue event logging shared by the binaries.

use throttleq_queue::QueueEvent;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber.
///
/// `RUST_LOG` overrides `default_filter`; `LOG_FORMAT=json` switches to JSON
/// lines.
pub fn init_tracing(default_filter: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Log queue lifecycle events until `cancel` fires or the bus closes.
pub async fn log_queue_events(
    mut rx: broadcast::Receiver<QueueEvent>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = rx.recv() => event,
        };
        match event {
            Ok(QueueEvent::Completed { channel, job_id, result }) => {
                tracing::info!(%channel, job_id, %result, "Job completed");
            }
            Ok(QueueEvent::Failed { channel, job_id, attempts_made, reason }) => {
                tracing::error!(%channel, job_id, attempts_made, %reason, "Job failed permanently");
            }
            Ok(QueueEvent::ChannelPaused { channel, pause_ms }) => {
                tracing::info!(%channel, pause_ms, "Channel paused");
            }
            Ok(other) => tracing::trace!(?other, "Queue event"),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Queue event logger lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
