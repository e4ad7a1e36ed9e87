use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use serde_json::json;
use throttleq_core::config::env_or;
use throttleq_queue::{JobOptions, JobQueue, MemoryQueue, QueueConfig};
use tokio_util::sync::CancellationToken;

use throttleq_worker::config::WorkerConfig;
use throttleq_worker::email::EmailVerificationTask;
use throttleq_worker::gate::HttpGate;
use throttleq_worker::offboard::OffboardTask;
use throttleq_worker::pool::WorkerPool;
use throttleq_worker::telemetry;

/// How long in-flight jobs get to finish after a shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    telemetry::init_tracing("throttleq_worker=debug");

    // --- Configuration ---
    let config = WorkerConfig::from_env().context("Invalid worker configuration")?;
    let queue_config = QueueConfig::from_env().context("Invalid queue configuration")?;
    config
        .validate_lease(queue_config.lease_duration)
        .context("Invalid worker configuration")?;
    let seed_jobs: u32 = env_or("WORKER_SEED_JOBS", 0)?;
    tracing::info!(
        channel = %config.channel,
        concurrency = config.concurrency,
        gate_url = %config.gate_url,
        gate_timeout_secs = config.gate_timeout.as_secs(),
        email_channel = %config.email_channel,
        "Loaded worker configuration",
    );

    // --- Queue ---
    let queue = Arc::new(MemoryQueue::new(queue_config));
    let cancel = CancellationToken::new();
    let events_handle = tokio::spawn(telemetry::log_queue_events(
        queue.subscribe(),
        cancel.clone(),
    ));

    for n in 1..=seed_jobs {
        queue
            .enqueue(&config.channel, json!({ "seq": n }), JobOptions::default())
            .await
            .context("Failed to seed job")?;
    }
    if seed_jobs > 0 {
        tracing::info!(seed_jobs, channel = %config.channel, "Seeded jobs");
    }

    // --- Workers ---
    let gate = HttpGate::new(config.gate_url.clone(), config.gate_timeout)
        .context("Failed to build gate client")?;
    let handler = Arc::new(OffboardTask::new(Arc::new(gate), config.work_delay));
    let pool = WorkerPool::spawn(&config, queue.clone(), handler, cancel.clone());

    let email_pool = WorkerPool::spawn(
        &config.with_channel(config.email_channel.clone()),
        queue,
        Arc::new(EmailVerificationTask::new(config.email_step_delay)),
        cancel.clone(),
    );

    shutdown_signal().await;

    tokio::join!(
        pool.shutdown(SHUTDOWN_GRACE),
        email_pool.shutdown(SHUTDOWN_GRACE),
    );
    cancel.cancel();
    let _ = tokio::time::timeout(SHUTDOWN_GRACE, events_handle).await;

    tracing::info!("Worker shut down");
    Ok(())
}

/// Wait for SIGINT (Ctrl-C) or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
