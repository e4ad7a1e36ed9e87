use std::sync::Arc;
use std::time::Duration;

use throttleq_queue::JobQueue;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::WorkerConfig;
use crate::task::JobHandler;
use crate::worker::Worker;

/// A set of [`Worker`] loops sharing one channel and one cancellation token.
pub struct WorkerPool {
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `config.concurrency` workers. Each gets a child of `cancel`.
    pub fn spawn(
        config: &WorkerConfig,
        queue: Arc<dyn JobQueue>,
        handler: Arc<dyn JobHandler>,
        cancel: CancellationToken,
    ) -> Self {
        let handles = (1..=config.concurrency)
            .map(|n| {
                let worker = Worker::new(
                    format!("worker-{n}"),
                    config.channel.clone(),
                    Arc::clone(&queue),
                    Arc::clone(&handler),
                    config.poll_interval,
                );
                let token = cancel.child_token();
                tokio::spawn(async move { worker.run(token).await })
            })
            .collect();

        tracing::info!(
            channel = %config.channel,
            concurrency = config.concurrency,
            "Worker pool started",
        );

        Self { cancel, handles }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Cancel all workers and wait up to `grace` for in-flight jobs.
    pub async fn shutdown(self, grace: Duration) {
        self.cancel.cancel();
        let all = join_workers(self.handles);
        match tokio::time::timeout(grace, all).await {
            Ok(()) => tracing::info!("Worker pool stopped"),
            Err(_) => tracing::warn!(
                grace_secs = grace.as_secs(),
                "Worker pool did not stop within the grace period",
            ),
        }
    }
}

async fn join_workers(handles: Vec<JoinHandle<()>>) {
    for handle in handles {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "Worker task failed");
        }
    }
}
