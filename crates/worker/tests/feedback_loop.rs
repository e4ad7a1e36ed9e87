//! The full throttle feedback loop: a worker pool draining a channel through
//! a sliding-window limiter that admits five requests per thirty seconds.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use throttleq_core::clock::Clock;
use throttleq_core::job_state::JobState;
use throttleq_core::rate_limit::{RateLimitConfig, SlidingWindowLimiter};
use throttleq_core::types::EpochMillis;
use throttleq_queue::{JobOptions, JobQueue, MemoryQueue, QueueEvent};
use throttleq_worker::config::WorkerConfig;
use throttleq_worker::gate::LocalGate;
use throttleq_worker::offboard::OffboardTask;
use throttleq_worker::pool::WorkerPool;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Wall clock derived from tokio's (paused) clock so limiter windows and
/// channel pauses move together.
#[derive(Debug)]
struct TokioClock(Instant);

impl Clock for TokioClock {
    fn now_millis(&self) -> EpochMillis {
        self.0.elapsed().as_millis() as EpochMillis
    }
}

#[tokio::test(start_paused = true)]
async fn workers_drain_the_channel_within_the_gate_quota() {
    let queue = Arc::new(MemoryQueue::default());
    let mut events = queue.subscribe();
    let config = WorkerConfig {
        concurrency: 2,
        work_delay: Duration::ZERO,
        ..Default::default()
    };
    let mut ids = Vec::new();
    for n in 0..7 {
        let job = queue
            .enqueue(&config.channel, json!({ "n": n }), JobOptions::default())
            .await
            .unwrap();
        ids.push(job.id);
    }

    let limiter = Arc::new(SlidingWindowLimiter::new(RateLimitConfig::default()));
    let gate = Arc::new(LocalGate::new(
        limiter,
        Arc::new(TokioClock(Instant::now())),
        "worker",
    ));
    let started = Instant::now();
    let pool = WorkerPool::spawn(
        &config,
        queue.clone(),
        Arc::new(OffboardTask::new(gate, config.work_delay)),
        CancellationToken::new(),
    );

    let deadline = started + Duration::from_secs(120);
    loop {
        let counts = queue.counts(&config.channel).await.unwrap();
        if counts.completed == ids.len() {
            break;
        }
        assert!(Instant::now() < deadline, "channel not drained: {counts:?}");
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert!(Instant::now() - started >= Duration::from_secs(30));

    for id in ids {
        let job = queue.get_job(&config.channel, id).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Completed);
        assert_eq!(job.attempts_made, 0);
    }

    let mut completions = 0;
    let mut pauses = 0;
    while let Ok(event) = events.try_recv() {
        match event {
            QueueEvent::Completed { .. } => completions += 1,
            QueueEvent::ChannelPaused { .. } => pauses += 1,
            QueueEvent::Failed { .. } | QueueEvent::Retrying { .. } => {
                panic!("throttling must not fail attempts: {event:?}")
            }
            _ => {}
        }
    }
    assert_eq!(completions, 7);
    assert!(pauses >= 1);

    pool.shutdown(Duration::from_secs(5)).await;
}
