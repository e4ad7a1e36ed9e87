//! Process-resident [`JobQueue`] implementation.
//!
//! Each channel keeps its jobs behind its own async mutex, so work on one
//! channel never waits for another. Pause deadlines live outside those locks
//! in [`ChannelPauses`]. Time is measured with `tokio::time::Instant`, which
//! lets tests drive leases, backoff and pauses with a paused runtime clock.
//!
//! Ordering: new and retried (post-backoff) jobs join the tail of the
//! channel; released and stalled jobs go back to the head so a pause or a
//! crashed worker never lets later jobs overtake them.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use throttleq_core::config::env_or;
use throttleq_core::error::CoreError;
use throttleq_core::job_state::JobState;
use throttleq_core::types::JobId;
use tokio::sync::{broadcast, Mutex};
use tokio::time::Instant;

use crate::error::QueueError;
use crate::events::{EventBus, QueueEvent};
use crate::job::{FailureDisposition, Job, JobOptions, QueueCounts, MAX_LOG_LINES};
use crate::pause::ChannelPauses;
use crate::queue::JobQueue;

/// Default time a worker may hold a job before it is handed to another.
pub const DEFAULT_LEASE_DURATION: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueConfig {
    /// How long a lease lasts without a progress update.
    pub lease_duration: Duration,
}

impl QueueConfig {
    /// Load from `QUEUE_LEASE_SECS` (default 30).
    pub fn from_env() -> Result<Self, CoreError> {
        let secs: u64 = env_or("QUEUE_LEASE_SECS", DEFAULT_LEASE_DURATION.as_secs())?;
        if secs == 0 {
            return Err(CoreError::Validation(
                "QUEUE_LEASE_SECS must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            lease_duration: Duration::from_secs(secs),
        })
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            lease_duration: DEFAULT_LEASE_DURATION,
        }
    }
}

// ---------------------------------------------------------------------------
// Per-channel state
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct JobRecord {
    job: Job,
    lease_expires_at: Option<Instant>,
    available_at: Option<Instant>,
}

impl JobRecord {
    /// Move the job to `to`, stamping `finished_at` on terminal states.
    fn transition(&mut self, to: JobState) {
        let checked = self.job.state.validate_transition(to);
        if let Err(msg) = &checked {
            tracing::error!(job_id = self.job.id, "{msg}");
        }
        debug_assert!(checked.is_ok(), "{checked:?}");
        self.job.state = to;
        if to.is_terminal() {
            self.job.finished_at = Some(Utc::now());
        }
    }
}

#[derive(Debug, Default)]
struct ChannelJobs {
    jobs: HashMap<JobId, JobRecord>,
    waiting: VecDeque<JobId>,
}

impl ChannelJobs {
    /// Move delayed jobs whose backoff has elapsed to the tail of the queue.
    fn promote_due(&mut self, now: Instant) {
        let mut due: Vec<(Instant, JobId)> = self
            .jobs
            .values()
            .filter(|r| r.job.state == JobState::Delayed)
            .filter_map(|r| r.available_at.filter(|at| *at <= now).map(|at| (at, r.job.id)))
            .collect();
        due.sort();

        for (_, id) in due {
            if let Some(record) = self.jobs.get_mut(&id) {
                record.transition(JobState::Waiting);
                record.available_at = None;
                self.waiting.push_back(id);
            }
        }
    }

    /// Return jobs with expired leases to the head of the queue, preserving
    /// their relative order. Returns the reclaimed ids.
    fn reclaim_expired(&mut self, now: Instant) -> Vec<JobId> {
        let mut expired: Vec<JobId> = self
            .jobs
            .values()
            .filter(|r| r.job.state == JobState::Active)
            .filter(|r| r.lease_expires_at.is_some_and(|at| at <= now))
            .map(|r| r.job.id)
            .collect();
        expired.sort_unstable();

        for &id in expired.iter().rev() {
            if let Some(record) = self.jobs.get_mut(&id) {
                record.transition(JobState::Waiting);
                record.lease_expires_at = None;
                self.waiting.push_front(id);
            }
        }
        expired
    }

    fn record_mut(&mut self, job_id: JobId) -> Result<&mut JobRecord, QueueError> {
        self.jobs
            .get_mut(&job_id)
            .ok_or(QueueError::JobNotFound(job_id))
    }

    /// The job's record, provided it is currently leased.
    fn active_mut(&mut self, job_id: JobId) -> Result<&mut JobRecord, QueueError> {
        let record = self.record_mut(job_id)?;
        if record.job.state != JobState::Active {
            return Err(QueueError::LeaseLost {
                job_id,
                state: record.job.state,
            });
        }
        Ok(record)
    }
}

// ---------------------------------------------------------------------------
// MemoryQueue
// ---------------------------------------------------------------------------

/// In-memory job broker shared via `Arc`.
#[derive(Debug)]
pub struct MemoryQueue {
    config: QueueConfig,
    next_id: AtomicI64,
    channels: DashMap<String, Arc<Mutex<ChannelJobs>>>,
    job_channels: DashMap<JobId, String>,
    pauses: ChannelPauses,
    events: EventBus,
}

impl MemoryQueue {
    pub fn new(config: QueueConfig) -> Self {
        Self {
            config,
            next_id: AtomicI64::new(1),
            channels: DashMap::new(),
            job_channels: DashMap::new(),
            pauses: ChannelPauses::new(),
            events: EventBus::default(),
        }
    }

    /// Subscribe to job and channel lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.events.subscribe()
    }

    fn channel(&self, name: &str) -> Arc<Mutex<ChannelJobs>> {
        Arc::clone(self.channels.entry(name.to_owned()).or_default().value())
    }

    fn existing_channel(&self, name: &str) -> Option<Arc<Mutex<ChannelJobs>>> {
        self.channels.get(name).map(|c| Arc::clone(c.value()))
    }

    /// Resolve the channel that owns `job_id`.
    fn channel_of(&self, job_id: JobId) -> Result<(String, Arc<Mutex<ChannelJobs>>), QueueError> {
        let name = self
            .job_channels
            .get(&job_id)
            .map(|c| c.value().clone())
            .ok_or(QueueError::JobNotFound(job_id))?;
        let jobs = self.channel(&name);
        Ok((name, jobs))
    }
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new(QueueConfig::default())
    }
}

#[async_trait]
impl JobQueue for MemoryQueue {
    async fn enqueue(
        &self,
        channel: &str,
        payload: serde_json::Value,
        options: JobOptions,
    ) -> Result<Job, QueueError> {
        options.validate()?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let job = Job {
            id,
            channel: channel.to_owned(),
            payload,
            state: JobState::Waiting,
            attempts_made: 0,
            max_attempts: options.attempts,
            backoff: options.backoff,
            progress: 0,
            result: None,
            failed_reason: None,
            logs: Vec::new(),
            created_at: Utc::now(),
            processed_at: None,
            finished_at: None,
        };

        let jobs = self.channel(channel);
        {
            let mut jobs = jobs.lock().await;
            jobs.jobs.insert(
                id,
                JobRecord {
                    job: job.clone(),
                    lease_expires_at: None,
                    available_at: None,
                },
            );
            jobs.waiting.push_back(id);
        }
        self.job_channels.insert(id, channel.to_owned());

        tracing::debug!(job_id = id, channel, "Job enqueued");
        self.events.publish(QueueEvent::Enqueued {
            channel: channel.to_owned(),
            job_id: id,
        });
        Ok(job)
    }

    async fn lease(&self, channel: &str) -> Result<Option<Job>, QueueError> {
        let now = Instant::now();
        if self.pauses.paused_until(channel, now).is_some() {
            return Ok(None);
        }

        let Some(jobs) = self.existing_channel(channel) else {
            return Ok(None);
        };
        let mut jobs = jobs.lock().await;

        // A pause may have landed while this lease waited on the channel lock.
        let now = Instant::now();
        if self.pauses.paused_until(channel, now).is_some() {
            return Ok(None);
        }

        for job_id in jobs.reclaim_expired(now) {
            tracing::warn!(job_id, channel, "Lease expired, job returned to channel");
            self.events.publish(QueueEvent::Stalled {
                channel: channel.to_owned(),
                job_id,
            });
        }
        jobs.promote_due(now);

        let Some(job_id) = jobs.waiting.pop_front() else {
            return Ok(None);
        };
        let record = jobs.record_mut(job_id)?;
        record.transition(JobState::Active);
        record.lease_expires_at = Some(now + self.config.lease_duration);
        record.job.processed_at = Some(Utc::now());
        let job = record.job.clone();
        drop(jobs);

        tracing::debug!(job_id, channel, "Job leased");
        self.events.publish(QueueEvent::Active {
            channel: channel.to_owned(),
            job_id,
        });
        Ok(Some(job))
    }

    async fn report_completed(
        &self,
        job_id: JobId,
        result: serde_json::Value,
    ) -> Result<(), QueueError> {
        let (channel, jobs) = self.channel_of(job_id)?;
        {
            let mut jobs = jobs.lock().await;
            let record = jobs.active_mut(job_id)?;
            record.transition(JobState::Completed);
            record.lease_expires_at = None;
            record.job.progress = 100;
            record.job.result = Some(result.clone());
        }

        self.events.publish(QueueEvent::Completed {
            channel,
            job_id,
            result,
        });
        Ok(())
    }

    async fn report_failed(
        &self,
        job_id: JobId,
        error: &str,
    ) -> Result<FailureDisposition, QueueError> {
        let (channel, jobs) = self.channel_of(job_id)?;
        let mut jobs = jobs.lock().await;
        let record = jobs.active_mut(job_id)?;

        record.job.attempts_made += 1;
        record.job.failed_reason = Some(error.to_owned());
        record.lease_expires_at = None;
        let attempts_made = record.job.attempts_made;

        let disposition = if attempts_made >= record.job.max_attempts {
            record.transition(JobState::Failed);
            FailureDisposition::Failed { attempts_made }
        } else {
            let delay = record.job.backoff.delay_for(attempts_made);
            record.transition(JobState::Delayed);
            record.available_at = Some(Instant::now() + delay);
            FailureDisposition::Retrying {
                attempts_made,
                delay,
            }
        };
        drop(jobs);

        let event = match disposition {
            FailureDisposition::Failed { attempts_made } => {
                tracing::warn!(job_id, %channel, attempts_made, error, "Job failed terminally");
                QueueEvent::Failed {
                    channel,
                    job_id,
                    attempts_made,
                    reason: error.to_owned(),
                }
            }
            FailureDisposition::Retrying {
                attempts_made,
                delay,
            } => {
                tracing::info!(
                    job_id,
                    %channel,
                    attempts_made,
                    delay_ms = delay.as_millis() as u64,
                    "Job attempt failed, retrying after backoff",
                );
                QueueEvent::Retrying {
                    channel,
                    job_id,
                    attempts_made,
                    delay_ms: delay.as_millis() as u64,
                    reason: error.to_owned(),
                }
            }
        };
        self.events.publish(event);
        Ok(disposition)
    }

    async fn release(&self, job_id: JobId) -> Result<(), QueueError> {
        let (channel, jobs) = self.channel_of(job_id)?;
        {
            let mut jobs = jobs.lock().await;
            let record = jobs.active_mut(job_id)?;
            record.transition(JobState::Waiting);
            record.lease_expires_at = None;
            jobs.waiting.push_front(job_id);
        }

        tracing::debug!(job_id, %channel, "Job released back to channel");
        self.events.publish(QueueEvent::Released { channel, job_id });
        Ok(())
    }

    async fn pause_channel(&self, channel: &str, until: Instant) -> Result<Instant, QueueError> {
        let effective = self.pauses.propose(channel, until);
        let pause_ms = effective.saturating_duration_since(Instant::now()).as_millis() as u64;

        tracing::info!(channel, pause_ms, "Channel paused");
        self.events.publish(QueueEvent::ChannelPaused {
            channel: channel.to_owned(),
            pause_ms,
        });
        Ok(effective)
    }

    async fn paused_until(&self, channel: &str) -> Result<Option<Instant>, QueueError> {
        Ok(self.pauses.paused_until(channel, Instant::now()))
    }

    async fn get_job(&self, channel: &str, job_id: JobId) -> Result<Option<Job>, QueueError> {
        let Some(jobs) = self.existing_channel(channel) else {
            return Ok(None);
        };
        let jobs = jobs.lock().await;
        Ok(jobs.jobs.get(&job_id).map(|r| r.job.clone()))
    }

    async fn update_progress(&self, job_id: JobId, percent: u8) -> Result<(), QueueError> {
        let (_, jobs) = self.channel_of(job_id)?;
        let mut jobs = jobs.lock().await;
        let record = jobs.active_mut(job_id)?;
        record.job.progress = percent.min(100);
        record.lease_expires_at = Some(Instant::now() + self.config.lease_duration);
        Ok(())
    }

    async fn append_log(&self, job_id: JobId, line: &str) -> Result<(), QueueError> {
        let (_, jobs) = self.channel_of(job_id)?;
        let mut jobs = jobs.lock().await;
        let logs = &mut jobs.record_mut(job_id)?.job.logs;
        if logs.len() >= MAX_LOG_LINES {
            logs.remove(0);
        }
        logs.push(line.to_owned());
        Ok(())
    }

    async fn counts(&self, channel: &str) -> Result<QueueCounts, QueueError> {
        let mut counts = QueueCounts::default();
        let Some(jobs) = self.existing_channel(channel) else {
            return Ok(counts);
        };
        let mut jobs = jobs.lock().await;
        jobs.promote_due(Instant::now());
        for record in jobs.jobs.values() {
            counts.record(record.job.state);
        }
        Ok(counts)
    }
}
