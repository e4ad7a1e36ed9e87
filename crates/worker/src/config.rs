use std::time::Duration;

use throttleq_core::config::env_or;
use throttleq_core::error::CoreError;

/// Channel the throttle-aware workers consume by default.
pub const DEFAULT_CHANNEL: &str = "rate-limited-queue";

/// Default admission gate endpoint.
pub const DEFAULT_GATE_URL: &str = "http://127.0.0.1:3000/rate-limited-queue/offboard";

/// Default per-request timeout for gate calls.
pub const DEFAULT_GATE_TIMEOUT: Duration = Duration::from_secs(10);

/// Channel the email verification workers consume by default.
pub const DEFAULT_EMAIL_CHANNEL: &str = "email-verification";

/// Worker configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Channel to lease jobs from.
    pub channel: String,
    /// Number of concurrent worker loops.
    pub concurrency: usize,
    /// Delay between lease attempts while the channel is empty.
    pub poll_interval: Duration,
    /// Simulated work performed before each gate call.
    pub work_delay: Duration,
    /// Admission gate URL.
    pub gate_url: String,
    /// Upper bound on a single gate call. Must stay below the lease duration.
    pub gate_timeout: Duration,
    /// Channel the email verification task consumes.
    pub email_channel: String,
    /// Delay between the email task's progress steps.
    pub email_step_delay: Duration,
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                   | Default                                              |
    /// |---------------------------|------------------------------------------------------|
    /// | `WORKER_CHANNEL`          | `rate-limited-queue`                                 |
    /// | `WORKER_CONCURRENCY`      | `1`                                                  |
    /// | `WORKER_POLL_INTERVAL_MS` | `250`                                                |
    /// | `WORKER_WORK_DELAY_MS`    | `1500`                                               |
    /// | `GATE_URL`                | `http://127.0.0.1:3000/rate-limited-queue/offboard`  |
    /// | `GATE_TIMEOUT_SECS`       | `10`                                                 |
    /// | `EMAIL_CHANNEL`           | `email-verification`                                 |
    /// | `EMAIL_STEP_DELAY_MS`     | `80`                                                 |
    pub fn from_env() -> Result<Self, CoreError> {
        let config = Self {
            channel: env_or("WORKER_CHANNEL", DEFAULT_CHANNEL.to_string())?,
            concurrency: env_or("WORKER_CONCURRENCY", 1)?,
            poll_interval: Duration::from_millis(env_or("WORKER_POLL_INTERVAL_MS", 250)?),
            work_delay: Duration::from_millis(env_or("WORKER_WORK_DELAY_MS", 1_500)?),
            gate_url: env_or("GATE_URL", DEFAULT_GATE_URL.to_string())?,
            gate_timeout: Duration::from_secs(env_or(
                "GATE_TIMEOUT_SECS",
                DEFAULT_GATE_TIMEOUT.as_secs(),
            )?),
            email_channel: env_or("EMAIL_CHANNEL", DEFAULT_EMAIL_CHANNEL.to_string())?,
            email_step_delay: Duration::from_millis(env_or("EMAIL_STEP_DELAY_MS", 80)?),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.channel.is_empty() {
            return Err(CoreError::Validation(
                "WORKER_CHANNEL must not be empty".to_string(),
            ));
        }
        if self.concurrency == 0 {
            return Err(CoreError::Validation(
                "WORKER_CONCURRENCY must be at least 1".to_string(),
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(CoreError::Validation(
                "WORKER_POLL_INTERVAL_MS must be at least 1".to_string(),
            ));
        }
        if self.gate_timeout.is_zero() {
            return Err(CoreError::Validation(
                "GATE_TIMEOUT_SECS must be at least 1".to_string(),
            ));
        }
        if self.email_channel.is_empty() {
            return Err(CoreError::Validation(
                "EMAIL_CHANNEL must not be empty".to_string(),
            ));
        }
        if self.email_channel == self.channel {
            return Err(CoreError::Validation(
                "EMAIL_CHANNEL must differ from WORKER_CHANNEL".to_string(),
            ));
        }
        Ok(())
    }

    /// A hung gate call or email step must give up before its lease
    /// expires, or another worker re-runs the job concurrently.
    pub fn validate_lease(&self, lease_duration: Duration) -> Result<(), CoreError> {
        if self.gate_timeout >= lease_duration {
            return Err(CoreError::Validation(format!(
                "GATE_TIMEOUT_SECS ({}s) must be shorter than the lease ({}s)",
                self.gate_timeout.as_secs(),
                lease_duration.as_secs(),
            )));
        }
        if self.email_step_delay >= lease_duration {
            return Err(CoreError::Validation(format!(
                "EMAIL_STEP_DELAY_MS ({}ms) must be shorter than the lease ({}s)",
                self.email_step_delay.as_millis(),
                lease_duration.as_secs(),
            )));
        }
        Ok(())
    }

    /// The same pool settings pointed at another channel.
    pub fn with_channel(&self, channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            ..self.clone()
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            channel: DEFAULT_CHANNEL.to_string(),
            concurrency: 1,
            poll_interval: Duration::from_millis(250),
            work_delay: Duration::from_millis(1_500),
            gate_url: DEFAULT_GATE_URL.to_string(),
            gate_timeout: DEFAULT_GATE_TIMEOUT,
            email_channel: DEFAULT_EMAIL_CHANNEL.to_string(),
            email_step_delay: Duration::from_millis(80),
        }
    }
}
