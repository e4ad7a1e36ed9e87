use std::time::Duration;

use throttleq_core::config::{env_list, env_opt, env_or};
use throttleq_core::error::CoreError;
use throttleq_core::rate_limit::RateLimitConfig;
use throttleq_queue::QueueConfig;
use throttleq_worker::config::WorkerConfig;

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS`.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Admission gate quota.
    pub rate_limit: RateLimitConfig,
    /// Forget identities idle for this long. `None` keeps every identity.
    pub rate_limit_idle_ttl: Option<Duration>,
    /// Run the worker pools inside the server process.
    pub worker_enabled: bool,
    pub worker: WorkerConfig,
    pub queue: QueueConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                    | Default                 |
    /// |----------------------------|-------------------------|
    /// | `HOST`                     | `0.0.0.0`               |
    /// | `PORT`                     | `3000`                  |
    /// | `CORS_ORIGINS`             | `http://localhost:5173` |
    /// | `REQUEST_TIMEOUT_SECS`     | `30`                    |
    /// | `RATE_LIMIT_IDLE_TTL_SECS` | unset                   |
    /// | `WORKER_ENABLED`           | `true`                  |
    ///
    /// Rate limit, worker and queue settings are read by their own
    /// `from_env` constructors.
    pub fn from_env() -> Result<Self, CoreError> {
        let idle_ttl_secs: Option<u64> = env_opt("RATE_LIMIT_IDLE_TTL_SECS")?;
        if idle_ttl_secs == Some(0) {
            return Err(CoreError::Validation(
                "RATE_LIMIT_IDLE_TTL_SECS must be at least 1".to_string(),
            ));
        }

        let worker = WorkerConfig::from_env()?;
        let queue = QueueConfig::from_env()?;
        worker.validate_lease(queue.lease_duration)?;

        Ok(Self {
            host: env_or("HOST", "0.0.0.0".to_string())?,
            port: env_or("PORT", 3000)?,
            cors_origins: env_list("CORS_ORIGINS", "http://localhost:5173"),
            request_timeout_secs: env_or("REQUEST_TIMEOUT_SECS", 30)?,
            rate_limit: RateLimitConfig::from_env()?,
            rate_limit_idle_ttl: idle_ttl_secs.map(Duration::from_secs),
            worker_enabled: env_or("WORKER_ENABLED", true)?,
            worker,
            queue,
        })
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            cors_origins: vec!["http://localhost:5173".to_string()],
            request_timeout_secs: 30,
            rate_limit: RateLimitConfig::default(),
            rate_limit_idle_ttl: None,
            worker_enabled: true,
            worker: WorkerConfig::default(),
            queue: QueueConfig::default(),
        }
    }
}
