//! Client side of the admission gate.
//!
//! [`AdmissionGate`] is the seam the offboard task calls through.
//! [`HttpGate`] talks to the gate endpoint with [`reqwest`] and classifies
//! the response; [`LocalGate`] evaluates a [`SlidingWindowLimiter`] in
//! process, with the same body shape the endpoint produces.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use serde_json::json;
use throttleq_core::clock::Clock;
use throttleq_core::rate_limit::SlidingWindowLimiter;

/// Classified gate response.
#[derive(Debug, Clone, PartialEq)]
pub enum GateResponse {
    /// The gate admitted the request. Holds the `data` object of the body.
    Admitted(serde_json::Value),
    /// The gate rejected the request; retry after this many seconds.
    Throttled { retry_after_secs: u64 },
    /// Any other status, including a 429 without a usable `Retry-After`.
    Unclassified { status: u16 },
}

/// Errors raised while talking to the gate.
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    /// The HTTP request itself failed (connect, DNS, reset, timeout).
    #[error("Gate request failed")]
    Transport(#[from] reqwest::Error),

    /// The gate admitted the request but its body was not JSON.
    #[error("Gate returned an unreadable body")]
    InvalidBody(#[from] serde_json::Error),
}

#[async_trait]
pub trait AdmissionGate: Send + Sync {
    /// Ask the gate for admission once.
    async fn request(&self) -> Result<GateResponse, GateError>;
}

// ---------------------------------------------------------------------------
// HTTP
// ---------------------------------------------------------------------------

/// Admission gate reached over HTTP.
pub struct HttpGate {
    client: reqwest::Client,
    url: String,
}

impl HttpGate {
    /// Gate client whose requests give up after `timeout`.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, GateError> {
        let client = Self::client_builder(timeout).build()?;
        Ok(Self::with_client(client, url))
    }

    /// Client settings used by [`HttpGate::new`].
    pub fn client_builder(timeout: Duration) -> reqwest::ClientBuilder {
        reqwest::Client::builder().timeout(timeout)
    }

    /// Reuse an existing [`reqwest::Client`] (shared connection pool).
    pub fn with_client(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl AdmissionGate for HttpGate {
    async fn request(&self) -> Result<GateResponse, GateError> {
        let response = self.client.get(&self.url).send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Ok(match parse_retry_after(response.headers()) {
                Some(retry_after_secs) => GateResponse::Throttled { retry_after_secs },
                None => {
                    tracing::warn!(url = %self.url, "Gate sent 429 without a Retry-After");
                    GateResponse::Unclassified {
                        status: status.as_u16(),
                    }
                }
            });
        }

        if !status.is_success() {
            return Ok(GateResponse::Unclassified {
                status: status.as_u16(),
            });
        }

        let bytes = response.bytes().await?;
        let body: serde_json::Value = serde_json::from_slice(&bytes)?;
        Ok(GateResponse::Admitted(unwrap_data(body)))
    }
}

/// Strip the `{ "data": ... }` envelope when present.
fn unwrap_data(body: serde_json::Value) -> serde_json::Value {
    match body {
        serde_json::Value::Object(mut map) if map.contains_key("data") => {
            map.remove("data").unwrap_or_default()
        }
        other => other,
    }
}

/// Parse a `Retry-After` header given in whole seconds.
///
/// The HTTP-date form is not accepted.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

// ---------------------------------------------------------------------------
// In-process
// ---------------------------------------------------------------------------

/// Admission gate evaluated directly against a limiter, as a fixed identity.
pub struct LocalGate {
    limiter: Arc<SlidingWindowLimiter>,
    clock: Arc<dyn Clock>,
    identity: String,
}

impl LocalGate {
    pub fn new(
        limiter: Arc<SlidingWindowLimiter>,
        clock: Arc<dyn Clock>,
        identity: impl Into<String>,
    ) -> Self {
        Self {
            limiter,
            clock,
            identity: identity.into(),
        }
    }
}

#[async_trait]
impl AdmissionGate for LocalGate {
    async fn request(&self) -> Result<GateResponse, GateError> {
        let now = self.clock.now_millis();
        let decision = self.limiter.check(&self.identity, now);
        if !decision.admit {
            return Ok(GateResponse::Throttled {
                retry_after_secs: decision.retry_after_secs,
            });
        }
        Ok(GateResponse::Admitted(json!({
            "identity": self.identity,
            "remaining": decision.remaining,
            "admitted_at": now,
        })))
    }
}
