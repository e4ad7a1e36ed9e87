//! Caller identity extractor for the admission gate.

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::request::Parts;

/// Identity used when neither a forwarded address nor a peer address is known.
pub const UNKNOWN_IDENTITY: &str = "unknown";

/// The caller's identity as seen by the limiter.
///
/// Resolution order: first entry of `X-Forwarded-For`, then the peer IP
/// (requires serving with `into_make_service_with_connect_info`), then
/// [`UNKNOWN_IDENTITY`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity(pub String);

impl ClientIdentity {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<S> FromRequestParts<S> for ClientIdentity
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let forwarded = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|s| !s.is_empty());
        if let Some(addr) = forwarded {
            return Ok(Self(addr.to_string()));
        }

        match ConnectInfo::<SocketAddr>::from_request_parts(parts, state).await {
            Ok(ConnectInfo(peer)) => Ok(Self(peer.ip().to_string())),
            Err(_) => Ok(Self(UNKNOWN_IDENTITY.to_string())),
        }
    }
}
