//! Handler for the admission gate endpoint.

use axum::extract::State;
use axum::Json;
use serde::Serialize;
use throttleq_core::types::EpochMillis;

use crate::error::{AppError, AppResult};
use crate::middleware::identity::ClientIdentity;
use crate::response::DataResponse;
use crate::state::AppState;

/// Body of an admitted request.
#[derive(Debug, Serialize)]
pub struct Admission {
    pub identity: String,
    /// Admissions left in the current window.
    pub remaining: usize,
    /// Epoch milliseconds at which the request was admitted.
    pub admitted_at: EpochMillis,
}

/// GET /rate-limited-queue/offboard
///
/// Admit the caller if its sliding window has room, otherwise reject with
/// `429` and a `Retry-After` in whole seconds.
pub async fn offboard(
    identity: ClientIdentity,
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<Admission>>> {
    let now = state.clock.now_millis();
    let decision = state.limiter.check(identity.as_str(), now);

    if !decision.admit {
        tracing::info!(
            identity = %identity.as_str(),
            retry_after_secs = decision.retry_after_secs,
            "Admission rejected",
        );
        return Err(AppError::RateLimited {
            retry_after_secs: decision.retry_after_secs,
        });
    }

    tracing::debug!(
        identity = %identity.as_str(),
        remaining = decision.remaining,
        "Admission granted",
    );

    Ok(Json(DataResponse {
        data: Admission {
            identity: identity.0,
            remaining: decision.remaining,
            admitted_at: now,
        },
    }))
}
