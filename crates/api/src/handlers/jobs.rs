//! Handlers for the `/jobs` resource.
//!
//! Jobs go to the email verification channel unless the body names the
//! throttle-aware channel instead. Lookups search both.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use throttleq_core::backoff::BackoffPolicy;
use throttleq_core::error::CoreError;
use throttleq_core::types::JobId;
use throttleq_queue::job::DEFAULT_ATTEMPTS;
use throttleq_queue::JobOptions;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Request body for `POST /jobs`. Every field is optional.
#[derive(Debug, Default, Deserialize)]
pub struct SubmitJob {
    pub channel: Option<String>,
    #[serde(default)]
    pub payload: serde_json::Value,
    pub attempts: Option<u32>,
    pub backoff: Option<BackoffPolicy>,
}

impl SubmitJob {
    fn options(&self) -> JobOptions {
        JobOptions {
            attempts: self.attempts.unwrap_or(DEFAULT_ATTEMPTS),
            backoff: self.backoff.unwrap_or_default(),
        }
    }
}

/// POST /api/v1/jobs
///
/// Enqueue a job. Returns 201 with the created job in `waiting`.
pub async fn submit_job(
    State(state): State<AppState>,
    input: Result<Json<SubmitJob>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let Json(input) = input.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let channels = state.job_channels();
    let channel = match input.channel.as_deref() {
        None => channels[0],
        Some(name) if channels.contains(&name) => name,
        Some(name) => {
            return Err(AppError::BadRequest(format!(
                "Unknown channel '{name}', expected one of: {}",
                channels.join(", ")
            )));
        }
    };
    let job = state
        .queue
        .enqueue(channel, input.payload.clone(), input.options())
        .await?;

    tracing::info!(
        job_id = job.id,
        channel = %job.channel,
        max_attempts = job.max_attempts,
        "Job submitted",
    );

    Ok((StatusCode::CREATED, Json(DataResponse { data: job })))
}

/// GET /api/v1/jobs/{id}
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> AppResult<impl IntoResponse> {
    for channel in state.job_channels() {
        if let Some(job) = state.queue.get_job(channel, job_id).await? {
            return Ok(Json(DataResponse { data: job }));
        }
    }

    Err(AppError::Core(CoreError::NotFound {
        entity: "Job",
        id: job_id,
    }))
}
