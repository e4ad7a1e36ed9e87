use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;
use throttleq_queue::QueueCounts;
use tokio::time::Instant;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

/// Snapshot of one channel.
#[derive(Debug, Serialize)]
pub struct QueueStatus {
    pub channel: String,
    pub counts: QueueCounts,
    /// Milliseconds left on the channel's pause, `null` when not paused.
    pub paused_until_ms: Option<u64>,
}

/// GET /api/v1/queues/{channel}
pub async fn get_queue(
    State(state): State<AppState>,
    Path(channel): Path<String>,
) -> AppResult<Json<DataResponse<QueueStatus>>> {
    let counts = state.queue.counts(&channel).await?;
    let paused_until_ms = state
        .queue
        .paused_until(&channel)
        .await?
        .map(|until| until.saturating_duration_since(Instant::now()).as_millis() as u64);

    Ok(Json(DataResponse {
        data: QueueStatus {
            channel,
            counts,
            paused_until_ms,
        },
    }))
}
