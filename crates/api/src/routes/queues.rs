use axum::routing::get;
use axum::Router;

use crate::handlers::queues;
use crate::state::AppState;

/// Routes mounted at `/queues`.
pub fn router() -> Router<AppState> {
    Router::new().route("/{channel}", get(queues::get_queue))
}
