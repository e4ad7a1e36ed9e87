use axum::routing::get;
use axum::Router;

use crate::handlers::gate;
use crate::state::AppState;

/// Admission gate, mounted at the root (not under `/api/v1`).
///
/// ```text
/// GET    /rate-limited-queue/offboard    -> offboard
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route("/rate-limited-queue/offboard", get(gate::offboard))
}
