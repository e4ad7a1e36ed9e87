pub mod gate;
pub mod health;
pub mod jobs;
pub mod queues;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /jobs                      submit (POST)
/// /jobs/{id}                 get
/// /queues/{channel}          counts and pause state
/// ```
///
/// The admission gate and `/health` are mounted at the root, see
/// [`gate::router`] and [`health::router`].
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/jobs", jobs::router())
        .nest("/queues", queues::router())
}
