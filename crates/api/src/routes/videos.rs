//! Route definitions for video-scoped pipeline endpoints.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::videos;
use crate::state::AppState;

/// Routes mounted at `/videos`.
///
/// ```text
/// POST   /{id}/analysis     -> request_analysis
/// GET    /{id}/jobs         -> list_jobs
/// POST   /{id}/jobs         -> enqueue_job
/// GET    /{id}/detections   -> list_detections
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{id}/analysis", post(videos::request_analysis))
        .route("/{id}/jobs", get(videos::list_jobs).post(videos::enqueue_job))
        .route("/{id}/detections", get(videos::list_detections))
}
