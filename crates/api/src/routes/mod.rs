pub mod detections;
pub mod health;
pub mod jobs;
pub mod videos;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /videos/{id}/analysis              request AI analysis (POST)
/// /videos/{id}/jobs                  list jobs, enqueue job
/// /videos/{id}/detections            detections of a video
///
/// /jobs/{id}                         job status
/// /jobs/{id}/cancel                  cancel (POST)
///
/// /detections/pending                review queue
/// /detections/{id}                   get detection
/// /detections/{id}/review            review (POST)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/videos", videos::router())
        .nest("/jobs", jobs::router())
        .nest("/detections", detections::router())
}
