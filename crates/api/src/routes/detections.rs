use axum::routing::{get, post};
use axum::Router;

use crate::handlers::detections;
use crate::state::AppState;

/// Routes mounted at `/detections`.
///
/// ```text
/// GET    /pending         -> list_pending
/// GET    /{id}            -> get_detection
/// POST   /{id}/review     -> review_detection
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/pending", get(detections::list_pending))
        .route("/{id}", get(detections::get_detection))
        .route("/{id}/review", post(detections::review_detection))
}
