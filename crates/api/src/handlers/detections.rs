//! Handlers for the `/detections` resource: the review queue and the
//! review action itself.

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use roadwatch_core::error::CoreError;
use roadwatch_core::types::DbId;
use roadwatch_db::models::detection::PendingDetectionQuery;
use roadwatch_db::models::violation::Violation;
use roadwatch_db::repositories::DetectionRepo;
use roadwatch_pipeline::ReviewRequest;
use serde::Serialize;

use crate::error::{AppError, AppResult};
use crate::response::{DataResponse, DetectionView};
use crate::state::AppState;

/// A page of the review queue.
#[derive(Debug, Serialize)]
pub struct PendingPage {
    pub items: Vec<DetectionView>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// Body returned by a review.
#[derive(Debug, Serialize)]
pub struct ReviewResponse {
    pub detection: DetectionView,
    /// The violation created by an approval, if any.
    pub violation: Option<Violation>,
}

/// GET /api/v1/detections/pending
///
/// Unreviewed detections, newest first. Filters: `camera_id`,
/// `detection_type`, `violation_type`, `min_confidence`, `date_from`,
/// `date_to`; paging with `limit` (default 20, max 100) and `offset`.
pub async fn list_pending(
    State(state): State<AppState>,
    Query(params): Query<PendingDetectionQuery>,
) -> AppResult<impl IntoResponse> {
    if let (Some(from), Some(to)) = (params.date_from, params.date_to) {
        if from > to {
            return Err(AppError::BadRequest(
                "date_from must not be after date_to".to_string(),
            ));
        }
    }

    let page = DetectionRepo::list_pending(&state.pool, &params).await?;
    Ok(Json(DataResponse {
        data: PendingPage {
            items: page.items.into_iter().map(DetectionView::from).collect(),
            total: page.total,
            limit: page.limit,
            offset: page.offset,
        },
    }))
}

/// GET /api/v1/detections/{id}
pub async fn get_detection(
    State(state): State<AppState>,
    Path(detection_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let detection = DetectionRepo::find_by_id(&state.pool, detection_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Detection",
            id: detection_id,
        }))?;
    Ok(Json(DataResponse { data: DetectionView::from(detection) }))
}

/// POST /api/v1/detections/{id}/review
///
/// Approve, reject or modify a detection. A detection can be reviewed
/// exactly once; later attempts return 409 `ALREADY_REVIEWED`.
pub async fn review_detection(
    State(state): State<AppState>,
    Path(detection_id): Path<DbId>,
    Json(input): Json<ReviewRequest>,
) -> AppResult<impl IntoResponse> {
    let result = state.reviews.review(detection_id, input).await?;
    Ok(Json(DataResponse {
        data: ReviewResponse {
            detection: DetectionView::from(result.detection),
            violation: result.violation,
        },
    }))
}
