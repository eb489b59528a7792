//! Handlers for video-scoped pipeline endpoints.
//!
//! Video rows are owned by the upload subsystem; these endpoints only
//! enqueue work for a video and read what the pipeline produced.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use roadwatch_core::error::CoreError;
use roadwatch_core::job::JobType;
use roadwatch_core::types::DbId;
use roadwatch_db::models::detection::DetectionListQuery;
use roadwatch_db::models::job::{EnqueueJob, Enqueued};
use roadwatch_db::repositories::{DetectionRepo, JobRepo, VideoRepo};
use serde::Serialize;

use crate::error::{AppError, AppResult};
use crate::response::{DataResponse, DetectionView, JobView};
use crate::state::AppState;

/// Body returned by both enqueue endpoints.
#[derive(Debug, Serialize)]
pub struct EnqueueResponse {
    pub job_id: DbId,
    pub video_id: DbId,
    pub job_type: String,
    pub status: &'static str,
    /// `false` when an active job for the same type already existed.
    pub created: bool,
}

impl From<Enqueued> for EnqueueResponse {
    fn from(enqueued: Enqueued) -> Self {
        Self {
            status: enqueued.job.status_name(),
            job_id: enqueued.job.id,
            video_id: enqueued.job.video_id,
            job_type: enqueued.job.job_type,
            created: enqueued.created,
        }
    }
}

fn enqueue_status(created: bool) -> StatusCode {
    if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    }
}

async fn ensure_video_exists(state: &AppState, video_id: DbId) -> AppResult<()> {
    VideoRepo::find_by_id(&state.pool, video_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Video",
            id: video_id,
        }))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Enqueue
// ---------------------------------------------------------------------------

/// POST /api/v1/videos/{id}/analysis
///
/// Request AI analysis of a video. Returns 201 for a new job, or 200 with
/// the job already queued or running for this video.
pub async fn request_analysis(
    State(state): State<AppState>,
    Path(video_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let enqueued = state
        .orchestrator
        .enqueue(video_id, JobType::AiAnalysis)
        .await?;
    let status = enqueue_status(enqueued.created);
    Ok((status, Json(DataResponse { data: EnqueueResponse::from(enqueued) })))
}

/// POST /api/v1/videos/{id}/jobs
pub async fn enqueue_job(
    State(state): State<AppState>,
    Path(video_id): Path<DbId>,
    Json(input): Json<EnqueueJob>,
) -> AppResult<impl IntoResponse> {
    let enqueued = state.orchestrator.enqueue(video_id, input.job_type).await?;
    let status = enqueue_status(enqueued.created);
    Ok((status, Json(DataResponse { data: EnqueueResponse::from(enqueued) })))
}

// ---------------------------------------------------------------------------
// Read
// ---------------------------------------------------------------------------

/// GET /api/v1/videos/{id}/jobs
///
/// All jobs for a video, newest first.
pub async fn list_jobs(
    State(state): State<AppState>,
    Path(video_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    ensure_video_exists(&state, video_id).await?;
    let jobs: Vec<JobView> = JobRepo::list_by_video(&state.pool, video_id)
        .await?
        .into_iter()
        .map(JobView::from)
        .collect();
    Ok(Json(DataResponse { data: jobs }))
}

/// GET /api/v1/videos/{id}/detections
///
/// Supports optional `detection_type` and `min_confidence` filters.
pub async fn list_detections(
    State(state): State<AppState>,
    Path(video_id): Path<DbId>,
    Query(params): Query<DetectionListQuery>,
) -> AppResult<impl IntoResponse> {
    if let Some(min) = params.min_confidence {
        if !(0.0..=1.0).contains(&min) {
            return Err(AppError::BadRequest(
                "min_confidence must be between 0 and 1".to_string(),
            ));
        }
    }
    ensure_video_exists(&state, video_id).await?;

    let detections: Vec<DetectionView> =
        DetectionRepo::list_by_video(&state.pool, video_id, &params)
            .await?
            .into_iter()
            .map(DetectionView::from)
            .collect();
    Ok(Json(DataResponse { data: detections }))
}
