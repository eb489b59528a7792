//! Handlers for the `/jobs` resource.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use roadwatch_core::error::CoreError;
use roadwatch_core::types::DbId;
use roadwatch_db::repositories::JobRepo;

use crate::error::{AppError, AppResult};
use crate::response::{DataResponse, JobView};
use crate::state::AppState;

/// GET /api/v1/jobs/{id}
///
/// Job status, retry count, last error and result summary.
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let job = JobRepo::find_by_id(&state.pool, job_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "ProcessingJob",
            id: job_id,
        }))?;
    Ok(Json(DataResponse { data: JobView::from(job) }))
}

/// POST /api/v1/jobs/{id}/cancel
///
/// Cancel a pending or running job. Returns 409 if the job already
/// reached a terminal state. A running attempt keeps going until its next
/// write, which is then discarded.
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let job = state.orchestrator.cancel(job_id).await?;
    Ok(Json(DataResponse { data: JobView::from(job) }))
}
