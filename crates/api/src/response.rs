//! Shared response envelope and view types for API handlers.
//!
//! All API responses use a `{ "data": ... }` envelope.

use roadwatch_core::types::{DbId, Timestamp};
use roadwatch_db::models::detection::Detection;
use roadwatch_db::models::job::ProcessingJob;
use roadwatch_db::models::status::ReviewStatus;
use serde::Serialize;

/// Standard `{ "data": T }` response envelope.
#[derive(Debug, Serialize)]
pub struct DataResponse<T: Serialize> {
    pub data: T,
}

/// Job status as exposed to clients, with the status name resolved.
#[derive(Debug, Serialize)]
pub struct JobView {
    pub job_id: DbId,
    pub video_id: DbId,
    pub job_type: String,
    pub status: &'static str,
    pub retry_count: i32,
    pub progress_percent: i16,
    pub error_message: Option<String>,
    pub result_data: Option<serde_json::Value>,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub cancelled_at: Option<Timestamp>,
    pub created_at: Timestamp,
}

impl From<ProcessingJob> for JobView {
    fn from(job: ProcessingJob) -> Self {
        Self {
            status: job.status_name(),
            job_id: job.id,
            video_id: job.video_id,
            job_type: job.job_type,
            retry_count: job.retry_count,
            progress_percent: job.progress_percent,
            error_message: job.error_message,
            result_data: job.result_data,
            started_at: job.started_at,
            completed_at: job.completed_at,
            cancelled_at: job.cancelled_at,
            created_at: job.created_at,
        }
    }
}

/// A detection row with its review status name alongside the id.
#[derive(Debug, Serialize)]
pub struct DetectionView {
    #[serde(flatten)]
    pub detection: Detection,
    pub review_status: &'static str,
}

impl From<Detection> for DetectionView {
    fn from(detection: Detection) -> Self {
        let review_status = ReviewStatus::from_id(detection.review_status_id)
            .map(ReviewStatus::name)
            .unwrap_or("unknown");
        Self {
            detection,
            review_status,
        }
    }
}
