//! Processing job rows (the Job Store).

use roadwatch_core::error::CoreError;
use roadwatch_core::job::{status, JobType};
use roadwatch_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::status::StatusId;

/// A row from the `processing_jobs` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ProcessingJob {
    pub id: DbId,
    pub video_id: DbId,
    pub job_type: String,
    pub status_id: StatusId,
    pub retry_count: i32,
    /// Claim generation. Incremented on every claim; writes carrying an
    /// older value are discarded.
    pub attempt: i32,
    pub progress_percent: i16,
    pub worker_id: Option<String>,
    pub next_attempt_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub cancelled_at: Option<Timestamp>,
    pub error_message: Option<String>,
    pub result_data: Option<serde_json::Value>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl ProcessingJob {
    pub fn kind(&self) -> Result<JobType, CoreError> {
        self.job_type.parse()
    }

    pub fn status_name(&self) -> &'static str {
        status::status_name(self.status_id)
    }
}

/// Body of `POST /api/v1/videos/{id}/jobs`.
#[derive(Debug, Deserialize)]
pub struct EnqueueJob {
    pub job_type: JobType,
}

/// Result of an idempotent enqueue.
#[derive(Debug, Clone)]
pub struct Enqueued {
    pub job: ProcessingJob,
    /// `false` when an active job already existed and was returned as-is.
    pub created: bool,
}
