//! Request-side job operations: enqueue and cancel.
//!
//! Both are single conditional statements in the Job Store, so they are
//! safe to call from any number of API processes alongside running
//! workers.

use roadwatch_core::error::CoreError;
use roadwatch_core::job::{JobType, CANCELLED_MESSAGE};
use roadwatch_core::types::DbId;
use roadwatch_db::models::job::{Enqueued, ProcessingJob};
use roadwatch_db::repositories::{JobRepo, VideoRepo};
use roadwatch_db::DbPool;

use crate::error::JobError;

#[derive(Clone)]
pub struct Orchestrator {
    pool: DbPool,
}

impl Orchestrator {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Enqueue a job, returning the existing active job for the same
    /// `(video, type)` unchanged if there is one.
    pub async fn enqueue(&self, video_id: DbId, job_type: JobType) -> Result<Enqueued, JobError> {
        if VideoRepo::find_by_id(&self.pool, video_id).await?.is_none() {
            return Err(CoreError::NotFound {
                entity: "Video",
                id: video_id,
            }
            .into());
        }

        let enqueued = JobRepo::enqueue(&self.pool, video_id, job_type).await?;
        if enqueued.created {
            tracing::info!(
                job_id = enqueued.job.id,
                video_id,
                job_type = %job_type,
                "Job enqueued",
            );
        } else {
            tracing::debug!(
                job_id = enqueued.job.id,
                video_id,
                job_type = %job_type,
                "Active job already exists, returning it",
            );
        }
        Ok(enqueued)
    }

    /// Cancel a PENDING or PROCESSING job.
    ///
    /// A running attempt is not interrupted; its generation is retired so
    /// whatever it produces is discarded at commit time.
    pub async fn cancel(&self, job_id: DbId) -> Result<ProcessingJob, JobError> {
        if let Some(job) = JobRepo::cancel(&self.pool, job_id, CANCELLED_MESSAGE).await? {
            tracing::info!(job_id, video_id = job.video_id, "Job cancelled");
            return Ok(job);
        }

        match JobRepo::find_by_id(&self.pool, job_id).await? {
            None => Err(CoreError::NotFound {
                entity: "ProcessingJob",
                id: job_id,
            }
            .into()),
            Some(job) => Err(CoreError::Conflict(format!(
                "Job {job_id} is already {} and cannot be cancelled",
                job.status_name()
            ))
            .into()),
        }
    }
}
