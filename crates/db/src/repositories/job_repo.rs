//! Repository for the `processing_jobs` table (the Job Store).
//!
//! Every transition that can race with another worker or with a stale
//! attempt is a conditional update: claims use `FOR UPDATE SKIP LOCKED`,
//! and writes from a running attempt are guarded by
//! `status_id = PROCESSING AND attempt = $attempt`. A write that matches no
//! row means the attempt was superseded (timeout, cancel, reap) and is
//! dropped by the caller.
//!
//! Jobs whose type drives the video's processing status (AI_ANALYSIS)
//! update `videos.processing_status_id` in the same transaction.

use std::time::Duration;

use roadwatch_core::job::JobType;
use roadwatch_core::types::DbId;
use sqlx::PgPool;

use crate::models::job::{Enqueued, ProcessingJob};
use crate::models::status::{JobStatus, ProcessingStatus};
use crate::repositories::VideoRepo;

/// Column list for `processing_jobs` queries.
const COLUMNS: &str = "\
    id, video_id, job_type, status_id, retry_count, attempt, progress_percent, \
    worker_id, next_attempt_at, started_at, completed_at, cancelled_at, \
    error_message, result_data, created_at, updated_at";

/// How many times enqueue retries when the conflicting active job finishes
/// between the insert and the lookup.
const ENQUEUE_ATTEMPTS: usize = 3;

pub struct JobRepo;

impl JobRepo {
    // -----------------------------------------------------------------------
    // Enqueue
    // -----------------------------------------------------------------------

    /// Create a PENDING job, or return the active one for the same
    /// `(video_id, job_type)`.
    ///
    /// The check-and-create is a single `INSERT .. ON CONFLICT DO NOTHING`
    /// against the partial unique index `uq_processing_jobs_active`, so two
    /// concurrent callers can never both insert.
    pub async fn enqueue(
        pool: &PgPool,
        video_id: DbId,
        job_type: JobType,
    ) -> Result<Enqueued, sqlx::Error> {
        let insert = format!(
            "INSERT INTO processing_jobs (video_id, job_type, status_id) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (video_id, job_type) WHERE status_id IN (1, 2) DO NOTHING \
             RETURNING {COLUMNS}"
        );

        for _ in 0..ENQUEUE_ATTEMPTS {
            let mut tx = pool.begin().await?;

            let inserted = sqlx::query_as::<_, ProcessingJob>(&insert)
                .bind(video_id)
                .bind(job_type.as_str())
                .bind(JobStatus::Pending.id())
                .fetch_optional(&mut *tx)
                .await?;

            if let Some(job) = inserted {
                if job_type.tracks_video_status() {
                    sqlx::query(
                        "UPDATE videos SET processing_status_id = $2 \
                         WHERE id = $1 AND processing_status_id = $3",
                    )
                    .bind(video_id)
                    .bind(ProcessingStatus::Pending.id())
                    .bind(ProcessingStatus::Failed.id())
                    .execute(&mut *tx)
                    .await?;
                }
                tx.commit().await?;
                return Ok(Enqueued { job, created: true });
            }

            let query = format!(
                "SELECT {COLUMNS} FROM processing_jobs \
                 WHERE video_id = $1 AND job_type = $2 AND status_id IN ($3, $4)"
            );
            let existing = sqlx::query_as::<_, ProcessingJob>(&query)
                .bind(video_id)
                .bind(job_type.as_str())
                .bind(JobStatus::Pending.id())
                .bind(JobStatus::Processing.id())
                .fetch_optional(&mut *tx)
                .await?;
            tx.commit().await?;

            if let Some(job) = existing {
                return Ok(Enqueued {
                    job,
                    created: false,
                });
            }
            tracing::debug!(video_id, %job_type, "Active job finished during enqueue, retrying");
        }

        Err(sqlx::Error::Protocol(format!(
            "could not enqueue {job_type} for video {video_id}: active job kept changing"
        )))
    }

    // -----------------------------------------------------------------------
    // Claim
    // -----------------------------------------------------------------------

    /// Atomically claim the oldest due PENDING job.
    ///
    /// Uses `SELECT FOR UPDATE SKIP LOCKED` so concurrent workers never
    /// receive the same row. Bumps `attempt` to open a new generation.
    pub async fn claim_next(
        pool: &PgPool,
        worker_id: &str,
    ) -> Result<Option<ProcessingJob>, sqlx::Error> {
        let query = format!(
            "UPDATE processing_jobs \
             SET status_id = $2, worker_id = $1, started_at = NOW(), completed_at = NULL, \
                 attempt = attempt + 1, progress_percent = 0 \
             WHERE id = ( \
                 SELECT id FROM processing_jobs \
                 WHERE status_id = $3 AND next_attempt_at <= NOW() \
                 ORDER BY next_attempt_at ASC, id ASC \
                 LIMIT 1 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             RETURNING {COLUMNS}"
        );

        let mut tx = pool.begin().await?;
        let job = sqlx::query_as::<_, ProcessingJob>(&query)
            .bind(worker_id)
            .bind(JobStatus::Processing.id())
            .bind(JobStatus::Pending.id())
            .fetch_optional(&mut *tx)
            .await?;

        if let Some(job) = &job {
            if tracks_video(job) {
                VideoRepo::set_processing_status_tx(&mut tx, job.video_id, ProcessingStatus::Processing)
                    .await?;
            }
        }
        tx.commit().await?;
        Ok(job)
    }

    // -----------------------------------------------------------------------
    // Attempt-scoped writes
    // -----------------------------------------------------------------------

    /// Record progress for the current attempt. Returns `false` when the
    /// attempt is no longer current.
    pub async fn update_progress(
        pool: &PgPool,
        job_id: DbId,
        attempt: i32,
        percent: i16,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE processing_jobs SET progress_percent = $3 \
             WHERE id = $1 AND attempt = $2 AND status_id = $4",
        )
        .bind(job_id)
        .bind(attempt)
        .bind(percent.clamp(0, 100))
        .bind(JobStatus::Processing.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Lock the job row if `attempt` is still the current PROCESSING
    /// generation.
    pub async fn lock_current_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        job_id: DbId,
        attempt: i32,
    ) -> Result<Option<ProcessingJob>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM processing_jobs \
             WHERE id = $1 AND attempt = $2 AND status_id = $3 \
             FOR UPDATE"
        );
        sqlx::query_as::<_, ProcessingJob>(&query)
            .bind(job_id)
            .bind(attempt)
            .bind(JobStatus::Processing.id())
            .fetch_optional(&mut **tx)
            .await
    }

    /// Mark a locked job COMPLETED inside an open transaction.
    pub async fn complete_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        job_id: DbId,
        result: &serde_json::Value,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE processing_jobs \
             SET status_id = $2, result_data = $3, completed_at = NOW(), \
                 progress_percent = 100, error_message = NULL \
             WHERE id = $1",
        )
        .bind(job_id)
        .bind(JobStatus::Completed.id())
        .bind(result)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Complete the current attempt with its result payload.
    ///
    /// Used by handlers that write nothing else; analysis results go through
    /// `DetectionRepo::persist_analysis` instead.
    pub async fn complete(
        pool: &PgPool,
        job_id: DbId,
        attempt: i32,
        result: &serde_json::Value,
    ) -> Result<bool, sqlx::Error> {
        let mut tx = pool.begin().await?;
        let Some(job) = Self::lock_current_tx(&mut tx, job_id, attempt).await? else {
            return Ok(false);
        };
        Self::complete_tx(&mut tx, job_id, result).await?;
        if tracks_video(&job) {
            sqlx::query(
                "UPDATE videos SET processing_status_id = $2, processed_at = NOW() WHERE id = $1",
            )
            .bind(job.video_id)
            .bind(ProcessingStatus::Completed.id())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(true)
    }

    /// Put the current attempt back to PENDING after a failure.
    ///
    /// The job becomes claimable again once `delay` has elapsed.
    pub async fn reschedule(
        pool: &PgPool,
        job_id: DbId,
        attempt: i32,
        retry_count: i32,
        error_message: &str,
        delay: Duration,
    ) -> Result<bool, sqlx::Error> {
        let query = format!(
            "UPDATE processing_jobs \
             SET status_id = $3, retry_count = $4, error_message = $5, \
                 next_attempt_at = NOW() + make_interval(secs => $6), worker_id = NULL \
             WHERE id = $1 AND attempt = $2 AND status_id = $7 \
             RETURNING {COLUMNS}"
        );

        let mut tx = pool.begin().await?;
        let job = sqlx::query_as::<_, ProcessingJob>(&query)
            .bind(job_id)
            .bind(attempt)
            .bind(JobStatus::Pending.id())
            .bind(retry_count)
            .bind(error_message)
            .bind(delay.as_secs_f64())
            .bind(JobStatus::Processing.id())
            .fetch_optional(&mut *tx)
            .await?;

        let Some(job) = job else {
            return Ok(false);
        };
        if tracks_video(&job) {
            VideoRepo::set_processing_status_tx(&mut tx, job.video_id, ProcessingStatus::Pending)
                .await?;
        }
        tx.commit().await?;
        Ok(true)
    }

    /// Finalize the current attempt as FAILED and pin the video to FAILED.
    pub async fn fail(
        pool: &PgPool,
        job_id: DbId,
        attempt: i32,
        retry_count: i32,
        error_message: &str,
    ) -> Result<bool, sqlx::Error> {
        let query = format!(
            "UPDATE processing_jobs \
             SET status_id = $3, retry_count = $4, error_message = $5, completed_at = NOW() \
             WHERE id = $1 AND attempt = $2 AND status_id = $6 \
             RETURNING {COLUMNS}"
        );

        let mut tx = pool.begin().await?;
        let job = sqlx::query_as::<_, ProcessingJob>(&query)
            .bind(job_id)
            .bind(attempt)
            .bind(JobStatus::Failed.id())
            .bind(retry_count)
            .bind(error_message)
            .bind(JobStatus::Processing.id())
            .fetch_optional(&mut *tx)
            .await?;

        let Some(job) = job else {
            return Ok(false);
        };
        if tracks_video(&job) {
            VideoRepo::set_processing_status_tx(&mut tx, job.video_id, ProcessingStatus::Failed)
                .await?;
        }
        tx.commit().await?;
        Ok(true)
    }

    // -----------------------------------------------------------------------
    // Cancellation
    // -----------------------------------------------------------------------

    /// Cancel a PENDING or PROCESSING job.
    ///
    /// The job ends FAILED with `cancelled_at` set, and `attempt` is bumped
    /// so a handler still running for it cannot commit. Returns `None` when
    /// the job is already terminal or does not exist.
    pub async fn cancel(
        pool: &PgPool,
        job_id: DbId,
        message: &str,
    ) -> Result<Option<ProcessingJob>, sqlx::Error> {
        let query = format!(
            "UPDATE processing_jobs \
             SET status_id = $2, error_message = $3, cancelled_at = NOW(), \
                 completed_at = NOW(), attempt = attempt + 1 \
             WHERE id = $1 AND status_id IN ($4, $5) \
             RETURNING {COLUMNS}"
        );

        let mut tx = pool.begin().await?;
        let job = sqlx::query_as::<_, ProcessingJob>(&query)
            .bind(job_id)
            .bind(JobStatus::Failed.id())
            .bind(message)
            .bind(JobStatus::Pending.id())
            .bind(JobStatus::Processing.id())
            .fetch_optional(&mut *tx)
            .await?;

        if let Some(job) = &job {
            if tracks_video(job) {
                sqlx::query(
                    "UPDATE videos SET processing_status_id = $2 \
                     WHERE id = $1 AND processing_status_id IN ($3, $4)",
                )
                .bind(job.video_id)
                .bind(ProcessingStatus::Failed.id())
                .bind(ProcessingStatus::Pending.id())
                .bind(ProcessingStatus::Processing.id())
                .execute(&mut *tx)
                .await?;
            }
        }
        tx.commit().await?;
        Ok(job)
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<ProcessingJob>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM processing_jobs WHERE id = $1");
        sqlx::query_as::<_, ProcessingJob>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// All jobs for a video, newest first.
    pub async fn list_by_video(
        pool: &PgPool,
        video_id: DbId,
    ) -> Result<Vec<ProcessingJob>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM processing_jobs WHERE video_id = $1 ORDER BY id DESC"
        );
        sqlx::query_as::<_, ProcessingJob>(&query)
            .bind(video_id)
            .fetch_all(pool)
            .await
    }

    // -----------------------------------------------------------------------
    // Maintenance
    // -----------------------------------------------------------------------

    /// Fail PROCESSING jobs whose attempt started more than `older_than` ago.
    ///
    /// Recovers jobs left behind by a crashed worker. Each reaped job
    /// consumes one retry and gets a new generation.
    pub async fn reap_stale(
        pool: &PgPool,
        older_than: Duration,
    ) -> Result<Vec<ProcessingJob>, sqlx::Error> {
        let query = format!(
            "UPDATE processing_jobs \
             SET status_id = $1, retry_count = retry_count + 1, attempt = attempt + 1, \
                 completed_at = NOW(), \
                 error_message = 'Failed after ' || (retry_count + 1) || \
                     ' attempts: worker stopped reporting before the time limit' \
             WHERE status_id = $2 AND started_at < NOW() - make_interval(secs => $3) \
             RETURNING {COLUMNS}"
        );

        let mut tx = pool.begin().await?;
        let reaped = sqlx::query_as::<_, ProcessingJob>(&query)
            .bind(JobStatus::Failed.id())
            .bind(JobStatus::Processing.id())
            .bind(older_than.as_secs_f64())
            .fetch_all(&mut *tx)
            .await?;

        let video_ids: Vec<DbId> = reaped
            .iter()
            .filter(|j| tracks_video(j))
            .map(|j| j.video_id)
            .collect();
        if !video_ids.is_empty() {
            sqlx::query("UPDATE videos SET processing_status_id = $2 WHERE id = ANY($1)")
                .bind(&video_ids)
                .bind(ProcessingStatus::Failed.id())
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(reaped)
    }

    /// Reset retryable FAILED jobs back to PENDING.
    ///
    /// A job qualifies when it has retries left, was not cancelled, failed
    /// within `window`, and is the newest job of its `(video_id, job_type)`
    /// with no active sibling.
    pub async fn retry_sweep(
        pool: &PgPool,
        max_retries: i32,
        window: Duration,
    ) -> Result<Vec<ProcessingJob>, sqlx::Error> {
        let query = format!(
            "UPDATE processing_jobs f \
             SET status_id = $1, next_attempt_at = NOW(), worker_id = NULL, \
                 completed_at = NULL, progress_percent = 0 \
             WHERE f.status_id = $2 \
               AND f.retry_count < $3 \
               AND f.cancelled_at IS NULL \
               AND f.updated_at >= NOW() - make_interval(secs => $4) \
               AND NOT EXISTS ( \
                   SELECT 1 FROM processing_jobs o \
                   WHERE o.video_id = f.video_id AND o.job_type = f.job_type \
                     AND o.id <> f.id AND (o.id > f.id OR o.status_id IN ($1, $5)) \
               ) \
             RETURNING {COLUMNS}"
        );

        let mut tx = pool.begin().await?;
        let reset = sqlx::query_as::<_, ProcessingJob>(&query)
            .bind(JobStatus::Pending.id())
            .bind(JobStatus::Failed.id())
            .bind(max_retries)
            .bind(window.as_secs_f64())
            .bind(JobStatus::Processing.id())
            .fetch_all(&mut *tx)
            .await?;

        let video_ids: Vec<DbId> = reset
            .iter()
            .filter(|j| tracks_video(j))
            .map(|j| j.video_id)
            .collect();
        if !video_ids.is_empty() {
            sqlx::query("UPDATE videos SET processing_status_id = $2 WHERE id = ANY($1)")
                .bind(&video_ids)
                .bind(ProcessingStatus::Pending.id())
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(reset)
    }

    /// Delete COMPLETED/FAILED jobs that finished more than `retention` ago.
    pub async fn cleanup(pool: &PgPool, retention: Duration) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM processing_jobs \
             WHERE status_id IN ($1, $2) \
               AND COALESCE(completed_at, updated_at) < NOW() - make_interval(secs => $3)",
        )
        .bind(JobStatus::Completed.id())
        .bind(JobStatus::Failed.id())
        .bind(retention.as_secs_f64())
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}

/// Whether this job's outcome drives `videos.processing_status_id`.
fn tracks_video(job: &ProcessingJob) -> bool {
    job.kind().is_ok_and(JobType::tracks_video_status)
}
