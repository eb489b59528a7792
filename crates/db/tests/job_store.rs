//! Job Store behaviour: idempotent enqueue, claims, generations, retries
//! and maintenance sweeps.

mod common;

use std::time::Duration;

use roadwatch_core::job::{decide_failure, FailureDecision, JobType, CANCELLED_MESSAGE};
use roadwatch_db::models::status::{JobStatus, ProcessingStatus};
use roadwatch_db::repositories::{JobRepo, VideoRepo};
use sqlx::PgPool;

use common::{claimed_analysis, seed_video};

const MAX_RETRIES: i32 = 3;

#[sqlx::test(migrations = "../../db/migrations")]
async fn enqueue_is_idempotent_while_active(pool: PgPool) {
    let video = seed_video(&pool, "vid-idem").await;

    let first = JobRepo::enqueue(&pool, video.id, JobType::AiAnalysis).await.unwrap();
    let second = JobRepo::enqueue(&pool, video.id, JobType::AiAnalysis).await.unwrap();

    assert!(first.created);
    assert!(!second.created);
    assert_eq!(first.job.id, second.job.id);

    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM processing_jobs WHERE video_id = $1")
        .bind(video.id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(rows, 1);

    // Still idempotent once the job is PROCESSING.
    let claimed = JobRepo::claim_next(&pool, "w1").await.unwrap().unwrap();
    assert_eq!(claimed.id, first.job.id);
    let third = JobRepo::enqueue(&pool, video.id, JobType::AiAnalysis).await.unwrap();
    assert_eq!(third.job.id, first.job.id);
    assert_eq!(third.job.status_id, JobStatus::Processing.id());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn concurrent_enqueue_creates_one_job(pool: PgPool) {
    let video = seed_video(&pool, "vid-race").await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let pool = pool.clone();
        handles.push(tokio::spawn(async move {
            JobRepo::enqueue(&pool, video.id, JobType::AiAnalysis).await.unwrap()
        }));
    }

    let mut ids = Vec::new();
    for h in handles {
        ids.push(h.await.unwrap().job.id);
    }
    ids.dedup();
    assert_eq!(ids.len(), 1, "all callers must see the same job");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn different_job_types_do_not_conflict(pool: PgPool) {
    let video = seed_video(&pool, "vid-types").await;

    let analysis = JobRepo::enqueue(&pool, video.id, JobType::AiAnalysis).await.unwrap();
    let thumb = JobRepo::enqueue(&pool, video.id, JobType::Thumbnail).await.unwrap();

    assert!(analysis.created && thumb.created);
    assert_ne!(analysis.job.id, thumb.job.id);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn enqueue_after_completion_creates_new_job(pool: PgPool) {
    let video = seed_video(&pool, "vid-again").await;
    let job = claimed_analysis(&pool, video.id).await;
    assert!(JobRepo::complete(&pool, job.id, job.attempt, &serde_json::json!({})).await.unwrap());

    let again = JobRepo::enqueue(&pool, video.id, JobType::AiAnalysis).await.unwrap();
    assert!(again.created);
    assert_ne!(again.job.id, job.id);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn enqueue_resets_failed_video_to_pending(pool: PgPool) {
    let video = seed_video(&pool, "vid-reset").await;
    let job = claimed_analysis(&pool, video.id).await;
    JobRepo::fail(&pool, job.id, job.attempt, 3, "Failed after 3 attempts: boom")
        .await
        .unwrap();

    let failed = VideoRepo::find_by_id(&pool, video.id).await.unwrap().unwrap();
    assert_eq!(failed.processing_status_id, ProcessingStatus::Failed.id());

    JobRepo::enqueue(&pool, video.id, JobType::AiAnalysis).await.unwrap();
    let reset = VideoRepo::find_by_id(&pool, video.id).await.unwrap().unwrap();
    assert_eq!(reset.processing_status_id, ProcessingStatus::Pending.id());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn claim_next_hands_each_job_to_one_worker(pool: PgPool) {
    for i in 0..3 {
        let video = seed_video(&pool, &format!("vid-claim-{i}")).await;
        JobRepo::enqueue(&pool, video.id, JobType::AiAnalysis).await.unwrap();
    }

    let mut handles = Vec::new();
    for w in 0..6 {
        let pool = pool.clone();
        handles.push(tokio::spawn(async move {
            JobRepo::claim_next(&pool, &format!("w{w}")).await.unwrap()
        }));
    }

    let mut claimed: Vec<i64> = Vec::new();
    for h in handles {
        if let Some(job) = h.await.unwrap() {
            assert_eq!(job.status_id, JobStatus::Processing.id());
            assert_eq!(job.attempt, 1);
            assert!(job.started_at.is_some());
            claimed.push(job.id);
        }
    }
    claimed.sort_unstable();
    let before = claimed.len();
    claimed.dedup();
    assert_eq!(claimed.len(), before, "a job was claimed twice");
    assert_eq!(claimed.len(), 3);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn claim_marks_analysed_video_processing(pool: PgPool) {
    let video = seed_video(&pool, "vid-proc").await;
    claimed_analysis(&pool, video.id).await;

    let video = VideoRepo::find_by_id(&pool, video.id).await.unwrap().unwrap();
    assert_eq!(video.processing_status_id, ProcessingStatus::Processing.id());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn rescheduled_job_waits_for_backoff(pool: PgPool) {
    let video = seed_video(&pool, "vid-backoff").await;
    let job = claimed_analysis(&pool, video.id).await;

    let decision = decide_failure(job.retry_count, MAX_RETRIES, "inference backend unavailable");
    let FailureDecision::Reschedule { retry_count, message } = decision else {
        panic!("first failure should reschedule");
    };
    assert!(JobRepo::reschedule(&pool, job.id, job.attempt, retry_count, &message, Duration::from_secs(300))
        .await
        .unwrap());

    let stored = JobRepo::find_by_id(&pool, job.id).await.unwrap().unwrap();
    assert_eq!(stored.status_id, JobStatus::Pending.id());
    assert_eq!(stored.retry_count, 1);
    assert_eq!(stored.error_message.as_deref(), Some("Retry 1: inference backend unavailable"));

    // Not due yet.
    assert!(JobRepo::claim_next(&pool, "w1").await.unwrap().is_none());

    sqlx::query("UPDATE processing_jobs SET next_attempt_at = NOW() - INTERVAL '1 second' WHERE id = $1")
        .bind(job.id)
        .execute(&pool)
        .await
        .unwrap();
    let reclaimed = JobRepo::claim_next(&pool, "w1").await.unwrap().unwrap();
    assert_eq!(reclaimed.id, job.id);
    assert_eq!(reclaimed.attempt, job.attempt + 1);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn stale_attempt_writes_are_discarded(pool: PgPool) {
    let video = seed_video(&pool, "vid-stale").await;
    let job = claimed_analysis(&pool, video.id).await;

    // Hard timeout fires: the orchestrator fails the attempt.
    assert!(JobRepo::fail(&pool, job.id, job.attempt, 1, "timed out").await.unwrap());

    // The abandoned handler returns later and tries to write.
    assert!(!JobRepo::update_progress(&pool, job.id, job.attempt, 80).await.unwrap());
    assert!(!JobRepo::complete(&pool, job.id, job.attempt, &serde_json::json!({"late": true}))
        .await
        .unwrap());

    let stored = JobRepo::find_by_id(&pool, job.id).await.unwrap().unwrap();
    assert_eq!(stored.status_id, JobStatus::Failed.id());
    assert!(stored.result_data.is_none());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn cancel_fails_job_and_blocks_running_attempt(pool: PgPool) {
    let video = seed_video(&pool, "vid-cancel").await;
    let job = claimed_analysis(&pool, video.id).await;

    let cancelled = JobRepo::cancel(&pool, job.id, CANCELLED_MESSAGE).await.unwrap().unwrap();
    assert_eq!(cancelled.status_id, JobStatus::Failed.id());
    assert_eq!(cancelled.error_message.as_deref(), Some(CANCELLED_MESSAGE));
    assert!(cancelled.cancelled_at.is_some());

    assert!(!JobRepo::complete(&pool, job.id, job.attempt, &serde_json::json!({}))
        .await
        .unwrap());

    // Already terminal.
    assert!(JobRepo::cancel(&pool, job.id, CANCELLED_MESSAGE).await.unwrap().is_none());

    // Never revived by the sweep.
    let reset = JobRepo::retry_sweep(&pool, MAX_RETRIES, Duration::from_secs(86_400))
        .await
        .unwrap();
    assert!(reset.is_empty());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn job_failing_max_times_stays_failed_after_sweep(pool: PgPool) {
    let video = seed_video(&pool, "vid-terminal").await;
    let enqueued = JobRepo::enqueue(&pool, video.id, JobType::AiAnalysis).await.unwrap();

    let mut job_id = enqueued.job.id;
    for _ in 0..MAX_RETRIES {
        sqlx::query("UPDATE processing_jobs SET next_attempt_at = NOW() WHERE id = $1")
            .bind(job_id)
            .execute(&pool)
            .await
            .unwrap();
        let job = JobRepo::claim_next(&pool, "w1").await.unwrap().unwrap();
        job_id = job.id;
        match decide_failure(job.retry_count, MAX_RETRIES, "source unreadable") {
            FailureDecision::Reschedule { retry_count, message } => {
                JobRepo::reschedule(&pool, job.id, job.attempt, retry_count, &message, Duration::ZERO)
                    .await
                    .unwrap();
            }
            FailureDecision::Terminal { retry_count, message } => {
                JobRepo::fail(&pool, job.id, job.attempt, retry_count, &message)
                    .await
                    .unwrap();
            }
        }
    }

    let stored = JobRepo::find_by_id(&pool, job_id).await.unwrap().unwrap();
    assert_eq!(stored.status_id, JobStatus::Failed.id());
    assert_eq!(stored.retry_count, 3);
    assert_eq!(
        stored.error_message.as_deref(),
        Some("Failed after 3 attempts: source unreadable")
    );
    assert!(stored.completed_at.is_some());

    let reset = JobRepo::retry_sweep(&pool, MAX_RETRIES, Duration::from_secs(86_400))
        .await
        .unwrap();
    assert!(reset.is_empty());

    let video = VideoRepo::find_by_id(&pool, video.id).await.unwrap().unwrap();
    assert_eq!(video.processing_status_id, ProcessingStatus::Failed.id());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn retry_sweep_revives_retryable_failures_in_window(pool: PgPool) {
    let recent = seed_video(&pool, "vid-recent").await;
    let old = seed_video(&pool, "vid-old").await;

    let recent_job = claimed_analysis(&pool, recent.id).await;
    JobRepo::fail(&pool, recent_job.id, recent_job.attempt, 1, "timed out").await.unwrap();
    let old_job = claimed_analysis(&pool, old.id).await;
    JobRepo::fail(&pool, old_job.id, old_job.attempt, 1, "timed out").await.unwrap();

    // The trigger stamps updated_at on every UPDATE, so disable it to age the row.
    sqlx::query("ALTER TABLE processing_jobs DISABLE TRIGGER set_updated_at")
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query("UPDATE processing_jobs SET updated_at = NOW() - INTERVAL '2 days' WHERE id = $1")
        .bind(old_job.id)
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query("ALTER TABLE processing_jobs ENABLE TRIGGER set_updated_at")
        .execute(&pool)
        .await
        .unwrap();

    let reset = JobRepo::retry_sweep(&pool, MAX_RETRIES, Duration::from_secs(24 * 3600))
        .await
        .unwrap();
    let ids: Vec<i64> = reset.iter().map(|j| j.id).collect();
    assert_eq!(ids, vec![recent_job.id]);

    let revived = VideoRepo::find_by_id(&pool, recent.id).await.unwrap().unwrap();
    assert_eq!(revived.processing_status_id, ProcessingStatus::Pending.id());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn retry_sweep_skips_failures_superseded_by_newer_job(pool: PgPool) {
    let video = seed_video(&pool, "vid-superseded").await;
    let failed = claimed_analysis(&pool, video.id).await;
    JobRepo::fail(&pool, failed.id, failed.attempt, 1, "timed out").await.unwrap();

    let newer = JobRepo::enqueue(&pool, video.id, JobType::AiAnalysis).await.unwrap();
    assert!(newer.created);

    let reset = JobRepo::retry_sweep(&pool, MAX_RETRIES, Duration::from_secs(86_400))
        .await
        .unwrap();
    assert!(reset.is_empty());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn reap_stale_fails_abandoned_processing_jobs(pool: PgPool) {
    let video = seed_video(&pool, "vid-reap").await;
    let job = claimed_analysis(&pool, video.id).await;

    sqlx::query("UPDATE processing_jobs SET started_at = NOW() - INTERVAL '1 hour' WHERE id = $1")
        .bind(job.id)
        .execute(&pool)
        .await
        .unwrap();

    let reaped = JobRepo::reap_stale(&pool, Duration::from_secs(900)).await.unwrap();
    assert_eq!(reaped.len(), 1);
    assert_eq!(reaped[0].retry_count, 1);
    assert_eq!(reaped[0].status_id, JobStatus::Failed.id());
    assert!(reaped[0]
        .error_message
        .as_deref()
        .is_some_and(|m| m.starts_with("Failed after 1 attempts")));

    // The late handler can no longer commit.
    assert!(!JobRepo::complete(&pool, job.id, job.attempt, &serde_json::json!({}))
        .await
        .unwrap());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn cleanup_deletes_only_old_terminal_jobs(pool: PgPool) {
    let video = seed_video(&pool, "vid-cleanup").await;
    let done = claimed_analysis(&pool, video.id).await;
    JobRepo::complete(&pool, done.id, done.attempt, &serde_json::json!({})).await.unwrap();
    let pending = JobRepo::enqueue(&pool, video.id, JobType::Thumbnail).await.unwrap();

    sqlx::query("UPDATE processing_jobs SET completed_at = NOW() - INTERVAL '31 days' WHERE id = $1")
        .bind(done.id)
        .execute(&pool)
        .await
        .unwrap();

    let deleted = JobRepo::cleanup(&pool, Duration::from_secs(30 * 86_400)).await.unwrap();
    assert_eq!(deleted, 1);
    assert!(JobRepo::find_by_id(&pool, done.id).await.unwrap().is_none());
    assert!(JobRepo::find_by_id(&pool, pending.job.id).await.unwrap().is_some());
}
