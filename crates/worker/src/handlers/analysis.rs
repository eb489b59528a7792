//! AI_ANALYSIS: run the detection engine over the video and persist the
//! result for the current attempt.

use std::time::Duration;

use roadwatch_core::error::CoreError;
use roadwatch_core::types::DbId;
use roadwatch_db::models::job::ProcessingJob;
use roadwatch_db::repositories::{JobRepo, VideoRepo};
use roadwatch_db::DbPool;
use roadwatch_detection::{DetectionEngine, VideoHandle};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::JobError;
use crate::handlers::HandlerOutcome;

pub async fn run(
    pool: &DbPool,
    engine: &DetectionEngine,
    job: &ProcessingJob,
    timeout: Duration,
) -> Result<HandlerOutcome, JobError> {
    let video = VideoRepo::find_by_id(pool, job.video_id)
        .await?
        .ok_or(CoreError::NotFound {
            entity: "Video",
            id: job.video_id,
        })?;
    let handle = VideoHandle {
        video_id: video.id,
        stream_url: video.stream_url,
    };

    let (tx, rx) = watch::channel(0u8);
    let reporter = tokio::spawn(report_progress(pool.clone(), job.id, job.attempt, rx));

    let analysis = engine.analyze_with_progress(&handle, timeout, Some(tx)).await;
    // The sender is dropped with the analysis future, which ends the reporter.
    join_reporter(job.id, reporter).await;
    let result = analysis?;

    tracing::info!(
        job_id = job.id,
        video_id = job.video_id,
        vehicles = result.total_vehicles(),
        plates = result.license_plates.len(),
        violations = result.violations.len(),
        frames_analyzed = result.stats.frames_analyzed,
        "Analysis finished, persisting",
    );

    Ok(match roadwatch_pipeline::persist_analysis(pool, job, &result).await? {
        Some(persisted) => HandlerOutcome::Completed(persisted.result_data),
        None => HandlerOutcome::Superseded,
    })
}

/// Forward engine progress to the job row until the engine drops its sender.
async fn report_progress(pool: DbPool, job_id: DbId, attempt: i32, mut rx: watch::Receiver<u8>) {
    while rx.changed().await.is_ok() {
        let percent = *rx.borrow_and_update();
        match JobRepo::update_progress(&pool, job_id, attempt, i16::from(percent)).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(job_id, attempt, "Progress for a retired attempt ignored");
                return;
            }
            Err(e) => {
                tracing::warn!(job_id, error = %e, "Failed to record job progress");
            }
        }
    }
}

/// Wait for the progress reporter. Returns `false` if it panicked or was
/// aborted.
async fn join_reporter(job_id: DbId, reporter: JoinHandle<()>) -> bool {
    match reporter.await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(job_id, error = %e, "Progress reporter ended abnormally");
            false
        }
    }
}
