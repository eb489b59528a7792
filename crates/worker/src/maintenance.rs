//! Periodic Job Store maintenance.
//!
//! Two long-running loops, each spawned with `tokio::spawn` and stopped by
//! a [`CancellationToken`]:
//!
//! - [`run_retry_sweep`]: reaps PROCESSING jobs abandoned by a crashed
//!   worker, then resets retryable FAILED jobs to PENDING (hourly).
//! - [`run_cleanup`]: deletes terminal jobs past the retention window
//!   (daily).

use std::time::Duration;

use roadwatch_db::repositories::JobRepo;
use roadwatch_db::DbPool;
use tokio_util::sync::CancellationToken;

use crate::config::WorkerConfig;

/// Counts from one retry sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub reaped: usize,
    pub reset: usize,
}

/// One retry sweep pass.
pub async fn retry_sweep_once(
    pool: &DbPool,
    config: &WorkerConfig,
) -> Result<SweepReport, sqlx::Error> {
    let reaped = JobRepo::reap_stale(pool, config.stale_after()).await?;
    for job in &reaped {
        tracing::warn!(
            job_id = job.id,
            video_id = job.video_id,
            worker_id = ?job.worker_id,
            retry_count = job.retry_count,
            "Reaped abandoned job",
        );
    }

    let reset = JobRepo::retry_sweep(pool, config.retry.max_retries, config.retry_window).await?;
    for job in &reset {
        tracing::info!(
            job_id = job.id,
            video_id = job.video_id,
            retry_count = job.retry_count,
            "Failed job reset to pending",
        );
    }

    Ok(SweepReport {
        reaped: reaped.len(),
        reset: reset.len(),
    })
}

/// Run the retry sweep loop until `cancel` is triggered.
pub async fn run_retry_sweep(pool: DbPool, config: WorkerConfig, cancel: CancellationToken) {
    tracing::info!(
        interval_secs = config.retry_sweep_interval.as_secs(),
        window_hours = config.retry_window.as_secs() / 3600,
        max_retries = config.retry.max_retries,
        "Retry sweep started",
    );

    let mut interval = tokio::time::interval(config.retry_sweep_interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Retry sweep stopping");
                break;
            }
            _ = interval.tick() => {
                match retry_sweep_once(&pool, &config).await {
                    Ok(report) if report == SweepReport::default() => {
                        tracing::debug!("Retry sweep: nothing to do");
                    }
                    Ok(report) => {
                        tracing::info!(reaped = report.reaped, reset = report.reset, "Retry sweep finished");
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Retry sweep failed");
                    }
                }
            }
        }
    }
}

/// Run the cleanup loop until `cancel` is triggered.
pub async fn run_cleanup(pool: DbPool, retention: Duration, every: Duration, cancel: CancellationToken) {
    tracing::info!(
        retention_days = retention.as_secs() / 86_400,
        interval_secs = every.as_secs(),
        "Job cleanup started",
    );

    let mut interval = tokio::time::interval(every);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Job cleanup stopping");
                break;
            }
            _ = interval.tick() => {
                match JobRepo::cleanup(&pool, retention).await {
                    Ok(deleted) if deleted > 0 => {
                        tracing::info!(deleted, "Job cleanup: purged old jobs");
                    }
                    Ok(_) => {
                        tracing::debug!("Job cleanup: no jobs to purge");
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Job cleanup failed");
                    }
                }
            }
        }
    }
}
