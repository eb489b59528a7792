//! Background job dispatcher.
//!
//! Polls the Job Store every `poll_interval` and runs claimed jobs on a
//! bounded pool of tokio tasks. Claims use `SELECT FOR UPDATE SKIP LOCKED`
//! via [`JobRepo::claim_next`], so any number of worker processes can poll
//! the same table.
//!
//! Each attempt runs in its own task under the hard timeout. When the
//! timeout fires the task is aborted and the slot is reclaimed; anything
//! the abandoned attempt still tries to commit is discarded by the
//! attempt-generation check in the repositories.

use std::sync::Arc;
use std::time::Duration;

use roadwatch_core::job::{decide_failure, FailureDecision};
use roadwatch_core::retry::RetryPolicy;
use roadwatch_core::types::DbId;
use roadwatch_db::models::job::ProcessingJob;
use roadwatch_db::repositories::JobRepo;
use roadwatch_db::DbPool;
use roadwatch_events::Notifier;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::WorkerConfig;
use crate::error::JobError;
use crate::handlers::{HandlerOutcome, JobHandlers};

/// Background job dispatcher.
pub struct JobDispatcher {
    pool: DbPool,
    handlers: Arc<JobHandlers>,
    notifier: Notifier,
    worker_id: String,
    concurrency: usize,
    poll_interval: Duration,
    hard_timeout: Duration,
    retry: RetryPolicy,
}

impl JobDispatcher {
    pub fn new(
        pool: DbPool,
        handlers: Arc<JobHandlers>,
        notifier: Notifier,
        worker_id: impl Into<String>,
        config: &WorkerConfig,
    ) -> Self {
        Self {
            pool,
            handlers,
            notifier,
            worker_id: worker_id.into(),
            concurrency: config.concurrency.max(1),
            poll_interval: config.poll_interval,
            hard_timeout: config.hard_timeout,
            retry: config.retry.clone(),
        }
    }

    /// Run the dispatcher loop until the cancellation token is triggered,
    /// then wait for in-flight jobs to finish.
    pub async fn run(&self, cancel: CancellationToken) {
        let slots = Arc::new(Semaphore::new(self.concurrency));
        let mut running = JoinSet::new();
        let mut ticker = tokio::time::interval(self.poll_interval);

        tracing::info!(
            worker_id = %self.worker_id,
            concurrency = self.concurrency,
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            hard_timeout_secs = self.hard_timeout.as_secs(),
            "Job dispatcher started",
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!(in_flight = running.len(), "Job dispatcher shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    while let Some(joined) = running.try_join_next() {
                        if let Err(e) = joined {
                            tracing::error!(error = %e, "Job task ended abnormally");
                        }
                    }
                    if let Err(e) = self.fill_slots(&slots, &mut running).await {
                        tracing::error!(error = %e, "Dispatch cycle failed");
                    }
                }
            }
        }

        while running.join_next().await.is_some() {}
    }

    /// Claim jobs while there are free slots.
    async fn fill_slots(
        &self,
        slots: &Arc<Semaphore>,
        running: &mut JoinSet<()>,
    ) -> Result<(), sqlx::Error> {
        while let Ok(permit) = Arc::clone(slots).try_acquire_owned() {
            let Some(job) = JobRepo::claim_next(&self.pool, &self.worker_id).await? else {
                break;
            };

            tracing::info!(
                job_id = job.id,
                video_id = job.video_id,
                job_type = %job.job_type,
                attempt = job.attempt,
                retry_count = job.retry_count,
                worker_id = %self.worker_id,
                "Job claimed",
            );

            let runner = AttemptRunner {
                pool: self.pool.clone(),
                handlers: Arc::clone(&self.handlers),
                notifier: self.notifier.clone(),
                hard_timeout: self.hard_timeout,
                retry: self.retry.clone(),
            };
            running.spawn(async move {
                runner.run(job).await;
                drop(permit);
            });
        }
        Ok(())
    }

    /// Claim and run at most one due job, waiting for it to finish.
    ///
    /// Returns the claimed job id. Used by tests and one-shot tooling.
    pub async fn run_once(&self) -> Result<Option<DbId>, sqlx::Error> {
        let Some(job) = JobRepo::claim_next(&self.pool, &self.worker_id).await? else {
            return Ok(None);
        };
        let id = job.id;
        AttemptRunner {
            pool: self.pool.clone(),
            handlers: Arc::clone(&self.handlers),
            notifier: self.notifier.clone(),
            hard_timeout: self.hard_timeout,
            retry: self.retry.clone(),
        }
        .run(job)
        .await;
        Ok(Some(id))
    }
}

// ---------------------------------------------------------------------------
// One attempt
// ---------------------------------------------------------------------------

struct AttemptRunner {
    pool: DbPool,
    handlers: Arc<JobHandlers>,
    notifier: Notifier,
    hard_timeout: Duration,
    retry: RetryPolicy,
}

impl AttemptRunner {
    async fn run(self, job: ProcessingJob) {
        let task = {
            let pool = self.pool.clone();
            let handlers = Arc::clone(&self.handlers);
            let job = job.clone();
            tokio::spawn(async move { handlers.execute(&pool, &job).await })
        };
        let abort = task.abort_handle();

        let outcome = match tokio::time::timeout(self.hard_timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(JobError::Panicked(join_err.to_string())),
            Err(_) => {
                abort.abort();
                Err(JobError::HardTimeout(self.hard_timeout))
            }
        };

        match outcome {
            Ok(HandlerOutcome::Completed(result)) => {
                tracing::info!(job_id = job.id, video_id = job.video_id, "Job completed");
                if tracks_video(&job) {
                    self.notifier.processing_completed(&job, &result);
                }
            }
            Ok(HandlerOutcome::Superseded) => {
                tracing::warn!(
                    job_id = job.id,
                    attempt = job.attempt,
                    "Job attempt was superseded while running; result discarded",
                );
            }
            Err(e) => self.record_failure(&job, &e).await,
        }
    }

    async fn record_failure(&self, job: &ProcessingJob, error: &JobError) {
        let decision = decide_failure(job.retry_count, self.retry.max_retries, &error.to_string());
        let hard_timeout = matches!(error, JobError::HardTimeout(_));

        let recorded = match &decision {
            FailureDecision::Reschedule {
                retry_count,
                message,
            } if !hard_timeout => {
                let delay = self.retry.delay_for_attempt(*retry_count);
                tracing::warn!(
                    job_id = job.id,
                    retry_count,
                    delay_secs = delay.as_secs(),
                    error = %error,
                    "Job failed, rescheduling",
                );
                JobRepo::reschedule(&self.pool, job.id, job.attempt, *retry_count, message, delay)
                    .await
            }
            // A hard timeout always ends the attempt as FAILED; the retry
            // sweep may revive it while retries remain.
            _ => {
                tracing::error!(
                    job_id = job.id,
                    retry_count = decision.retry_count(),
                    error = %error,
                    "Job failed",
                );
                JobRepo::fail(
                    &self.pool,
                    job.id,
                    job.attempt,
                    decision.retry_count(),
                    decision.message(),
                )
                .await
            }
        };

        match recorded {
            Ok(true) => {
                let terminal = hard_timeout || matches!(decision, FailureDecision::Terminal { .. });
                if terminal && tracks_video(job) {
                    self.notifier.processing_failed(job, decision.message());
                }
            }
            Ok(false) => {
                tracing::warn!(
                    job_id = job.id,
                    attempt = job.attempt,
                    "Failure of a superseded attempt ignored",
                );
            }
            Err(e) => {
                tracing::error!(job_id = job.id, error = %e, "Failed to record job failure");
            }
        }
    }
}

fn tracks_video(job: &ProcessingJob) -> bool {
    job.kind().is_ok_and(|t| t.tracks_video_status())
}
