//! Per-type job handlers.
//!
//! | job type      | handler                                   |
//! |---------------|-------------------------------------------|
//! | `AI_ANALYSIS` | detection engine + detection persistence  |
//! | `THUMBNAIL`   | storage collaborator, URL stored on video |
//! | `UPLOAD`      | none; owned by the upload subsystem       |
//!
//! A handler commits its own success (conditioned on the attempt still
//! being current). Failures are returned to the dispatcher, which owns the
//! retry decision.

pub mod analysis;
pub mod thumbnail;

use std::sync::Arc;
use std::time::Duration;

use roadwatch_core::job::JobType;
use roadwatch_db::models::job::ProcessingJob;
use roadwatch_db::DbPool;
use roadwatch_detection::DetectionEngine;

use crate::error::JobError;
use thumbnail::StorageClient;

/// Result of a handler that did not fail.
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerOutcome {
    /// The attempt committed with this `result_data`.
    Completed(serde_json::Value),
    /// The attempt was retired while running; nothing was written.
    Superseded,
}

/// Everything the handlers need, shared across concurrent jobs.
pub struct JobHandlers {
    engine: Arc<DetectionEngine>,
    storage: Arc<dyn StorageClient>,
    analysis_timeout: Duration,
}

impl JobHandlers {
    pub fn new(
        engine: Arc<DetectionEngine>,
        storage: Arc<dyn StorageClient>,
        analysis_timeout: Duration,
    ) -> Self {
        Self {
            engine,
            storage,
            analysis_timeout,
        }
    }

    /// Run the handler for a claimed job.
    pub async fn execute(
        &self,
        pool: &DbPool,
        job: &ProcessingJob,
    ) -> Result<HandlerOutcome, JobError> {
        match job.kind()? {
            JobType::AiAnalysis => {
                analysis::run(pool, &self.engine, job, self.analysis_timeout).await
            }
            JobType::Thumbnail => thumbnail::run(pool, self.storage.as_ref(), job).await,
            JobType::Upload => Err(JobError::Unsupported(JobType::Upload)),
        }
    }
}
