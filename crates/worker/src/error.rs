use std::time::Duration;

use roadwatch_core::error::CoreError;
use roadwatch_core::job::JobType;
use roadwatch_detection::EngineError;
use roadwatch_pipeline::PipelineError;

/// Why one job attempt failed.
///
/// Every variant consumes one retry; the orchestrator does not classify
/// causes as permanent.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("unsupported job type: {0}")]
    Unsupported(JobType),

    #[error("Job exceeded hard timeout of {0:?}")]
    HardTimeout(Duration),

    #[error("Job handler panicked: {0}")]
    Panicked(String),
}
