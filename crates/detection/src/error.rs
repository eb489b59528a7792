use std::time::Duration;

use roadwatch_core::ffmpeg::FfmpegError;

/// Errors surfaced by the detection engine.
///
/// All of them are retryable from the orchestrator's point of view; the
/// engine never decides retry policy itself.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The video stream could not be opened or stopped mid-read.
    #[error("Video source unreadable: {0}")]
    SourceUnreadable(String),

    /// The caller-supplied analysis budget elapsed.
    #[error("Analysis timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    /// The detection capability itself failed.
    #[error("Inference backend error: {0}")]
    InferenceBackend(String),

    /// The detection capability failed its readiness check.
    #[error("Detection model not ready: {0}")]
    ModelNotReady(String),
}

impl From<FfmpegError> for EngineError {
    fn from(err: FfmpegError) -> Self {
        EngineError::SourceUnreadable(err.to_string())
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        EngineError::InferenceBackend(err.to_string())
    }
}
