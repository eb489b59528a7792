//! Processing job types, status ids and failure bookkeeping.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Job type
// ---------------------------------------------------------------------------

/// Kind of background work performed against one video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobType {
    Upload,
    AiAnalysis,
    Thumbnail,
}

impl JobType {
    /// Stable text form stored in `processing_jobs.job_type`.
    pub fn as_str(self) -> &'static str {
        match self {
            JobType::Upload => "UPLOAD",
            JobType::AiAnalysis => "AI_ANALYSIS",
            JobType::Thumbnail => "THUMBNAIL",
        }
    }

    /// Whether this job's outcome drives `videos.processing_status`.
    pub fn tracks_video_status(self) -> bool {
        matches!(self, JobType::AiAnalysis)
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "UPLOAD" => Ok(JobType::Upload),
            "AI_ANALYSIS" => Ok(JobType::AiAnalysis),
            "THUMBNAIL" => Ok(JobType::Thumbnail),
            other => Err(CoreError::Validation(format!(
                "Unknown job type '{other}'. Must be one of: UPLOAD, AI_ANALYSIS, THUMBNAIL"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Status ids
// ---------------------------------------------------------------------------

/// Job status IDs matching `job_statuses` seed data (1-based SMALLSERIAL).
///
/// Duplicated from the `db` crate's `JobStatus` enum because `core` must
/// have zero internal deps.
pub mod status {
    pub const PENDING: i16 = 1;
    pub const PROCESSING: i16 = 2;
    pub const COMPLETED: i16 = 3;
    pub const FAILED: i16 = 4;

    /// Human-readable name for a status ID.
    pub fn status_name(id: i16) -> &'static str {
        match id {
            PENDING => "PENDING",
            PROCESSING => "PROCESSING",
            COMPLETED => "COMPLETED",
            FAILED => "FAILED",
            _ => "UNKNOWN",
        }
    }
}

// ---------------------------------------------------------------------------
// Failure bookkeeping
// ---------------------------------------------------------------------------

/// Default number of attempts before a job failure becomes terminal.
pub const DEFAULT_MAX_RETRIES: i32 = 3;

/// Error text stored on a job cancelled through the API.
pub const CANCELLED_MESSAGE: &str = "Job cancelled by user";

/// What the orchestrator does with a job after one failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureDecision {
    /// Put the job back to PENDING for another attempt.
    Reschedule { retry_count: i32, message: String },
    /// Finalize as FAILED; the video is pinned to FAILED as well.
    Terminal { retry_count: i32, message: String },
}

impl FailureDecision {
    pub fn retry_count(&self) -> i32 {
        match self {
            FailureDecision::Reschedule { retry_count, .. }
            | FailureDecision::Terminal { retry_count, .. } => *retry_count,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            FailureDecision::Reschedule { message, .. }
            | FailureDecision::Terminal { message, .. } => message,
        }
    }
}

/// Decide how to record a failed attempt.
///
/// `retry_count` is the value stored before this attempt. Every failure
/// consumes one attempt regardless of its cause.
pub fn decide_failure(retry_count: i32, max_retries: i32, error: &str) -> FailureDecision {
    let next = retry_count.saturating_add(1);
    if next < max_retries {
        FailureDecision::Reschedule {
            retry_count: next,
            message: format!("Retry {next}: {error}"),
        }
    } else {
        FailureDecision::Terminal {
            retry_count: next,
            message: format!("Failed after {next} attempts: {error}"),
        }
    }
}
