//! Detection rows and their typed payload boundary.

use roadwatch_core::detection::{DetectionPayload, DetectionType};
use roadwatch_core::error::CoreError;
use roadwatch_core::review::ReviewAction;
use roadwatch_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::status::StatusId;

/// A row from the `detections` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Detection {
    pub id: DbId,
    pub video_id: DbId,
    pub job_id: Option<DbId>,
    pub detection_type: String,
    pub frame_timestamp: f64,
    pub confidence_score: f64,
    pub detection_data: serde_json::Value,
    pub violation_id: Option<DbId>,
    pub reviewed: bool,
    pub review_status_id: StatusId,
    pub reviewed_by: Option<DbId>,
    pub reviewed_at: Option<Timestamp>,
    pub review_notes: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Detection {
    pub fn kind(&self) -> Result<DetectionType, CoreError> {
        self.detection_type.parse()
    }

    /// Decode the stored JSON blob into the payload for this row's type.
    pub fn payload(&self) -> Result<DetectionPayload, CoreError> {
        DetectionPayload::decode(self.kind()?, &self.detection_data)
    }
}

/// One row to insert for an analysis run.
#[derive(Debug, Clone)]
pub struct NewDetection {
    pub detection_type: DetectionType,
    pub frame_timestamp: f64,
    pub confidence_score: f64,
    pub detection_data: serde_json::Value,
}

impl NewDetection {
    pub fn from_payload(
        payload: &DetectionPayload,
        frame_timestamp: f64,
        confidence_score: f64,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            detection_type: payload.kind(),
            frame_timestamp,
            confidence_score,
            detection_data: serde_json::to_value(payload)?,
        })
    }
}

/// Query parameters for `GET /api/v1/videos/{id}/detections`.
#[derive(Debug, Default, Deserialize)]
pub struct DetectionListQuery {
    pub detection_type: Option<DetectionType>,
    pub min_confidence: Option<f64>,
}

/// Query parameters for `GET /api/v1/detections/pending`.
#[derive(Debug, Default, Deserialize)]
pub struct PendingDetectionQuery {
    pub camera_id: Option<String>,
    pub detection_type: Option<DetectionType>,
    /// Matches `detection_data->>'violation_type'`.
    pub violation_type: Option<String>,
    pub min_confidence: Option<f64>,
    pub date_from: Option<Timestamp>,
    pub date_to: Option<Timestamp>,
    /// Defaults to 20, capped at 100.
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// A page of pending detections.
#[derive(Debug, Serialize)]
pub struct DetectionPage {
    pub items: Vec<Detection>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// A validated review decision ready to apply.
#[derive(Debug, Clone)]
pub struct ReviewDecision {
    pub action: ReviewAction,
    pub notes: Option<String>,
    /// Replacement payload; present only for `modify`.
    pub modified_data: Option<DetectionPayload>,
    pub reviewer_id: Option<DbId>,
    pub assign_officer_id: Option<DbId>,
}

/// What applying a review did.
#[derive(Debug, Clone)]
pub enum ReviewOutcome {
    Reviewed {
        detection: Detection,
        /// Set when approval materialized a new violation.
        violation: Option<super::violation::Violation>,
    },
    NotFound,
    AlreadyReviewed,
    DuplicateViolationLink,
    /// The stored payload could not be decoded for its detection type.
    InvalidPayload(String),
}
