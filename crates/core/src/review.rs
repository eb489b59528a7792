//! Review decisions on persisted detections.
//!
//! A detection starts `PENDING`. `approve` and `reject` close it; `modify`
//! replaces its payload and keeps it open for a later decision.

use serde::{Deserialize, Serialize};

use crate::detection::{DetectionPayload, DetectionType, ViolationData};
use crate::error::CoreError;

/// Maximum length of reviewer notes.
pub const MAX_REVIEW_NOTES_LENGTH: usize = 2_000;

/// Plate recorded on a violation when the detection carried no read.
pub const UNKNOWN_PLATE: &str = "UNKNOWN";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewAction {
    Approve,
    Reject,
    Modify,
}

/// Validate a review submission before touching the database.
///
/// `modify` must carry replacement data, and that data must decode as the
/// payload for the detection's own type. Returns the decoded replacement.
pub fn validate_review(
    detection_type: DetectionType,
    action: ReviewAction,
    notes: Option<&str>,
    modified_data: Option<&serde_json::Value>,
) -> Result<Option<DetectionPayload>, CoreError> {
    if let Some(n) = notes {
        if n.len() > MAX_REVIEW_NOTES_LENGTH {
            return Err(CoreError::Validation(format!(
                "Review notes exceed maximum length of {MAX_REVIEW_NOTES_LENGTH} characters"
            )));
        }
    }

    match (action, modified_data) {
        (ReviewAction::Modify, None) => Err(CoreError::Validation(
            "modified_data is required for the modify action".to_string(),
        )),
        (ReviewAction::Modify, Some(data)) => {
            DetectionPayload::decode(detection_type, data).map(Some)
        }
        (_, Some(_)) => Err(CoreError::Validation(
            "modified_data is only accepted with the modify action".to_string(),
        )),
        (_, None) => Ok(None),
    }
}

/// Fields of a violation materialized from an approved detection.
#[derive(Debug, Clone, PartialEq)]
pub struct ViolationDraft {
    pub license_plate: String,
    pub vehicle_type: String,
    pub violation_type: String,
    pub description: String,
}

impl ViolationDraft {
    pub fn from_payload(data: &ViolationData) -> Self {
        let plate = data
            .license_plate
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .unwrap_or(UNKNOWN_PLATE);

        Self {
            license_plate: plate.to_string(),
            vehicle_type: data.vehicle_type.clone(),
            violation_type: data.violation_type.clone(),
            description: data.description.clone(),
        }
    }
}
