//! Review workflow service.
//!
//! Validation happens before the database is touched; the state change,
//! violation materialization and violation-count refresh all commit in one
//! transaction inside [`DetectionRepo::review`]. Notifications go out only
//! after that commit.

use roadwatch_core::error::CoreError;
use roadwatch_core::review::{validate_review, ReviewAction};
use roadwatch_core::types::DbId;
use roadwatch_db::models::detection::{Detection, ReviewDecision, ReviewOutcome};
use roadwatch_db::models::violation::Violation;
use roadwatch_db::repositories::DetectionRepo;
use roadwatch_db::DbPool;
use roadwatch_events::Notifier;
use serde::Deserialize;

use crate::error::PipelineError;

/// A reviewer's decision as submitted.
#[derive(Debug, Clone, Deserialize)]
pub struct ReviewRequest {
    pub action: ReviewAction,
    #[serde(default)]
    pub notes: Option<String>,
    /// Replacement payload; required for `modify`, rejected otherwise.
    #[serde(default)]
    pub modified_data: Option<serde_json::Value>,
    #[serde(default)]
    pub reviewer_id: Option<DbId>,
    /// Officer to assign to the violation created by an approval.
    #[serde(default)]
    pub assign_officer_id: Option<DbId>,
}

#[derive(Debug, Clone)]
pub struct ReviewResult {
    pub detection: Detection,
    pub violation: Option<Violation>,
}

#[derive(Clone)]
pub struct ReviewService {
    pool: DbPool,
    notifier: Notifier,
}

impl ReviewService {
    pub fn new(pool: DbPool, notifier: Notifier) -> Self {
        Self { pool, notifier }
    }

    pub async fn review(
        &self,
        detection_id: DbId,
        request: ReviewRequest,
    ) -> Result<ReviewResult, PipelineError> {
        let current = DetectionRepo::find_by_id(&self.pool, detection_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "Detection",
                id: detection_id,
            })?;
        if current.reviewed {
            return Err(CoreError::AlreadyReviewed { detection_id }.into());
        }

        let modified_data = validate_review(
            current.kind()?,
            request.action,
            request.notes.as_deref(),
            request.modified_data.as_ref(),
        )?;
        if request.assign_officer_id.is_some() && request.action != ReviewAction::Approve {
            return Err(CoreError::Validation(
                "assign_officer_id is only accepted with the approve action".to_string(),
            )
            .into());
        }

        let decision = ReviewDecision {
            action: request.action,
            notes: request.notes,
            modified_data,
            reviewer_id: request.reviewer_id,
            assign_officer_id: request.assign_officer_id,
        };

        let (detection, violation) =
            match DetectionRepo::review(&self.pool, detection_id, &decision).await? {
                ReviewOutcome::Reviewed {
                    detection,
                    violation,
                } => (detection, violation),
                ReviewOutcome::NotFound => {
                    return Err(CoreError::NotFound {
                        entity: "Detection",
                        id: detection_id,
                    }
                    .into())
                }
                ReviewOutcome::AlreadyReviewed => {
                    return Err(CoreError::AlreadyReviewed { detection_id }.into())
                }
                ReviewOutcome::DuplicateViolationLink => {
                    return Err(CoreError::DuplicateViolationLink { detection_id }.into())
                }
                ReviewOutcome::InvalidPayload(msg) => {
                    return Err(CoreError::Validation(msg).into())
                }
            };

        tracing::info!(
            detection_id,
            action = ?decision.action,
            reviewer_id = ?decision.reviewer_id,
            violation_id = ?violation.as_ref().map(|v| v.id),
            "Detection reviewed",
        );

        if let Some(v) = &violation {
            self.notifier.violation_created(v, decision.reviewer_id);
            if let Some(officer_id) = v.assigned_officer_id {
                self.notifier
                    .officer_assigned(v, officer_id, decision.reviewer_id);
            }
        }

        Ok(ReviewResult {
            detection,
            violation,
        })
    }
}
