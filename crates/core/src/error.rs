use crate::types::DbId;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: DbId },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// A review decision was submitted for a detection that is already closed.
    #[error("Detection {detection_id} has already been reviewed")]
    AlreadyReviewed { detection_id: DbId },

    /// The detection is already linked to a violation; links are write-once.
    #[error("Detection {detection_id} is already linked to a violation")]
    DuplicateViolationLink { detection_id: DbId },

    #[error("Internal error: {0}")]
    Internal(String),
}
