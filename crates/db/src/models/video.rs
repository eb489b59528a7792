//! Video rows. The upload subsystem owns these; the pipeline only touches
//! the processing and violation aggregate columns.

use roadwatch_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::status::StatusId;

/// A row from the `videos` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Video {
    pub id: DbId,
    pub external_id: String,
    pub camera_id: Option<String>,
    pub location_name: Option<String>,
    pub stream_url: String,
    pub duration_secs: Option<f64>,
    pub format: Option<String>,
    pub uploaded_by: Option<DbId>,
    pub thumbnail_url: Option<String>,
    pub processing_status_id: StatusId,
    pub has_violations: bool,
    pub violation_count: i32,
    pub processed_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for registering a video. Used by the upload subsystem and tests.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateVideo {
    pub external_id: String,
    pub camera_id: Option<String>,
    pub location_name: Option<String>,
    pub stream_url: String,
    pub duration_secs: Option<f64>,
    pub format: Option<String>,
    pub uploaded_by: Option<DbId>,
}
