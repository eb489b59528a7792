//! Violations materialized from approved VIOLATION detections.

use roadwatch_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// Workflow status a new violation starts in.
pub const INITIAL_STATUS: &str = "pending";

/// Priority a new violation starts with.
pub const DEFAULT_PRIORITY: &str = "medium";

/// A row from the `violations` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Violation {
    pub id: DbId,
    pub video_id: DbId,
    pub detection_id: DbId,
    pub license_plate: String,
    pub vehicle_type: String,
    pub violation_type: String,
    pub description: String,
    pub camera_id: Option<String>,
    pub location_name: Option<String>,
    pub confidence_score: f64,
    pub detected_at: Timestamp,
    /// Provenance: source video, detection id, frame timestamp, raw payload,
    /// reviewer and stream URL.
    pub evidence: serde_json::Value,
    pub status: String,
    pub priority: String,
    pub assigned_officer_id: Option<DbId>,
    pub reviewed_by: Option<DbId>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Insert DTO built inside the review transaction.
#[derive(Debug, Clone)]
pub struct NewViolation {
    pub video_id: DbId,
    pub detection_id: DbId,
    pub license_plate: String,
    pub vehicle_type: String,
    pub violation_type: String,
    pub description: String,
    pub camera_id: Option<String>,
    pub location_name: Option<String>,
    pub confidence_score: f64,
    pub detected_at: Timestamp,
    pub evidence: serde_json::Value,
    pub assigned_officer_id: Option<DbId>,
    pub reviewed_by: Option<DbId>,
}
