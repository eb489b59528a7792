//! Repository for the `violations` table.

use roadwatch_core::types::DbId;
use sqlx::PgPool;

use crate::models::violation::{NewViolation, Violation, DEFAULT_PRIORITY, INITIAL_STATUS};

/// Column list for `violations` queries.
const COLUMNS: &str = "\
    id, video_id, detection_id, license_plate, vehicle_type, violation_type, \
    description, camera_id, location_name, confidence_score, detected_at, \
    evidence, status, priority, assigned_officer_id, reviewed_by, \
    created_at, updated_at";

pub struct ViolationRepo;

impl ViolationRepo {
    /// Insert a violation for a detection inside the review transaction.
    ///
    /// Returns `None` when a violation already exists for the detection
    /// (`uq_violations_detection_id`).
    pub async fn insert_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        input: &NewViolation,
    ) -> Result<Option<Violation>, sqlx::Error> {
        let query = format!(
            "INSERT INTO violations \
                (video_id, detection_id, license_plate, vehicle_type, violation_type, \
                 description, camera_id, location_name, confidence_score, detected_at, \
                 evidence, status, priority, assigned_officer_id, reviewed_by) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15) \
             ON CONFLICT (detection_id) DO NOTHING \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Violation>(&query)
            .bind(input.video_id)
            .bind(input.detection_id)
            .bind(&input.license_plate)
            .bind(&input.vehicle_type)
            .bind(&input.violation_type)
            .bind(&input.description)
            .bind(&input.camera_id)
            .bind(&input.location_name)
            .bind(input.confidence_score)
            .bind(input.detected_at)
            .bind(&input.evidence)
            .bind(INITIAL_STATUS)
            .bind(DEFAULT_PRIORITY)
            .bind(input.assigned_officer_id)
            .bind(input.reviewed_by)
            .fetch_optional(&mut **tx)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Violation>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM violations WHERE id = $1");
        sqlx::query_as::<_, Violation>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn list_by_video(pool: &PgPool, video_id: DbId) -> Result<Vec<Violation>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM violations WHERE video_id = $1 ORDER BY id");
        sqlx::query_as::<_, Violation>(&query)
            .bind(video_id)
            .fetch_all(pool)
            .await
    }
}
