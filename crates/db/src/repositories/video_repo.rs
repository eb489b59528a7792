//! Repository for the `videos` table.

use roadwatch_core::types::DbId;
use sqlx::PgPool;

use crate::models::status::ProcessingStatus;
use crate::models::video::{CreateVideo, Video};

/// Column list for `videos` queries.
const COLUMNS: &str = "\
    id, external_id, camera_id, location_name, stream_url, duration_secs, \
    format, uploaded_by, thumbnail_url, processing_status_id, \
    has_violations, violation_count, processed_at, created_at, updated_at";

pub struct VideoRepo;

impl VideoRepo {
    pub async fn create(pool: &PgPool, input: &CreateVideo) -> Result<Video, sqlx::Error> {
        let query = format!(
            "INSERT INTO videos \
                (external_id, camera_id, location_name, stream_url, duration_secs, format, uploaded_by) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Video>(&query)
            .bind(&input.external_id)
            .bind(&input.camera_id)
            .bind(&input.location_name)
            .bind(&input.stream_url)
            .bind(input.duration_secs)
            .bind(&input.format)
            .bind(input.uploaded_by)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Video>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM videos WHERE id = $1");
        sqlx::query_as::<_, Video>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Store the thumbnail URL returned by the storage collaborator.
    pub async fn set_thumbnail_url(
        pool: &PgPool,
        id: DbId,
        thumbnail_url: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE videos SET thumbnail_url = $2 WHERE id = $1")
            .bind(id)
            .bind(thumbnail_url)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Set the processing status inside an open transaction.
    pub async fn set_processing_status_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        id: DbId,
        status: ProcessingStatus,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE videos SET processing_status_id = $2 WHERE id = $1")
            .bind(id)
            .bind(status.id())
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    /// Recompute `violation_count` from approved, linked detections.
    ///
    /// Never incremented in place, so concurrent approvals converge on the
    /// same value.
    pub async fn recompute_violation_count_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        id: DbId,
    ) -> Result<i32, sqlx::Error> {
        sqlx::query_scalar(
            "UPDATE videos SET violation_count = ( \
                 SELECT COUNT(*)::INTEGER FROM detections \
                 WHERE video_id = $1 AND review_status_id = $2 AND violation_id IS NOT NULL \
             ) \
             WHERE id = $1 \
             RETURNING violation_count",
        )
        .bind(id)
        .bind(crate::models::status::ReviewStatus::Approved.id())
        .fetch_one(&mut **tx)
        .await
    }
}
