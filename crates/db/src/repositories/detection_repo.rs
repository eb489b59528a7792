//! Repository for the `detections` table.
//!
//! Two operations here are consistency boundaries and run in a single
//! transaction each:
//!
//! - [`DetectionRepo::persist_analysis`] writes all rows of one analysis
//!   run, refreshes the video aggregates and completes the job, or writes
//!   nothing at all.
//! - [`DetectionRepo::review`] applies one review decision and, for an
//!   approved VIOLATION detection, creates and links exactly one violation.

use chrono::Utc;
use roadwatch_core::detection::DetectionType;
use roadwatch_core::review::{ReviewAction, ViolationDraft};
use roadwatch_core::types::DbId;
use sqlx::PgPool;

use crate::models::detection::{
    Detection, DetectionListQuery, DetectionPage, NewDetection, PendingDetectionQuery,
    ReviewDecision, ReviewOutcome,
};
use crate::models::status::{ProcessingStatus, ReviewStatus};
use crate::models::violation::NewViolation;
use crate::repositories::{JobRepo, VideoRepo, ViolationRepo};

/// Column list for `detections` queries.
const COLUMNS: &str = "\
    id, video_id, job_id, detection_type, frame_timestamp, confidence_score, \
    detection_data, violation_id, reviewed, review_status_id, reviewed_by, \
    reviewed_at, review_notes, created_at, updated_at";

/// Same columns qualified with the `d` alias, for joined queries.
const D_COLUMNS: &str = "\
    d.id, d.video_id, d.job_id, d.detection_type, d.frame_timestamp, d.confidence_score, \
    d.detection_data, d.violation_id, d.reviewed, d.review_status_id, d.reviewed_by, \
    d.reviewed_at, d.review_notes, d.created_at, d.updated_at";

/// Maximum page size for the pending listing.
const MAX_LIMIT: i64 = 100;

/// Default page size for the pending listing.
const DEFAULT_LIMIT: i64 = 20;

/// Counts returned by a successful persist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistSummary {
    pub detections_written: usize,
    pub has_violations: bool,
    pub violation_count: i32,
}

pub struct DetectionRepo;

impl DetectionRepo {
    // -----------------------------------------------------------------------
    // Analysis persistence
    // -----------------------------------------------------------------------

    /// Write one analysis run and complete its job atomically.
    ///
    /// Returns `None` without writing anything when `attempt` is no longer
    /// the job's current PROCESSING generation (the run was timed out,
    /// cancelled or reaped while it was executing).
    pub async fn persist_analysis(
        pool: &PgPool,
        job_id: DbId,
        attempt: i32,
        rows: &[NewDetection],
        result_data: &serde_json::Value,
    ) -> Result<Option<PersistSummary>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let Some(job) = JobRepo::lock_current_tx(&mut tx, job_id, attempt).await? else {
            return Ok(None);
        };

        let insert = "INSERT INTO detections \
                (video_id, job_id, detection_type, frame_timestamp, confidence_score, detection_data) \
             VALUES ($1, $2, $3, $4, $5, $6)";
        for row in rows {
            sqlx::query(insert)
                .bind(job.video_id)
                .bind(job.id)
                .bind(row.detection_type.as_str())
                .bind(row.frame_timestamp.max(0.0))
                .bind(roadwatch_core::types::clamp_confidence(row.confidence_score))
                .bind(&row.detection_data)
                .execute(&mut *tx)
                .await?;
        }

        let (has_violations, violation_count): (bool, i32) = sqlx::query_as(
            "UPDATE videos SET \
                 has_violations = EXISTS ( \
                     SELECT 1 FROM detections WHERE video_id = $1 AND detection_type = $2 \
                 ), \
                 violation_count = ( \
                     SELECT COUNT(*)::INTEGER FROM detections \
                     WHERE video_id = $1 AND review_status_id = $3 AND violation_id IS NOT NULL \
                 ), \
                 processing_status_id = $4, \
                 processed_at = NOW() \
             WHERE id = $1 \
             RETURNING has_violations, violation_count",
        )
        .bind(job.video_id)
        .bind(DetectionType::Violation.as_str())
        .bind(ReviewStatus::Approved.id())
        .bind(ProcessingStatus::Completed.id())
        .fetch_one(&mut *tx)
        .await?;

        JobRepo::complete_tx(&mut tx, job.id, result_data).await?;
        tx.commit().await?;

        Ok(Some(PersistSummary {
            detections_written: rows.len(),
            has_violations,
            violation_count,
        }))
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Detection>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM detections WHERE id = $1");
        sqlx::query_as::<_, Detection>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Detections of one video ordered by frame timestamp.
    pub async fn list_by_video(
        pool: &PgPool,
        video_id: DbId,
        params: &DetectionListQuery,
    ) -> Result<Vec<Detection>, sqlx::Error> {
        let mut conditions = vec!["video_id = $1".to_string()];
        let mut bind_idx: u32 = 2;

        if params.detection_type.is_some() {
            conditions.push(format!("detection_type = ${bind_idx}"));
            bind_idx += 1;
        }
        if params.min_confidence.is_some() {
            conditions.push(format!("confidence_score >= ${bind_idx}"));
        }

        let query = format!(
            "SELECT {COLUMNS} FROM detections WHERE {} ORDER BY frame_timestamp ASC, id ASC",
            conditions.join(" AND ")
        );

        let mut q = sqlx::query_as::<_, Detection>(&query).bind(video_id);
        if let Some(kind) = params.detection_type {
            q = q.bind(kind.as_str());
        }
        if let Some(min) = params.min_confidence {
            q = q.bind(min);
        }
        q.fetch_all(pool).await
    }

    /// Unreviewed detections across videos, newest first, with the total
    /// count for the same filters.
    pub async fn list_pending(
        pool: &PgPool,
        params: &PendingDetectionQuery,
    ) -> Result<DetectionPage, sqlx::Error> {
        let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
        let offset = params.offset.unwrap_or(0).max(0);

        // Build the WHERE clause and track the next bind parameter index.
        let mut conditions = vec!["d.reviewed = FALSE".to_string()];
        let mut bind_idx: u32 = 1;

        if params.camera_id.is_some() {
            conditions.push(format!("v.camera_id = ${bind_idx}"));
            bind_idx += 1;
        }
        if params.detection_type.is_some() {
            conditions.push(format!("d.detection_type = ${bind_idx}"));
            bind_idx += 1;
        }
        if params.violation_type.is_some() {
            conditions.push(format!("d.detection_data->>'violation_type' = ${bind_idx}"));
            bind_idx += 1;
        }
        if params.min_confidence.is_some() {
            conditions.push(format!("d.confidence_score >= ${bind_idx}"));
            bind_idx += 1;
        }
        if params.date_from.is_some() {
            conditions.push(format!("d.created_at >= ${bind_idx}"));
            bind_idx += 1;
        }
        if params.date_to.is_some() {
            conditions.push(format!("d.created_at <= ${bind_idx}"));
            bind_idx += 1;
        }

        let where_clause = conditions.join(" AND ");
        let from = "FROM detections d JOIN videos v ON v.id = d.video_id";

        let count_query = format!("SELECT COUNT(*) {from} WHERE {where_clause}");
        let page_query = format!(
            "SELECT {D_COLUMNS} {from} WHERE {where_clause} \
             ORDER BY d.created_at DESC, d.id DESC \
             LIMIT ${bind_idx} OFFSET ${}",
            bind_idx + 1,
        );

        let mut count = sqlx::query_scalar::<_, i64>(&count_query);
        let mut page = sqlx::query_as::<_, Detection>(&page_query);

        if let Some(camera_id) = &params.camera_id {
            count = count.bind(camera_id);
            page = page.bind(camera_id);
        }
        if let Some(kind) = params.detection_type {
            count = count.bind(kind.as_str());
            page = page.bind(kind.as_str());
        }
        if let Some(violation_type) = &params.violation_type {
            count = count.bind(violation_type);
            page = page.bind(violation_type);
        }
        if let Some(min) = params.min_confidence {
            count = count.bind(min);
            page = page.bind(min);
        }
        if let Some(date_from) = params.date_from {
            count = count.bind(date_from);
            page = page.bind(date_from);
        }
        if let Some(date_to) = params.date_to {
            count = count.bind(date_to);
            page = page.bind(date_to);
        }

        let total = count.fetch_one(pool).await?;
        let items = page.bind(limit).bind(offset).fetch_all(pool).await?;

        Ok(DetectionPage {
            items,
            total,
            limit,
            offset,
        })
    }

    // -----------------------------------------------------------------------
    // Review
    // -----------------------------------------------------------------------

    /// Apply a review decision under a row lock on the detection.
    ///
    /// Concurrent reviews of the same detection serialize on the lock; the
    /// loser sees `reviewed = true` and gets `AlreadyReviewed`.
    pub async fn review(
        pool: &PgPool,
        detection_id: DbId,
        decision: &ReviewDecision,
    ) -> Result<ReviewOutcome, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let query = format!("SELECT {COLUMNS} FROM detections WHERE id = $1 FOR UPDATE");
        let Some(current) = sqlx::query_as::<_, Detection>(&query)
            .bind(detection_id)
            .fetch_optional(&mut *tx)
            .await?
        else {
            return Ok(ReviewOutcome::NotFound);
        };

        if current.reviewed {
            return Ok(ReviewOutcome::AlreadyReviewed);
        }

        let reviewed_at = Utc::now();

        let detection = match decision.action {
            ReviewAction::Modify => {
                let data = match decision.modified_data.as_ref().map(serde_json::to_value) {
                    Some(Ok(data)) => data,
                    Some(Err(e)) => return Ok(ReviewOutcome::InvalidPayload(e.to_string())),
                    None => {
                        return Ok(ReviewOutcome::InvalidPayload(
                            "modify requires replacement data".to_string(),
                        ))
                    }
                };
                let query = format!(
                    "UPDATE detections \
                     SET detection_data = $2, review_notes = COALESCE($3, review_notes), \
                         reviewed_by = COALESCE($4, reviewed_by), review_status_id = $5 \
                     WHERE id = $1 \
                     RETURNING {COLUMNS}"
                );
                sqlx::query_as::<_, Detection>(&query)
                    .bind(detection_id)
                    .bind(&data)
                    .bind(&decision.notes)
                    .bind(decision.reviewer_id)
                    .bind(ReviewStatus::Pending.id())
                    .fetch_one(&mut *tx)
                    .await?
            }
            ReviewAction::Approve | ReviewAction::Reject => {
                let status = if decision.action == ReviewAction::Approve {
                    ReviewStatus::Approved
                } else {
                    ReviewStatus::Rejected
                };
                let query = format!(
                    "UPDATE detections \
                     SET reviewed = TRUE, review_status_id = $2, reviewed_by = $3, \
                         reviewed_at = $4, review_notes = $5 \
                     WHERE id = $1 \
                     RETURNING {COLUMNS}"
                );
                sqlx::query_as::<_, Detection>(&query)
                    .bind(detection_id)
                    .bind(status.id())
                    .bind(decision.reviewer_id)
                    .bind(reviewed_at)
                    .bind(&decision.notes)
                    .fetch_one(&mut *tx)
                    .await?
            }
        };

        let is_violation = matches!(detection.kind(), Ok(DetectionType::Violation));
        if decision.action != ReviewAction::Approve || !is_violation {
            tx.commit().await?;
            return Ok(ReviewOutcome::Reviewed {
                detection,
                violation: None,
            });
        }

        if detection.violation_id.is_some() {
            return Ok(ReviewOutcome::DuplicateViolationLink);
        }

        let payload = match detection.payload() {
            Ok(p) => p,
            Err(e) => return Ok(ReviewOutcome::InvalidPayload(e.to_string())),
        };
        let Some(data) = payload.as_violation() else {
            return Ok(ReviewOutcome::InvalidPayload(
                "VIOLATION detection carries a non-violation payload".to_string(),
            ));
        };
        let draft = ViolationDraft::from_payload(data);

        let (camera_id, location_name, stream_url): (Option<String>, Option<String>, String) =
            sqlx::query_as("SELECT camera_id, location_name, stream_url FROM videos WHERE id = $1")
                .bind(detection.video_id)
                .fetch_one(&mut *tx)
                .await?;

        let evidence = serde_json::json!({
            "video_id": detection.video_id,
            "detection_id": detection.id,
            "frame_timestamp": detection.frame_timestamp,
            "detection_data": detection.detection_data,
            "reviewed_by": decision.reviewer_id,
            "reviewed_at": reviewed_at,
            "stream_url": stream_url,
        });

        let new_violation = NewViolation {
            video_id: detection.video_id,
            detection_id: detection.id,
            license_plate: draft.license_plate,
            vehicle_type: draft.vehicle_type,
            violation_type: draft.violation_type,
            description: draft.description,
            camera_id,
            location_name,
            confidence_score: detection.confidence_score,
            detected_at: detection.created_at,
            evidence,
            assigned_officer_id: decision.assign_officer_id,
            reviewed_by: decision.reviewer_id,
        };

        let Some(violation) = ViolationRepo::insert_tx(&mut tx, &new_violation).await? else {
            return Ok(ReviewOutcome::DuplicateViolationLink);
        };

        // Write-once link: never overwrite an existing violation_id.
        let query = format!(
            "UPDATE detections SET violation_id = $2 \
             WHERE id = $1 AND violation_id IS NULL \
             RETURNING {COLUMNS}"
        );
        let Some(detection) = sqlx::query_as::<_, Detection>(&query)
            .bind(detection.id)
            .bind(violation.id)
            .fetch_optional(&mut *tx)
            .await?
        else {
            return Ok(ReviewOutcome::DuplicateViolationLink);
        };

        VideoRepo::recompute_violation_count_tx(&mut tx, detection.video_id).await?;
        tx.commit().await?;

        Ok(ReviewOutcome::Reviewed {
            detection,
            violation: Some(violation),
        })
    }
}
