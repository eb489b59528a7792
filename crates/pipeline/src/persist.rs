//! Detection Persistence: engine output → typed detection rows.
//!
//! One analysis run produces:
//!
//! | type            | rows                         | timestamp        | confidence           |
//! |-----------------|------------------------------|------------------|----------------------|
//! | `LICENSE_PLATE` | one per deduplicated plate   | best read        | best read            |
//! | `VEHICLE_COUNT` | one, only when total > 0     | 0                | 1.0                  |
//! | `VIOLATION`     | one per rule hit per frame   | frame            | rule confidence      |
//! | `FRAME`         | one per sampled frame w/ box | frame            | mean box confidence  |

use roadwatch_core::detection::{
    DetectionPayload, FrameData, LicensePlateData, VehicleCountData, ViolationData,
};
use roadwatch_db::models::detection::NewDetection;
use roadwatch_db::models::job::ProcessingJob;
use roadwatch_db::repositories::detection_repo::PersistSummary;
use roadwatch_db::repositories::DetectionRepo;
use roadwatch_db::DbPool;
use roadwatch_detection::AnalysisResult;

use crate::error::PipelineError;

/// What a successful persist wrote, plus the job's `result_data`.
#[derive(Debug, Clone)]
pub struct PersistedAnalysis {
    pub summary: PersistSummary,
    pub result_data: serde_json::Value,
}

/// Build every detection row for one run.
pub fn detection_rows(result: &AnalysisResult) -> Result<Vec<NewDetection>, serde_json::Error> {
    let mut rows = Vec::with_capacity(
        result.license_plates.len() + result.violations.len() + result.frame_detections.len() + 1,
    );

    for plate in &result.license_plates {
        let payload = DetectionPayload::LicensePlate(LicensePlateData {
            plate_number: plate.plate_number.clone(),
            vehicle_type: plate.vehicle_type.clone(),
            bbox: plate.bbox,
            track_id: plate.track_id,
        });
        rows.push(NewDetection::from_payload(&payload, plate.frame_timestamp, plate.confidence)?);
    }

    let total = result.total_vehicles();
    if total > 0 {
        let payload = DetectionPayload::VehicleCount(VehicleCountData {
            counts: result.vehicle_counts.clone(),
            total,
        });
        rows.push(NewDetection::from_payload(&payload, 0.0, 1.0)?);
    }

    for v in &result.violations {
        let payload = DetectionPayload::Violation(ViolationData {
            violation_type: v.violation_type.clone(),
            description: v.description.clone(),
            bbox: v.bbox,
            vehicle_type: v.vehicle_type.clone(),
            track_id: v.track_id,
            license_plate: v.license_plate.clone(),
        });
        rows.push(NewDetection::from_payload(&payload, v.frame_timestamp, v.confidence)?);
    }

    for frame in &result.frame_detections {
        let payload = DetectionPayload::Frame(FrameData {
            bounding_boxes: frame.boxes.clone(),
        });
        rows.push(NewDetection::from_payload(
            &payload,
            frame.frame_timestamp,
            frame.mean_confidence(),
        )?);
    }

    Ok(rows)
}

/// Summary stored in `processing_jobs.result_data`.
pub fn result_summary(result: &AnalysisResult) -> serde_json::Value {
    serde_json::json!({
        "vehicle_counts": result.vehicle_counts,
        "total_vehicles": result.total_vehicles(),
        "license_plates": result.license_plates.iter().map(|p| &p.plate_number).collect::<Vec<_>>(),
        "violations_detected": result.violations.len(),
        "frames_recorded": result.frame_detections.len(),
        "stats": result.stats,
    })
}

/// Persist one run for the job's current attempt.
///
/// Returns `None` when the attempt was superseded before it could commit;
/// in that case nothing was written.
pub async fn persist_analysis(
    pool: &DbPool,
    job: &ProcessingJob,
    result: &AnalysisResult,
) -> Result<Option<PersistedAnalysis>, PipelineError> {
    let rows = detection_rows(result)?;
    let result_data = result_summary(result);

    let Some(summary) =
        DetectionRepo::persist_analysis(pool, job.id, job.attempt, &rows, &result_data).await?
    else {
        tracing::warn!(
            job_id = job.id,
            attempt = job.attempt,
            "Discarding analysis result from a superseded attempt",
        );
        return Ok(None);
    };

    tracing::info!(
        job_id = job.id,
        video_id = job.video_id,
        detections = summary.detections_written,
        has_violations = summary.has_violations,
        "Analysis persisted",
    );
    Ok(Some(PersistedAnalysis {
        summary,
        result_data,
    }))
}
