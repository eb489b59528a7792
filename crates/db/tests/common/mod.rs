//! Shared fixtures for repository tests.

#![allow(dead_code)]

use roadwatch_core::detection::{BoundingBox, DetectionPayload, DetectionType, ViolationData};
use roadwatch_core::job::JobType;
use roadwatch_db::models::detection::NewDetection;
use roadwatch_db::models::job::ProcessingJob;
use roadwatch_db::models::video::{CreateVideo, Video};
use roadwatch_db::repositories::{JobRepo, VideoRepo};
use sqlx::PgPool;

pub async fn seed_video(pool: &PgPool, external_id: &str) -> Video {
    VideoRepo::create(
        pool,
        &CreateVideo {
            external_id: external_id.to_string(),
            camera_id: Some("CAM-01".to_string()),
            location_name: Some("Nguyen Hue / Le Loi".to_string()),
            stream_url: format!("https://cdn.example.test/{external_id}.mp4"),
            duration_secs: Some(10.0),
            format: Some("mp4".to_string()),
            uploaded_by: Some(7),
        },
    )
    .await
    .unwrap()
}

/// Enqueue and claim an AI_ANALYSIS job for `video_id`.
pub async fn claimed_analysis(pool: &PgPool, video_id: i64) -> ProcessingJob {
    let enqueued = JobRepo::enqueue(pool, video_id, JobType::AiAnalysis)
        .await
        .unwrap();
    let job = JobRepo::claim_next(pool, "test-worker")
        .await
        .unwrap()
        .expect("job should be claimable");
    assert_eq!(job.id, enqueued.job.id);
    job
}

pub fn violation_row(frame_timestamp: f64, confidence: f64, plate: Option<&str>) -> NewDetection {
    let payload = DetectionPayload::Violation(ViolationData {
        violation_type: "no_helmet".to_string(),
        description: "Motorcycle rider without helmet".to_string(),
        bbox: BoundingBox::new(100.0, 120.0, 180.0, 260.0),
        vehicle_type: "motorcycle".to_string(),
        track_id: Some(1),
        license_plate: plate.map(str::to_string),
    });
    NewDetection::from_payload(&payload, frame_timestamp, confidence).unwrap()
}

pub fn plate_row(frame_timestamp: f64, confidence: f64) -> NewDetection {
    NewDetection {
        detection_type: DetectionType::LicensePlate,
        frame_timestamp,
        confidence_score: confidence,
        detection_data: serde_json::json!({
            "plate_number": "51A-123.45",
            "vehicle_type": "car",
            "bbox": { "x1": 1.0, "y1": 2.0, "x2": 30.0, "y2": 40.0 },
            "track_id": 3
        }),
    }
}
