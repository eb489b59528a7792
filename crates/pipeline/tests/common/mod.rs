#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use roadwatch_core::detection::BoundingBox;
use roadwatch_core::job::JobType;
use roadwatch_db::models::job::ProcessingJob;
use roadwatch_db::models::video::{CreateVideo, Video};
use roadwatch_db::repositories::{JobRepo, VideoRepo};
use roadwatch_detection::engine::{AnalysisStats, ViolationCandidate};
use roadwatch_detection::plates::PlateCandidate;
use roadwatch_detection::AnalysisResult;
use roadwatch_events::{EventBus, Notifier};
use sqlx::PgPool;

pub async fn seed_video(pool: &PgPool, external_id: &str) -> Video {
    VideoRepo::create(
        pool,
        &CreateVideo {
            external_id: external_id.to_string(),
            camera_id: Some("CAM-02".to_string()),
            location_name: Some("Dien Bien Phu / Hai Ba Trung".to_string()),
            stream_url: format!("https://cdn.example.test/{external_id}.mp4"),
            duration_secs: Some(12.0),
            format: Some("mp4".to_string()),
            uploaded_by: None,
        },
    )
    .await
    .unwrap()
}

pub async fn claimed_analysis(pool: &PgPool, video_id: i64) -> ProcessingJob {
    let enqueued = JobRepo::enqueue(pool, video_id, JobType::AiAnalysis)
        .await
        .unwrap();
    let job = JobRepo::claim_next(pool, "pipeline-test")
        .await
        .unwrap()
        .expect("job should be claimable");
    assert_eq!(job.id, enqueued.job.id);
    job
}

pub fn notifier() -> (Arc<EventBus>, Notifier) {
    let bus = Arc::new(EventBus::default());
    (bus.clone(), Notifier::new(bus))
}

/// Two helmet violations on one motorcycle, one of them with a plate read.
pub fn helmet_result() -> AnalysisResult {
    let bbox = BoundingBox::new(100.0, 120.0, 180.0, 260.0);
    let violation = |ts: f64, plate: Option<&str>| ViolationCandidate {
        frame_index: (ts * 30.0) as u64,
        frame_timestamp: ts,
        violation_type: "no_helmet".to_string(),
        description: "Motorcycle rider without helmet".to_string(),
        confidence: 0.8,
        vehicle_type: "motorcycle".to_string(),
        bbox,
        track_id: Some(1),
        license_plate: plate.map(str::to_string),
    };

    AnalysisResult {
        vehicle_counts: BTreeMap::from([("motorcycle".to_string(), 1)]),
        license_plates: vec![PlateCandidate {
            plate_number: "59X1-888.88".to_string(),
            confidence: 0.91,
            frame_timestamp: 2.5,
            vehicle_type: "motorcycle".to_string(),
            bbox,
            track_id: Some(1),
        }],
        violations: vec![violation(2.5, Some("59X1-888.88")), violation(7.0, None)],
        frame_detections: Vec::new(),
        stats: AnalysisStats {
            total_frames: 360,
            frames_read: 360,
            frames_analyzed: 24,
            fps: 30.0,
            processing_time_secs: 2.0,
        },
    }
}
