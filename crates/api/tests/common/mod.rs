#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use roadwatch_core::detection::{BoundingBox, DetectionPayload, ViolationData};
use roadwatch_core::job::JobType;
use roadwatch_core::types::DbId;
use roadwatch_db::models::detection::NewDetection;
use roadwatch_db::models::video::{CreateVideo, Video};
use roadwatch_db::repositories::{DetectionRepo, JobRepo, VideoRepo};
use roadwatch_events::EventBus;
use sqlx::PgPool;
use tower::ServiceExt;

use roadwatch_api::config::ServerConfig;
use roadwatch_api::router::build_app_router;
use roadwatch_api::state::AppState;

/// Test `ServerConfig`: dev CORS origin, no webhook.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
        webhook_url: None,
    }
}

/// The production router over `pool`.
pub fn build_test_app(pool: PgPool) -> Router {
    build_test_app_with_bus(pool).0
}

/// Like [`build_test_app`], also returning the bus so tests can subscribe
/// to published notifications.
pub fn build_test_app_with_bus(pool: PgPool) -> (Router, Arc<EventBus>) {
    let config = test_config();
    let bus = Arc::new(EventBus::default());
    let state = AppState::new(pool, config.clone(), Arc::clone(&bus));
    (build_app_router(state, &config), bus)
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    app.oneshot(
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await
    .unwrap()
}

pub async fn post_empty(app: Router, uri: &str) -> Response<Body> {
    app.oneshot(
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .body(Body::empty())
            .unwrap(),
    )
    .await
    .unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub async fn seed_video(pool: &PgPool, external_id: &str, camera_id: &str) -> Video {
    VideoRepo::create(
        pool,
        &CreateVideo {
            external_id: external_id.to_string(),
            camera_id: Some(camera_id.to_string()),
            location_name: Some("Nguyen Hue / Le Loi".to_string()),
            stream_url: format!("https://cdn.example.test/{external_id}.mp4"),
            duration_secs: Some(20.0),
            format: Some("mp4".to_string()),
            uploaded_by: None,
        },
    )
    .await
    .unwrap()
}

pub fn violation_row(violation_type: &str, ts: f64, confidence: f64, plate: Option<&str>) -> NewDetection {
    let payload = DetectionPayload::Violation(ViolationData {
        violation_type: violation_type.to_string(),
        description: format!("{violation_type} detected"),
        bbox: BoundingBox::new(40.0, 60.0, 140.0, 220.0),
        vehicle_type: "motorcycle".to_string(),
        track_id: Some(3),
        license_plate: plate.map(str::to_string),
    });
    NewDetection::from_payload(&payload, ts, confidence).unwrap()
}

/// Run a completed analysis for `video_id` that wrote `rows`, returning
/// the detection ids in timestamp order.
pub async fn seed_detections(pool: &PgPool, video_id: DbId, rows: &[NewDetection]) -> Vec<DbId> {
    let enqueued = JobRepo::enqueue(pool, video_id, JobType::AiAnalysis)
        .await
        .unwrap();
    let job = JobRepo::claim_next(pool, "api-test")
        .await
        .unwrap()
        .expect("fresh job should be claimable");
    assert_eq!(job.id, enqueued.job.id);
    DetectionRepo::persist_analysis(pool, job.id, job.attempt, rows, &serde_json::json!({}))
        .await
        .unwrap()
        .expect("current attempt should persist");

    DetectionRepo::list_by_video(pool, video_id, &Default::default())
        .await
        .unwrap()
        .into_iter()
        .map(|d| d.id)
        .collect()
}
