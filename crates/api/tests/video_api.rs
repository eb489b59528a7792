//! Enqueue and read endpoints under `/api/v1/videos/{id}`.

mod common;

use axum::http::StatusCode;
use common::{body_json, get, post_empty, post_json, seed_detections, seed_video, violation_row};
use roadwatch_core::detection::{DetectionPayload, VehicleCountData};
use roadwatch_db::models::detection::NewDetection;
use serde_json::json;
use sqlx::PgPool;

#[sqlx::test(migrations = "../../db/migrations")]
async fn analysis_request_is_idempotent_while_active(pool: PgPool) {
    let video = seed_video(&pool, "vid-analysis", "CAM-11").await;

    let first = post_empty(
        common::build_test_app(pool.clone()),
        &format!("/api/v1/videos/{}/analysis", video.id),
    )
    .await;
    assert_eq!(first.status(), StatusCode::CREATED);
    let first = body_json(first).await;
    assert_eq!(first["data"]["status"], "PENDING");
    assert_eq!(first["data"]["job_type"], "AI_ANALYSIS");
    assert_eq!(first["data"]["created"], true);

    let second = post_empty(
        common::build_test_app(pool),
        &format!("/api/v1/videos/{}/analysis", video.id),
    )
    .await;
    assert_eq!(second.status(), StatusCode::OK);
    let second = body_json(second).await;
    assert_eq!(second["data"]["job_id"], first["data"]["job_id"]);
    assert_eq!(second["data"]["created"], false);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn analysis_for_unknown_video_returns_404(pool: PgPool) {
    let response = post_empty(common::build_test_app(pool), "/api/v1/videos/9999/analysis").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_json(response).await;
    assert_eq!(json["code"], "NOT_FOUND");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn enqueue_job_by_type(pool: PgPool) {
    let video = seed_video(&pool, "vid-thumb", "CAM-11").await;

    let response = post_json(
        common::build_test_app(pool.clone()),
        &format!("/api/v1/videos/{}/jobs", video.id),
        json!({ "job_type": "THUMBNAIL" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(body_json(response).await["data"]["job_type"], "THUMBNAIL");

    let listed = get(
        common::build_test_app(pool),
        &format!("/api/v1/videos/{}/jobs", video.id),
    )
    .await;
    assert_eq!(listed.status(), StatusCode::OK);
    let listed = body_json(listed).await;
    assert_eq!(listed["data"].as_array().unwrap().len(), 1);
    assert_eq!(listed["data"][0]["status"], "PENDING");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn unknown_job_type_is_rejected(pool: PgPool) {
    let video = seed_video(&pool, "vid-bad-type", "CAM-11").await;

    let response = post_json(
        common::build_test_app(pool),
        &format!("/api/v1/videos/{}/jobs", video.id),
        json!({ "job_type": "TRANSCODE" }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn detections_can_be_filtered_by_type_and_confidence(pool: PgPool) {
    let video = seed_video(&pool, "vid-detections", "CAM-11").await;
    let counts = NewDetection::from_payload(
        &DetectionPayload::VehicleCount(VehicleCountData {
            counts: [("motorcycle".to_string(), 2)].into_iter().collect(),
            total: 2,
        }),
        0.0,
        1.0,
    )
    .unwrap();
    seed_detections(
        &pool,
        video.id,
        &[
            counts,
            violation_row("no_helmet", 1.5, 0.9, Some("51F-123.45")),
            violation_row("no_helmet", 4.0, 0.62, None),
        ],
    )
    .await;
    let base = format!("/api/v1/videos/{}/detections", video.id);

    let all = body_json(get(common::build_test_app(pool.clone()), &base).await).await;
    assert_eq!(all["data"].as_array().unwrap().len(), 3);
    assert_eq!(all["data"][0]["detection_type"], "VEHICLE_COUNT");
    assert_eq!(all["data"][0]["review_status"], "PENDING");

    let strong = body_json(
        get(
            common::build_test_app(pool),
            &format!("{base}?detection_type=VIOLATION&min_confidence=0.8"),
        )
        .await,
    )
    .await;
    let items = strong["data"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["detection_data"]["license_plate"], "51F-123.45");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn out_of_range_confidence_filter_is_rejected(pool: PgPool) {
    let video = seed_video(&pool, "vid-conf", "CAM-11").await;

    let response = get(
        common::build_test_app(pool),
        &format!("/api/v1/videos/{}/detections?min_confidence=1.5", video.id),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
