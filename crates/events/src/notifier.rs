//! Typed publishing facade used by the worker and the review service.
//!
//! Every method publishes on the [`EventBus`] and returns immediately.

use std::sync::Arc;

use roadwatch_core::events::{
    EVENT_OFFICER_ASSIGNED, EVENT_PROCESSING_COMPLETED, EVENT_PROCESSING_FAILED,
    EVENT_VIOLATION_CREATED,
};
use roadwatch_core::types::DbId;
use roadwatch_db::models::job::ProcessingJob;
use roadwatch_db::models::violation::Violation;

use crate::bus::{EventBus, NotificationEvent};

#[derive(Clone)]
pub struct Notifier {
    bus: Arc<EventBus>,
}

impl Notifier {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self { bus }
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn violation_created(&self, violation: &Violation, reviewer_id: Option<DbId>) {
        self.bus.publish(
            NotificationEvent::new(EVENT_VIOLATION_CREATED)
                .with_source("violation", violation.id)
                .with_actor(reviewer_id)
                .with_payload(serde_json::json!({
                    "violation_id": violation.id,
                    "video_id": violation.video_id,
                    "detection_id": violation.detection_id,
                    "license_plate": violation.license_plate,
                    "vehicle_type": violation.vehicle_type,
                    "violation_type": violation.violation_type,
                    "camera_id": violation.camera_id,
                    "location_name": violation.location_name,
                    "detected_at": violation.detected_at,
                })),
        );
    }

    pub fn officer_assigned(&self, violation: &Violation, officer_id: DbId, reviewer_id: Option<DbId>) {
        self.bus.publish(
            NotificationEvent::new(EVENT_OFFICER_ASSIGNED)
                .with_source("violation", violation.id)
                .with_actor(reviewer_id)
                .with_payload(serde_json::json!({
                    "violation_id": violation.id,
                    "officer_id": officer_id,
                    "violation_type": violation.violation_type,
                    "license_plate": violation.license_plate,
                    "location_name": violation.location_name,
                })),
        );
    }

    pub fn processing_completed(&self, job: &ProcessingJob, result: &serde_json::Value) {
        self.bus.publish(
            NotificationEvent::new(EVENT_PROCESSING_COMPLETED)
                .with_source("processing_job", job.id)
                .with_payload(serde_json::json!({
                    "job_id": job.id,
                    "video_id": job.video_id,
                    "job_type": job.job_type,
                    "result": result,
                })),
        );
    }

    pub fn processing_failed(&self, job: &ProcessingJob, error_message: &str) {
        self.bus.publish(
            NotificationEvent::new(EVENT_PROCESSING_FAILED)
                .with_source("processing_job", job.id)
                .with_payload(serde_json::json!({
                    "job_id": job.id,
                    "video_id": job.video_id,
                    "job_type": job.job_type,
                    "error_message": error_message,
                })),
        );
    }
}
