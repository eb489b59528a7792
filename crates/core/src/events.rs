//! Event type names published on the notification bus.
//!
//! Each name must also exist in the `event_types` seed data so the
//! persistence service can resolve it.

/// A reviewer approved a VIOLATION detection and a violation was created.
pub const EVENT_VIOLATION_CREATED: &str = "violation.created";

/// An officer was assigned to a newly created violation.
pub const EVENT_OFFICER_ASSIGNED: &str = "violation.officer_assigned";

/// A processing job finished successfully.
pub const EVENT_PROCESSING_COMPLETED: &str = "video.processing_completed";

/// A processing job failed terminally.
pub const EVENT_PROCESSING_FAILED: &str = "video.processing_failed";

/// All event names, in seed order.
pub const ALL_EVENTS: &[&str] = &[
    EVENT_VIOLATION_CREATED,
    EVENT_OFFICER_ASSIGNED,
    EVENT_PROCESSING_COMPLETED,
    EVENT_PROCESSING_FAILED,
];
