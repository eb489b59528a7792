//! Audit log of pipeline notifications.

use roadwatch_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// One recorded notification, with its event name resolved.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AuditEvent {
    pub id: DbId,
    pub event_name: String,
    pub source_entity_type: Option<String>,
    pub source_entity_id: Option<DbId>,
    pub actor_user_id: Option<DbId>,
    pub payload: serde_json::Value,
    pub created_at: Timestamp,
}

/// A notification to record. `event_name` must be a seeded event type.
#[derive(Debug, Clone, Copy)]
pub struct NewAuditEvent<'a> {
    pub event_name: &'a str,
    pub source_entity_type: Option<&'a str>,
    pub source_entity_id: Option<DbId>,
    pub actor_user_id: Option<DbId>,
    pub payload: &'a serde_json::Value,
}
