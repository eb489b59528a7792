//! The `events` audit table. Event types are seeded by migration and
//! referenced by name.

use roadwatch_core::types::DbId;
use sqlx::PgPool;

use crate::models::event::{AuditEvent, NewAuditEvent};

pub struct EventRepo;

impl EventRepo {
    /// Id of the seeded event type called `name`.
    pub async fn event_type_id(pool: &PgPool, name: &str) -> Result<Option<DbId>, sqlx::Error> {
        sqlx::query_scalar("SELECT id FROM event_types WHERE name = $1")
            .bind(name)
            .fetch_optional(pool)
            .await
    }

    /// Record one event. Returns `None` when the name matches no seeded
    /// event type; nothing is written in that case.
    pub async fn record(
        pool: &PgPool,
        event: &NewAuditEvent<'_>,
    ) -> Result<Option<DbId>, sqlx::Error> {
        sqlx::query_scalar(
            "INSERT INTO events \
                (event_type_id, source_entity_type, source_entity_id, actor_user_id, payload) \
             SELECT et.id, $2, $3, $4, $5 FROM event_types et WHERE et.name = $1 \
             RETURNING id",
        )
        .bind(event.event_name)
        .bind(event.source_entity_type)
        .bind(event.source_entity_id)
        .bind(event.actor_user_id)
        .bind(event.payload)
        .fetch_optional(pool)
        .await
    }

    /// Audit trail of one entity (e.g. `("violation", 17)`), oldest first.
    pub async fn list_for_source(
        pool: &PgPool,
        source_entity_type: &str,
        source_entity_id: DbId,
    ) -> Result<Vec<AuditEvent>, sqlx::Error> {
        sqlx::query_as::<_, AuditEvent>(
            "SELECT e.id, et.name AS event_name, e.source_entity_type, e.source_entity_id, \
                    e.actor_user_id, e.payload, e.created_at \
             FROM events e JOIN event_types et ON et.id = e.event_type_id \
             WHERE e.source_entity_type = $1 AND e.source_entity_id = $2 \
             ORDER BY e.id",
        )
        .bind(source_entity_type)
        .bind(source_entity_id)
        .fetch_all(pool)
        .await
    }
}
