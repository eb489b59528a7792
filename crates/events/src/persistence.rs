//! Audit persistence of notification events.
//!
//! [`EventPersistence`] subscribes to the bus and writes every event to the
//! `events` table. It exits when the bus is dropped.

use roadwatch_core::types::DbId;
use roadwatch_db::models::event::NewAuditEvent;
use roadwatch_db::repositories::EventRepo;
use roadwatch_db::DbPool;
use tokio::sync::broadcast;

use crate::bus::NotificationEvent;

pub struct EventPersistence;

impl EventPersistence {
    /// Run the persistence loop until the channel closes.
    pub async fn run(pool: DbPool, mut receiver: broadcast::Receiver<NotificationEvent>) {
        loop {
            match receiver.recv().await {
                Ok(event) => match Self::persist(&pool, &event).await {
                    Ok(id) => tracing::debug!(event_id = id, event_type = %event.event_type, "Event recorded"),
                    Err(e) => tracing::error!(
                        error = %e,
                        event_type = %event.event_type,
                        "Failed to persist event"
                    ),
                },
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Event persistence lagged, events were not persisted");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Event bus closed, persistence shutting down");
                    break;
                }
            }
        }
    }

    /// Write one `events` row. Names without a seeded event type are
    /// reported as `RowNotFound`.
    pub async fn persist(pool: &DbPool, event: &NotificationEvent) -> Result<DbId, sqlx::Error> {
        let row = NewAuditEvent {
            event_name: &event.event_type,
            source_entity_type: event.source_entity_type.as_deref(),
            source_entity_id: event.source_entity_id,
            actor_user_id: event.actor_user_id,
            payload: &event.payload,
        };
        EventRepo::record(pool, &row)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }
}
