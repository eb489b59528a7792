//! Notification plumbing for the processing pipeline.
//!
//! - [`EventBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`. Publishing never blocks and never fails.
//! - [`Notifier`]: typed facade the pipeline calls at each milestone.
//! - [`EventPersistence`]: writes every event to the `events` table.
//! - [`NotificationGateway`]: forwards events to the external notification
//!   service over a webhook.

pub mod bus;
pub mod delivery;
pub mod gateway;
pub mod notifier;
pub mod persistence;

pub use bus::{EventBus, NotificationEvent};
pub use delivery::webhook::WebhookDelivery;
pub use gateway::NotificationGateway;
pub use notifier::Notifier;
pub use persistence::EventPersistence;
