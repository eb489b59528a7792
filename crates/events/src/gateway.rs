//! Forwards bus events to the external notification service.
//!
//! Delivery happens on this task, never on the publisher's, so a slow or
//! unreachable notification service cannot hold up a job or a review.

use tokio::sync::broadcast;

use crate::bus::NotificationEvent;
use crate::delivery::webhook::WebhookDelivery;

pub struct NotificationGateway {
    delivery: WebhookDelivery,
    url: String,
}

impl NotificationGateway {
    pub fn new(delivery: WebhookDelivery, url: impl Into<String>) -> Self {
        Self {
            delivery,
            url: url.into(),
        }
    }

    /// Deliver every event received until the bus is dropped.
    ///
    /// Failures are logged and the event is dropped.
    pub async fn run(self, mut receiver: broadcast::Receiver<NotificationEvent>) {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    if let Err(e) = self.delivery.deliver(&self.url, &event).await {
                        tracing::error!(
                            error = %e,
                            event_type = %event.event_type,
                            source_entity_id = ?event.source_entity_id,
                            "Notification dropped"
                        );
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Notification gateway lagged, events were not delivered");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Event bus closed, notification gateway shutting down");
                    break;
                }
            }
        }
    }
}
