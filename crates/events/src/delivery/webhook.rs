//! Webhook delivery to the notification service.
//!
//! The body is the JSON-encoded [`NotificationEvent`]. Network failures and
//! 5xx answers are retried on a fixed backoff schedule (1 s, 2 s, 4 s); a
//! 4xx answer means the service rejected the event and is not retried.

use std::time::Duration;

use crate::bus::NotificationEvent;

const DEFAULT_BACKOFF: [Duration; 3] = [
    Duration::from_secs(1),
    Duration::from_secs(2),
    Duration::from_secs(4),
];

/// Per-attempt HTTP timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    /// Network, DNS or timeout failure.
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Webhook returned HTTP {0}")]
    HttpStatus(u16),
}

impl WebhookError {
    fn is_retryable(&self) -> bool {
        match self {
            WebhookError::Request(_) => true,
            WebhookError::HttpStatus(code) => *code >= 500 || *code == 429,
        }
    }
}

pub struct WebhookDelivery {
    client: reqwest::Client,
    backoff: Vec<Duration>,
}

impl WebhookDelivery {
    pub fn new() -> Result<Self, WebhookError> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            backoff: DEFAULT_BACKOFF.to_vec(),
        })
    }

    /// Override the backoff schedule; one retry per entry.
    pub fn with_backoff(mut self, backoff: Vec<Duration>) -> Self {
        self.backoff = backoff;
        self
    }

    /// POST `event` to `url`, making at most `backoff.len() + 1` attempts.
    pub async fn deliver(&self, url: &str, event: &NotificationEvent) -> Result<(), WebhookError> {
        let mut delays = self.backoff.iter();
        let mut attempt = 1;
        loop {
            let err = match self.send_once(url, event).await {
                Ok(()) => return Ok(()),
                Err(e) => e,
            };
            let next = delays.next().filter(|_| err.is_retryable());
            let Some(delay) = next else {
                tracing::error!(
                    attempt,
                    url,
                    event_type = %event.event_type,
                    error = %err,
                    "Webhook delivery gave up"
                );
                return Err(err);
            };
            tracing::warn!(
                attempt,
                url,
                event_type = %event.event_type,
                error = %err,
                retry_in = ?delay,
                "Webhook delivery attempt failed"
            );
            tokio::time::sleep(*delay).await;
            attempt += 1;
        }
    }

    async fn send_once(&self, url: &str, event: &NotificationEvent) -> Result<(), WebhookError> {
        let response = self.client.post(url).json(event).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(WebhookError::HttpStatus(status.as_u16()));
        }
        Ok(())
    }
}
