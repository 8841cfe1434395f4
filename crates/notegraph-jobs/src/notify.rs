//! Notification channels for clarification questions.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

use notegraph_core::{new_v7, Error, Notification, NotificationChannel, Result};

use crate::config::NotificationConfig;

/// Posts notifications as JSON to a webhook.
///
/// The request body is the serialized [`Notification`]. The receiver answers
/// with `{"message_id": "..."}`, which becomes the clarification's message
/// reference.
pub struct WebhookChannel {
    client: Client,
    url: String,
}

#[derive(Debug, Deserialize)]
struct WebhookReply {
    message_id: Option<String>,
}

impl WebhookChannel {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Notification(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    async fn send(&self, notification: &Notification) -> Result<String> {
        let response = self
            .client
            .post(&self.url)
            .json(notification)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Timeout(format!("notification webhook timed out: {}", e))
                } else {
                    Error::Notification(format!("webhook request failed: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Notification(format!("webhook returned {}", status)));
        }

        let reply: WebhookReply = response
            .json()
            .await
            .map_err(|e| Error::Notification(format!("invalid webhook reply: {}", e)))?;
        let message_id = reply
            .message_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| Error::Notification("webhook reply has no message_id".to_string()))?;

        debug!(
            subsystem = "jobs",
            component = "notify",
            channel = "webhook",
            message_ref = %message_id,
            "Notification delivered"
        );
        Ok(message_id)
    }

    fn name(&self) -> &str {
        "webhook"
    }
}

/// Logs notifications instead of delivering them.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogChannel;

#[async_trait]
impl NotificationChannel for LogChannel {
    async fn send(&self, notification: &Notification) -> Result<String> {
        let message_ref = format!("log-{}", new_v7());
        info!(
            subsystem = "jobs",
            component = "notify",
            channel = "log",
            recipient = %notification.recipient,
            message_ref = %message_ref,
            text = %notification.text,
            "Clarification question (log-only channel)"
        );
        Ok(message_ref)
    }

    fn name(&self) -> &str {
        "log"
    }
}

/// Channel selected by configuration.
pub fn channel_from_config(config: &NotificationConfig) -> Result<Arc<dyn NotificationChannel>> {
    match &config.webhook_url {
        Some(url) => Ok(Arc::new(WebhookChannel::new(
            url.clone(),
            Duration::from_secs(config.timeout_secs),
        )?)),
        None => Ok(Arc::new(LogChannel)),
    }
}
