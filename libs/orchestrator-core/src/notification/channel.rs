//! The four delivery channels behind one trait, per spec's channel
//! list: websocket, webhook, email, system log.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use orch_db::repo::traits::NotificationRepository;
use orch_domain::enums::NotificationChannelKind;
use orch_domain::ids::UserId;
use orch_domain::notification::Notification;

use super::hub::NotificationHub;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("webhook delivery failed: {0}")]
    Webhook(String),
    #[error("persistence failed: {0}")]
    Persistence(String),
}

/// One delivery mechanism for a notification. Never surfaces errors
/// to the originating operation; the dispatcher logs and continues.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn kind(&self) -> NotificationChannelKind;

    async fn send(&self, notification: &Notification, recipient: UserId) -> Result<(), ChannelError>;
}

/// Pushes onto the per-user broadcast hub; delivery is fire-and-forget
/// to whatever websocket connections are currently live.
pub struct WebsocketChannel {
    hub: Arc<NotificationHub>,
}

impl WebsocketChannel {
    #[must_use]
    pub fn new(hub: Arc<NotificationHub>) -> Self {
        Self { hub }
    }
}

#[async_trait]
impl NotificationChannel for WebsocketChannel {
    fn kind(&self) -> NotificationChannelKind {
        NotificationChannelKind::Websocket
    }

    async fn send(&self, notification: &Notification, recipient: UserId) -> Result<(), ChannelError> {
        self.hub.publish(recipient, notification.clone()).await;
        Ok(())
    }
}

/// POSTs the notification payload to a configured endpoint.
pub struct WebhookChannel {
    client: reqwest::Client,
    endpoint: String,
}

impl WebhookChannel {
    #[must_use]
    pub fn new(client: reqwest::Client, endpoint: String) -> Self {
        Self { client, endpoint }
    }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    fn kind(&self) -> NotificationChannelKind {
        NotificationChannelKind::Webhook
    }

    async fn send(&self, notification: &Notification, recipient: UserId) -> Result<(), ChannelError> {
        let body = serde_json::json!({
            "recipient": recipient.to_string(),
            "notification": notification,
        });
        self.client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| ChannelError::Webhook(e.to_string()))?
            .error_for_status()
            .map_err(|e| ChannelError::Webhook(e.to_string()))?;
        Ok(())
    }
}

/// Trait-only stub; concrete SMTP/provider wiring is an external
/// collaborator.
pub struct EmailChannel;

#[async_trait]
impl NotificationChannel for EmailChannel {
    fn kind(&self) -> NotificationChannelKind {
        NotificationChannelKind::Email
    }

    async fn send(&self, _notification: &Notification, _recipient: UserId) -> Result<(), ChannelError> {
        Ok(())
    }
}

/// Persists the notification to the durable log; always available
/// regardless of `ChannelsConfig.enabled`.
pub struct SystemLogChannel {
    repo: Arc<dyn NotificationRepository>,
}

impl SystemLogChannel {
    #[must_use]
    pub fn new(repo: Arc<dyn NotificationRepository>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl NotificationChannel for SystemLogChannel {
    fn kind(&self) -> NotificationChannelKind {
        NotificationChannelKind::SystemLog
    }

    async fn send(&self, notification: &Notification, _recipient: UserId) -> Result<(), ChannelError> {
        tracing::info!(
            notification_id = %notification.id,
            title = %notification.title,
            "notification"
        );
        Ok(())
    }
}
