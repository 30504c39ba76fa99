//! Per-user broadcast channels backing the websocket delivery channel.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};

use orch_domain::ids::UserId;
use orch_domain::notification::Notification;

const CHANNEL_CAPACITY: usize = 256;

/// Fans out notifications to whatever websocket connections are
/// currently subscribed for a user. Connections are external to this
/// crate; the hub only owns the broadcast plumbing.
#[derive(Default)]
pub struct NotificationHub {
    channels: RwLock<HashMap<UserId, broadcast::Sender<Notification>>>,
}

impl NotificationHub {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn subscribe(&self, user_id: UserId) -> broadcast::Receiver<Notification> {
        let channels = self.channels.read().await;
        if let Some(sender) = channels.get(&user_id) {
            return sender.subscribe();
        }
        drop(channels);

        let mut channels = self.channels.write().await;
        let sender = channels
            .entry(user_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Returns `Ok(())` even if nobody is subscribed; a missing
    /// receiver is not a delivery failure.
    pub async fn publish(&self, user_id: UserId, notification: Notification) {
        let channels = self.channels.read().await;
        if let Some(sender) = channels.get(&user_id) {
            let _ = sender.send(notification);
        }
    }
}
