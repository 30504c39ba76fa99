//! Resolves recipients and channels for a notification and fans out
//! delivery concurrently, per spec §4.7.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use futures::future::join_all;

use orch_common::config::ChannelsConfig;
use orch_db::repo::traits::{NotificationRepository, SubscriberResolver};
use orch_domain::enums::{NotificationChannelKind, NotificationPriority};
use orch_domain::ids::{ProjectId, TaskId};
use orch_domain::notification::Notification;

use super::channel::NotificationChannel;
use crate::error::OrchestratorError;

/// Fans a notification out to every subscriber across every enabled
/// channel. Delivery failures are logged, never propagated: a
/// misbehaving webhook endpoint must not fail the orchestration step
/// that triggered the notification.
pub struct NotificationDispatcher {
    channels: HashMap<NotificationChannelKind, Arc<dyn NotificationChannel>>,
    subscribers: Arc<dyn SubscriberResolver>,
    notification_repo: Arc<dyn NotificationRepository>,
    config: ChannelsConfig,
}

impl NotificationDispatcher {
    #[must_use]
    pub fn new(
        channels: HashMap<NotificationChannelKind, Arc<dyn NotificationChannel>>,
        subscribers: Arc<dyn SubscriberResolver>,
        notification_repo: Arc<dyn NotificationRepository>,
        config: ChannelsConfig,
    ) -> Self {
        Self {
            channels,
            subscribers,
            notification_repo,
            config,
        }
    }

    /// Persists `notification`, then (if enabled and at/above the
    /// configured minimum priority) resolves subscribers and delivers
    /// to every applicable channel concurrently.
    pub async fn dispatch(
        &self,
        notification: Notification,
        task_id: Option<TaskId>,
        project_id: Option<ProjectId>,
    ) -> Result<(), OrchestratorError> {
        self.notification_repo
            .create(notification.clone())
            .await
            .map_err(|e| OrchestratorError::Internal(e.to_string()))?;

        if !self.config.enabled {
            return Ok(());
        }

        let min_priority = NotificationPriority::from_str(&self.config.min_priority)
            .unwrap_or(NotificationPriority::Low);
        if notification.priority < min_priority {
            return Ok(());
        }

        let recipients = self
            .subscribers
            .resolve_for_task(
                &task_id.unwrap_or_else(TaskId::new),
                project_id.as_ref(),
            )
            .await
            .map_err(|e| OrchestratorError::Internal(e.to_string()))?;

        let kinds = self.channels_for(notification.priority);
        let futures = recipients.into_iter().flat_map(|user_id| {
            kinds.iter().filter_map(move |kind| {
                self.channels.get(kind).map(|channel| {
                    let channel = channel.clone();
                    let notification = notification.clone();
                    async move {
                        if let Err(err) = channel.send(&notification, user_id).await {
                            tracing::warn!(
                                %user_id,
                                channel = %channel.kind(),
                                error = %err,
                                "notification delivery failed"
                            );
                        }
                    }
                })
            })
        });
        join_all(futures).await;

        Ok(())
    }

    /// The configured default channels, plus websocket whenever
    /// priority is high enough to warrant a live push regardless of
    /// what's in `defaults`.
    fn channels_for(&self, priority: NotificationPriority) -> Vec<NotificationChannelKind> {
        let mut kinds: Vec<NotificationChannelKind> = self
            .config
            .defaults
            .iter()
            .filter_map(|name| NotificationChannelKind::from_str(name).ok())
            .collect();
        if priority >= NotificationPriority::High && !kinds.contains(&NotificationChannelKind::Websocket) {
            kinds.push(NotificationChannelKind::Websocket);
        }
        kinds
    }
}
