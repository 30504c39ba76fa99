//! The notification record fanned out by the Notification Dispatcher.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use typeshare::typeshare;

use crate::enums::{NotificationPriority, NotificationType};
use crate::ids::{NotificationId, ProjectId, TaskId};

/// A notification event, addressed to zero or more delivery channels.
#[typeshare]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: NotificationId,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub priority: NotificationPriority,
    pub task_id: Option<TaskId>,
    pub project_id: Option<ProjectId>,
    pub title: String,
    pub message: String,
    pub data: Json,
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    /// Build a notification, defaulting priority from `notification_type`
    /// unless an explicit override is given.
    #[must_use]
    pub fn new(
        notification_type: NotificationType,
        priority_override: Option<NotificationPriority>,
        task_id: Option<TaskId>,
        project_id: Option<ProjectId>,
        title: String,
        message: String,
        data: Json,
    ) -> Self {
        Self {
            id: NotificationId::new(),
            priority: priority_override.unwrap_or_else(|| notification_type.default_priority()),
            notification_type,
            task_id,
            project_id,
            title,
            message,
            data,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_priority_applied() {
        let n = Notification::new(
            NotificationType::Error,
            None,
            Some(TaskId::new()),
            None,
            "Step failed".to_string(),
            "code_generation failed".to_string(),
            Json::Null,
        );
        assert_eq!(n.priority, NotificationPriority::High);
    }

    #[test]
    fn test_priority_override_respected() {
        let n = Notification::new(
            NotificationType::Info,
            Some(NotificationPriority::Critical),
            None,
            None,
            "t".to_string(),
            "m".to_string(),
            Json::Null,
        );
        assert_eq!(n.priority, NotificationPriority::Critical);
    }
}
