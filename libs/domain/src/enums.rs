//! Enum types for the task orchestration domain.
//!
//! These enums are the source of truth for the closed enumerations
//! described in the orchestration spec and must match the SQL enum
//! types exactly.

use serde::{Deserialize, Serialize};
use typeshare::typeshare;

// =============================================================================
// Task Descriptor Enums
// =============================================================================

/// Priority of a task, set at creation and immutable thereafter.
#[typeshare]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
    Critical,
}

/// Type of development task being orchestrated.
#[typeshare]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "label")]
pub enum TaskType {
    Feature,
    BugFix,
    Refactor,
    Documentation,
    Other(String),
}

// =============================================================================
// Notification Enums
// =============================================================================

/// Kind of notification emitted by the dispatcher.
#[typeshare]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    Info,
    Success,
    Warning,
    Error,
    Progress,
    ActionRequired,
}

/// Delivery priority of a notification.
#[typeshare]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationPriority {
    Low,
    Medium,
    High,
    Critical,
}

impl std::str::FromStr for NotificationPriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            other => Err(format!("unknown notification priority: {other}")),
        }
    }
}

impl NotificationType {
    /// Default priority for a notification type absent a `critical` flag override.
    #[must_use]
    pub fn default_priority(self) -> NotificationPriority {
        match self {
            Self::Error => NotificationPriority::High,
            Self::ActionRequired => NotificationPriority::High,
            Self::Warning => NotificationPriority::Medium,
            Self::Success | Self::Info | Self::Progress => NotificationPriority::Low,
        }
    }
}

/// Notification delivery channel.
#[typeshare]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationChannelKind {
    Websocket,
    SystemLog,
    Webhook,
    Email,
}

impl NotificationChannelKind {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Websocket => "websocket",
            Self::SystemLog => "system_log",
            Self::Webhook => "webhook",
            Self::Email => "email",
        }
    }
}

impl std::str::FromStr for NotificationChannelKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "websocket" => Ok(Self::Websocket),
            "system_log" => Ok(Self::SystemLog),
            "webhook" => Ok(Self::Webhook),
            "email" => Ok(Self::Email),
            other => Err(format!("unknown notification channel: {other}")),
        }
    }
}

impl std::fmt::Display for NotificationChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

// =============================================================================
// Recovery Enums
// =============================================================================

/// Classification of a step-execution error.
#[typeshare]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    ValidationError,
    SchemaError,
    LlmError,
    DbError,
    GitError,
    NetworkError,
    TimeoutError,
    ExecutionError,
    ResourceError,
    OrchestrationError,
    UnknownError,
}

/// Recovery strategy chosen for a failed step.
#[typeshare]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStrategy {
    Retry,
    RetryWithBackoff,
    AlternativeApproach,
    HumanIntervention,
    CompensatingAction,
    SkipStep,
    Abort,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_priority_mapping() {
        assert_eq!(
            NotificationType::Error.default_priority(),
            NotificationPriority::High
        );
        assert_eq!(
            NotificationType::ActionRequired.default_priority(),
            NotificationPriority::High
        );
        assert_eq!(
            NotificationType::Warning.default_priority(),
            NotificationPriority::Medium
        );
        assert_eq!(
            NotificationType::Success.default_priority(),
            NotificationPriority::Low
        );
        assert_eq!(
            NotificationType::Info.default_priority(),
            NotificationPriority::Low
        );
        assert_eq!(
            NotificationType::Progress.default_priority(),
            NotificationPriority::Low
        );
    }

    #[test]
    fn test_priority_ordering() {
        assert!(NotificationPriority::Critical > NotificationPriority::High);
        assert!(TaskPriority::Critical > TaskPriority::Low);
    }

    #[test]
    fn test_task_type_other_serializes_label() {
        let t = TaskType::Other("spike".to_string());
        let json = serde_json::to_string(&t).unwrap();
        assert!(json.contains("spike"));
    }
}
