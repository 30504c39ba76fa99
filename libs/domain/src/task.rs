//! The task descriptor: immutable creation fields plus the mutable
//! lifecycle fields the State Manager owns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use typeshare::typeshare;

use crate::enums::{TaskPriority, TaskType};
use crate::ids::{ProjectId, TaskId, UserId};
use crate::state_token::StateToken;

/// A task under orchestration.
///
/// Descriptor fields (`title` through `tags`) are set at creation and
/// never mutated. Lifecycle fields (`current_state`, `updated_at`,
/// `current_step`) are mutated only through the State Manager.
#[typeshare]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    pub description: String,
    pub priority: TaskPriority,
    #[serde(rename = "type")]
    pub task_type: TaskType,
    pub project_id: Option<ProjectId>,
    pub assignee: Option<UserId>,
    pub tags: Vec<String>,

    pub current_state: StateToken,
    pub updated_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    /// Machine-readable hint of the step currently executing, if any.
    pub current_step: Option<String>,
}

impl Task {
    /// Construct a new task in the `initialized` state.
    #[must_use]
    pub fn new(
        title: String,
        description: String,
        priority: TaskPriority,
        task_type: TaskType,
        project_id: Option<ProjectId>,
        assignee: Option<UserId>,
        tags: Vec<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: TaskId::new(),
            title,
            description,
            priority,
            task_type,
            project_id,
            assignee,
            tags,
            current_state: StateToken::Initialized,
            updated_at: now,
            created_at: now,
            current_step: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_task_is_initialized() {
        let task = Task::new(
            "Add login page".to_string(),
            "Implement the login UI".to_string(),
            TaskPriority::Medium,
            TaskType::Feature,
            None,
            None,
            vec!["ui".to_string()],
        );
        assert_eq!(task.current_state, StateToken::Initialized);
        assert!(task.current_step.is_none());
    }
}
