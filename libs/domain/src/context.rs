//! The per-task context record: inputs, step results, cross-step
//! hand-off data, and append-only transition history.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use typeshare::typeshare;

use crate::enums::{ErrorType, RecoveryStrategy};
use crate::ids::{ProjectId, TaskId};
use crate::state_token::StateToken;
use crate::task::Task;

/// Recovery metadata attached to a step result after one or more
/// failed attempts.
#[typeshare]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryMeta {
    pub attempts: u32,
    pub last_error_type: Option<ErrorType>,
    pub last_strategy: Option<RecoveryStrategy>,
}

impl Default for RecoveryMeta {
    fn default() -> Self {
        Self {
            attempts: 0,
            last_error_type: None,
            last_strategy: None,
        }
    }
}

/// Result record for a single step execution.
#[typeshare]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    pub success: bool,
    pub summary: String,
    pub payload: Json,
    pub timestamp: DateTime<Utc>,
    /// Wall-clock duration of the step execution, in milliseconds.
    pub duration_ms: u64,
    #[serde(default)]
    pub recovery: RecoveryMeta,
}

/// A single append-only transition record within a context's history.
#[typeshare]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionRecord {
    pub task_id: TaskId,
    pub from_state: StateToken,
    pub to_state: StateToken,
    pub message: Option<String>,
    pub metadata: Json,
    pub timestamp: DateTime<Utc>,
}

/// The reserved sub-keys of `Context.data` that the orchestration core
/// itself reads and writes, as opposed to step-executor-private keys.
pub mod reserved_data_keys {
    /// Free-form map of pending input requested while `waiting_for_input`.
    pub const USER_INPUT: &str = "userInput";
    /// The state to re-enter once `provideUserInput` is called.
    pub const NEXT_STATE_AFTER_INPUT: &str = "nextStateAfterInput";
    /// The state `pauseTask` captured, restored verbatim by `resumeTask`.
    pub const PRIOR_STATE_BEFORE_PAUSE: &str = "priorStateBeforePause";
}

/// The durable per-task record the Context Store owns.
#[typeshare]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Context {
    pub task_id: TaskId,
    pub project_id: Option<ProjectId>,
    pub task: Task,
    /// Cache of the authoritative State Manager value; must agree with
    /// it at every quiescent point.
    pub current_state: StateToken,
    pub step_results: HashMap<String, StepResult>,
    pub data: HashMap<String, Json>,
    pub history: Vec<TransitionRecord>,
}

impl Context {
    /// Create a new context for a task, seeded with `initial_data`.
    #[must_use]
    pub fn initialize(task: Task, initial_data: HashMap<String, Json>) -> Self {
        Self {
            task_id: task.id,
            project_id: task.project_id,
            current_state: task.current_state,
            task,
            step_results: HashMap::new(),
            data: initial_data,
            history: Vec::new(),
        }
    }

    /// Merge a step result under `stepResults[stepName]`, preserving
    /// the prior attempt counter if the new result carries none.
    pub fn add_step_result(&mut self, step_name: &str, mut result: StepResult) {
        if let Some(prior) = self.step_results.get(step_name) {
            if result.recovery.attempts == 0 {
                result.recovery.attempts = prior.recovery.attempts;
            }
        }
        self.step_results.insert(step_name.to_string(), result);
    }

    /// Append a transition record to history. History is never mutated
    /// after being appended.
    pub fn push_history(&mut self, record: TransitionRecord) {
        self.history.push(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enums::{TaskPriority, TaskType};

    fn sample_task() -> Task {
        Task::new(
            "t".to_string(),
            "d".to_string(),
            TaskPriority::Low,
            TaskType::Feature,
            None,
            None,
            vec![],
        )
    }

    #[test]
    fn test_add_step_result_preserves_attempts() {
        let mut ctx = Context::initialize(sample_task(), HashMap::new());
        let mut first = StepResult {
            success: false,
            summary: "failed once".to_string(),
            payload: Json::Null,
            timestamp: Utc::now(),
            duration_ms: 10,
            recovery: RecoveryMeta::default(),
        };
        first.recovery.attempts = 2;
        ctx.add_step_result("code_generation", first);

        let second = StepResult {
            success: true,
            summary: "succeeded".to_string(),
            payload: Json::Null,
            timestamp: Utc::now(),
            duration_ms: 20,
            recovery: RecoveryMeta::default(),
        };
        ctx.add_step_result("code_generation", second);

        let stored = ctx.step_results.get("code_generation").unwrap();
        assert!(stored.success);
        assert_eq!(stored.recovery.attempts, 2);
    }

    #[test]
    fn test_history_append_only_order() {
        let mut ctx = Context::initialize(sample_task(), HashMap::new());
        ctx.push_history(TransitionRecord {
            task_id: ctx.task_id,
            from_state: StateToken::Initialized,
            to_state: StateToken::Phase(crate::state_token::Phase::TaskUnderstanding),
            message: None,
            metadata: Json::Null,
            timestamp: Utc::now(),
        });
        assert_eq!(ctx.history.len(), 1);
    }
}
