//! Orchestrator API (C9): the plain async operation surface consumed
//! by whatever external layer exposes this subsystem. Not a web
//! handler layer itself.

pub mod progress;

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value as Json;

use orch_db::pagination::{Page, Pagination};
use orch_db::repo::traits::{NewTask, OrchestrationStats, TaskFilters, TaskRepository};
use orch_domain::context::{reserved_data_keys, StepResult, TransitionRecord};
use orch_domain::ids::TaskId;
use orch_domain::state_token::StateToken;
use orch_domain::task::Task;

use crate::context::ContextStore;
use crate::error::OrchestratorError;
use crate::notification::NotificationDispatcher;
use crate::scheduler::{ExecuteOutcome, Scheduler};
use crate::state::StateManager;

/// `{state, progressPercent, history, stepResultSummaries}`, per
/// `getStatus`'s literal response shape.
#[derive(Debug, Clone, Serialize)]
pub struct TaskStatus {
    pub state: StateToken,
    pub progress_percent: u8,
    pub history: Vec<TransitionRecord>,
    pub step_result_summaries: HashMap<String, String>,
}

/// The orchestration core's public operation surface.
pub struct OrchestratorApi {
    task_repo: Arc<dyn TaskRepository>,
    context_store: Arc<ContextStore>,
    state_manager: Arc<StateManager>,
    scheduler: Arc<Scheduler>,
    notifications: Arc<NotificationDispatcher>,
}

impl OrchestratorApi {
    #[must_use]
    pub fn new(
        task_repo: Arc<dyn TaskRepository>,
        context_store: Arc<ContextStore>,
        state_manager: Arc<StateManager>,
        scheduler: Arc<Scheduler>,
        notifications: Arc<NotificationDispatcher>,
    ) -> Self {
        Self {
            task_repo,
            context_store,
            state_manager,
            scheduler,
            notifications,
        }
    }

    /// Creates the task descriptor row. Not itself one of spec's named
    /// verbs, but the only way to obtain a `TaskId` to pass to
    /// `initialize_task`.
    pub async fn create_task(&self, new_task: NewTask) -> Result<Task, OrchestratorError> {
        Ok(self.task_repo.create(&new_task).await?)
    }

    /// Creates the context and leaves the task in `initialized`. The
    /// caller still calls `execute_task` to enqueue the first step.
    pub async fn initialize_task(
        &self,
        task_id: TaskId,
        initial_data: HashMap<String, Json>,
    ) -> Result<(), OrchestratorError> {
        let task = self
            .task_repo
            .find_by_id(&task_id)
            .await?
            .ok_or(OrchestratorError::NotFound(task_id))?;
        self.context_store.initialize(&task, initial_data).await?;
        Ok(())
    }

    /// Admits or queues the task's processing loop.
    pub async fn execute_task(&self, task_id: TaskId) -> Result<ExecuteOutcome, OrchestratorError> {
        self.scheduler.submit(task_id).await
    }

    /// No-op, returning the current (already-`paused`) state, if the
    /// task is already paused.
    pub async fn pause_task(&self, task_id: TaskId) -> Result<StateToken, OrchestratorError> {
        let current = self.state_manager.get_current_state(task_id).await?;
        if current == StateToken::Paused {
            return Ok(current);
        }
        if current.is_terminal() {
            return Err(OrchestratorError::InvalidState {
                task_id,
                reason: "cannot pause a terminal task".to_string(),
            });
        }

        self.context_store
            .update(
                task_id,
                reserved_data_keys::PRIOR_STATE_BEFORE_PAUSE,
                serde_json::Value::String(current.name()),
            )
            .await?;
        self.state_manager
            .update_state(task_id, StateToken::Paused, None, Json::Null)
            .await?;
        Ok(StateToken::Paused)
    }

    /// Restores the state captured by `pause_task` and re-submits the
    /// task to the scheduler.
    pub async fn resume_task(&self, task_id: TaskId) -> Result<StateToken, OrchestratorError> {
        let current = self.state_manager.get_current_state(task_id).await?;
        if current != StateToken::Paused {
            return Err(OrchestratorError::InvalidState {
                task_id,
                reason: "resumeTask is only valid from paused".to_string(),
            });
        }

        let context = self.context_store.get(task_id).await?;
        let prior = context
            .data
            .get(reserved_data_keys::PRIOR_STATE_BEFORE_PAUSE)
            .and_then(Json::as_str)
            .and_then(|s| s.parse::<StateToken>().ok())
            .unwrap_or(StateToken::Initialized);

        self.state_manager
            .update_state(task_id, prior, None, Json::Null)
            .await?;
        self.scheduler.submit(task_id).await?;
        Ok(prior)
    }

    /// No-op if the task is already terminal. Otherwise signals the
    /// running processor's cancellation token (if any active loop
    /// owns it) or, for a task not currently being processed, commits
    /// `failed` directly.
    pub async fn cancel_task(&self, task_id: TaskId) -> Result<(), OrchestratorError> {
        let current = self.state_manager.get_current_state(task_id).await?;
        if current.is_terminal() {
            return Ok(());
        }

        if self.scheduler.is_active(task_id) {
            self.scheduler.cancel(task_id);
            return Ok(());
        }

        self.state_manager
            .update_state(
                task_id,
                StateToken::Failed,
                Some("cancelled".to_string()),
                Json::Null,
            )
            .await?;
        Ok(())
    }

    /// Merges `input` under `data.userInput[step_name]`, then advances
    /// to `data.nextStateAfterInput` (or `task_understanding` if none
    /// was recorded) and re-enters the processing loop.
    pub async fn provide_user_input(
        &self,
        task_id: TaskId,
        step_name: &str,
        input: Json,
    ) -> Result<(), OrchestratorError> {
        let current = self.state_manager.get_current_state(task_id).await?;
        if current != StateToken::WaitingForInput {
            return Err(OrchestratorError::InvalidState {
                task_id,
                reason: "provideUserInput is only valid from waiting_for_input".to_string(),
            });
        }

        self.context_store
            .update(
                task_id,
                &format!("{}.{step_name}", reserved_data_keys::USER_INPUT),
                input,
            )
            .await?;

        let context = self.context_store.get(task_id).await?;
        let next_state = context
            .data
            .get(reserved_data_keys::NEXT_STATE_AFTER_INPUT)
            .and_then(Json::as_str)
            .and_then(|s| s.parse::<StateToken>().ok())
            .unwrap_or(StateToken::Initialized);

        self.state_manager
            .update_state(task_id, next_state, None, Json::Null)
            .await?;
        self.scheduler.submit(task_id).await?;
        Ok(())
    }

    /// Pure projection of durable state; never fails once the task
    /// exists.
    pub async fn get_status(&self, task_id: TaskId) -> Result<TaskStatus, OrchestratorError> {
        let context = self.context_store.get(task_id).await?;
        let summaries = context
            .step_results
            .iter()
            .map(|(name, result)| (name.clone(), result.summary.clone()))
            .collect();
        Ok(TaskStatus {
            state: context.current_state,
            progress_percent: progress::progress_percent(context.current_state, &context.history),
            history: context.history,
            step_result_summaries: summaries,
        })
    }

    pub async fn get_step_result(
        &self,
        task_id: TaskId,
        step_name: &str,
    ) -> Result<Option<StepResult>, OrchestratorError> {
        let context = self.context_store.get(task_id).await?;
        Ok(context.step_results.get(step_name).cloned())
    }

    pub async fn list_tasks(
        &self,
        filters: TaskFilters,
        pagination: Pagination,
    ) -> Result<Page<Task>, OrchestratorError> {
        self.task_repo
            .list(&filters, pagination)
            .await
            .map_err(|e| OrchestratorError::Internal(e.to_string()))
    }

    pub async fn get_orchestration_stats(&self) -> Result<OrchestrationStats, OrchestratorError> {
        self.task_repo
            .stats()
            .await
            .map_err(|e| OrchestratorError::Internal(e.to_string()))
    }
}
