//! Reads/writes the authoritative current-state token and enforces the
//! admissible-transitions table before any write commits.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value as Json;

use orch_db::repo::traits::{ContextRepository, StateRepository, TaskLifecycleUpdate, TaskRepository};
use orch_domain::context::TransitionRecord;
use orch_domain::ids::TaskId;
use orch_domain::state_token::StateToken;

use crate::error::OrchestratorError;
use crate::transition::is_admissible;
use crate::validator::Validator;

/// Returned by `update_state` on success: the `{previousState,
/// currentState, timestamp}` triple spec's step 5 describes.
#[derive(Debug, Clone, Copy)]
pub struct StateTransitionOutcome {
    pub previous_state: StateToken,
    pub current_state: StateToken,
    pub timestamp: DateTime<Utc>,
}

/// Owns writes to `currentState`. Every write goes through
/// `update_state`, which validates admissibility and record shape
/// before committing, then syncs the Context Store's cached copy and
/// the `tasks` row's lifecycle fields (`listTasks`/`getOrchestrationStats`
/// read the latter, not the authoritative `task_state` table).
pub struct StateManager {
    state_repo: Arc<dyn StateRepository>,
    context_repo: Arc<dyn ContextRepository>,
    task_repo: Arc<dyn TaskRepository>,
    validator: Arc<Validator>,
}

impl StateManager {
    #[must_use]
    pub fn new(
        state_repo: Arc<dyn StateRepository>,
        context_repo: Arc<dyn ContextRepository>,
        task_repo: Arc<dyn TaskRepository>,
        validator: Arc<Validator>,
    ) -> Self {
        Self {
            state_repo,
            context_repo,
            task_repo,
            validator,
        }
    }

    pub async fn get_current_state(&self, task_id: TaskId) -> Result<StateToken, OrchestratorError> {
        Ok(self.state_repo.get_current_state(&task_id).await?)
    }

    /// Steps 1-5 of spec §4.3: read, check admissibility, validate,
    /// commit the transition + cache sync, return the outcome.
    #[tracing::instrument(skip(self, message, metadata), fields(task_id = %task_id, next_state = %next_state))]
    pub async fn update_state(
        &self,
        task_id: TaskId,
        next_state: StateToken,
        message: Option<String>,
        metadata: Json,
    ) -> Result<StateTransitionOutcome, OrchestratorError> {
        let current = self.get_current_state(task_id).await?;

        if !is_admissible(current, next_state) {
            return Err(OrchestratorError::InvalidTransition {
                task_id,
                from: current.name(),
                to: next_state.name(),
            });
        }

        let preview_timestamp = Utc::now();
        let raw = serde_json::json!({
            "taskId": task_id.to_string(),
            "fromState": current.name(),
            "toState": next_state.name(),
            "message": message,
            "timestamp": preview_timestamp.to_rfc3339(),
        });
        let outcome = self
            .validator
            .validate_transition_record(&raw, &metadata)
            .await;
        if !outcome.is_valid() {
            return Err(OrchestratorError::ValidationError(
                outcome
                    .errors
                    .iter()
                    .map(|e| format!("{}: {}", e.path, e.message))
                    .collect::<Vec<_>>()
                    .join("; "),
            ));
        }

        let record: TransitionRecord = self
            .state_repo
            .write_transition(&task_id, next_state, message, metadata)
            .await?;

        if let Err(err) = self.context_repo.record_transition(&task_id, record.clone()).await {
            // The authoritative write already committed; a cache-sync
            // failure here leaves invariant 1 violated until the next
            // `reconcile`, so it surfaces as an internal error rather
            // than being swallowed.
            return Err(OrchestratorError::Internal(format!(
                "state committed but context cache sync failed for task {task_id}: {err}"
            )));
        }

        let current_step = match next_state {
            StateToken::Phase(p) | StateToken::PhaseCompleted(p) => Some(p.name().to_string()),
            _ => None,
        };
        if let Err(err) = self
            .task_repo
            .update_lifecycle(
                &task_id,
                &TaskLifecycleUpdate {
                    current_state: Some(next_state),
                    current_step: Some(current_step),
                },
            )
            .await
        {
            return Err(OrchestratorError::Internal(format!(
                "state committed but task lifecycle sync failed for task {task_id}: {err}"
            )));
        }

        Ok(StateTransitionOutcome {
            previous_state: current,
            current_state: next_state,
            timestamp: record.timestamp,
        })
    }

    pub async fn get_state_history(
        &self,
        task_id: TaskId,
    ) -> Result<Vec<TransitionRecord>, OrchestratorError> {
        Ok(self.state_repo.get_state_history(&task_id).await.map_err(
            |orch_db::repo::errors::ListTransitionsError::Database(e)| {
                OrchestratorError::Internal(e.to_string())
            },
        )?)
    }

    pub async fn get_last_transition(
        &self,
        task_id: TaskId,
    ) -> Result<Option<TransitionRecord>, OrchestratorError> {
        Ok(self
            .state_repo
            .get_last_transition(&task_id)
            .await
            .map_err(
                |orch_db::repo::errors::ListTransitionsError::Database(e)| {
                    OrchestratorError::Internal(e.to_string())
                },
            )?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orch_db::repo::memory::{InMemoryContextRepository, InMemoryStateRepository, InMemoryTaskRepository};
    use orch_domain::enums::{TaskPriority, TaskType};
    use orch_domain::state_token::Phase;
    use orch_domain::task::Task;
    use std::collections::HashMap;

    fn manager() -> (StateManager, TaskId, Arc<InMemoryStateRepository>, Arc<InMemoryContextRepository>) {
        let state_repo = Arc::new(InMemoryStateRepository::default());
        let context_repo = Arc::new(InMemoryContextRepository::default());
        let task_repo = Arc::new(InMemoryTaskRepository::default());
        let task = Task::new(
            "t".to_string(),
            "d".to_string(),
            TaskPriority::Low,
            TaskType::Feature,
            None,
            None,
            vec![],
        );
        let task_id = task.id;
        state_repo.seed(task_id, StateToken::Initialized);
        task_repo.seed(task.clone());
        let validator = Arc::new(Validator::new(1 << 20));
        let mgr = StateManager::new(state_repo.clone(), context_repo.clone(), task_repo, validator);
        (mgr, task_id, state_repo, context_repo)
    }

    #[tokio::test]
    async fn test_rejects_inadmissible_transition() {
        let (mgr, task_id, ..) = manager();
        let err = mgr
            .update_state(
                task_id,
                StateToken::Phase(Phase::CodeGeneration),
                None,
                Json::Null,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_admissible_transition_commits_and_syncs_context() {
        let state_repo = Arc::new(InMemoryStateRepository::default());
        let context_repo = Arc::new(InMemoryContextRepository::default());
        let task_repo = Arc::new(InMemoryTaskRepository::default());
        let task = Task::new(
            "t".to_string(),
            "d".to_string(),
            TaskPriority::Low,
            TaskType::Feature,
            None,
            None,
            vec![],
        );
        let task_id = task.id;
        state_repo.seed(task_id, StateToken::Initialized);
        task_repo.seed(task.clone());
        context_repo.initialize(&task, HashMap::new()).await.unwrap();
        let validator = Arc::new(Validator::new(1 << 20));
        let mgr = StateManager::new(state_repo, context_repo.clone(), task_repo, validator);

        let outcome = mgr
            .update_state(
                task_id,
                StateToken::Phase(Phase::TaskUnderstanding),
                Some("starting".to_string()),
                Json::Null,
            )
            .await
            .unwrap();
        assert_eq!(outcome.previous_state, StateToken::Initialized);
        assert_eq!(
            outcome.current_state,
            StateToken::Phase(Phase::TaskUnderstanding)
        );

        let ctx = context_repo.get(&task_id).await.unwrap();
        assert_eq!(ctx.current_state, StateToken::Phase(Phase::TaskUnderstanding));
        assert_eq!(ctx.history.len(), 1);
    }

    #[tokio::test]
    async fn test_current_state_not_found_for_unknown_task() {
        let (mgr, ..) = manager();
        let err = mgr.get_current_state(TaskId::new()).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::NotFound(_)));
    }
}
