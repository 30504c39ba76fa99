//! Thin facade over `ContextRepository` exposing exactly the
//! operations spec §4.2 names, translating repository errors into the
//! public `OrchestratorError` taxonomy.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value as Json;

use orch_db::repo::traits::ContextRepository;
use orch_domain::context::{Context, StepResult};
use orch_domain::ids::TaskId;
use orch_domain::task::Task;

use crate::error::OrchestratorError;
use crate::validator::Validator;

/// Owned by the State Manager for writes; readers get consistent
/// snapshots via `get`.
pub struct ContextStore {
    repo: Arc<dyn ContextRepository>,
    validator: Arc<Validator>,
}

impl ContextStore {
    #[must_use]
    pub fn new(repo: Arc<dyn ContextRepository>, validator: Arc<Validator>) -> Self {
        Self { repo, validator }
    }

    /// Idempotent on identical `initial_data`; fails with
    /// `AlreadyExists` on conflicting reinitialization.
    pub async fn initialize(
        &self,
        task: &Task,
        initial_data: HashMap<String, Json>,
    ) -> Result<Context, OrchestratorError> {
        Ok(self.repo.initialize(task, initial_data).await?)
    }

    pub async fn get(&self, task_id: TaskId) -> Result<Context, OrchestratorError> {
        Ok(self.repo.get(&task_id).await?)
    }

    /// Dotted-path update under `Context.data`.
    pub async fn update(
        &self,
        task_id: TaskId,
        path: &str,
        value: Json,
    ) -> Result<(), OrchestratorError> {
        Ok(self.repo.update_data_path(&task_id, path, value).await?)
    }

    /// Merge a step result, preserving the prior `recovery.attempts`
    /// counter when the new result carries none. Schema-checked (C1)
    /// before it reaches the repository.
    pub async fn add_step_result(
        &self,
        task_id: TaskId,
        step_name: &str,
        result: StepResult,
    ) -> Result<(), OrchestratorError> {
        let raw = serde_json::to_value(&result)
            .map_err(|e| OrchestratorError::Internal(format!("step result is not serializable: {e}")))?;
        let outcome = self.validator.validate_step_result(&raw, &result.payload).await;
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
        Ok(self.repo.add_step_result(&task_id, step_name, result).await?)
    }
}
