//! The Orchestrator's public error taxonomy, surfaced by every C9
//! operation to callers.

use orch_db::repo::errors::{
    CreateTaskError, FindTaskError, GetContextError, InitializeContextError, ReadStateError,
    ReconcileStateError, UpdateContextError, UpdateTaskError, WriteStateError,
};
use orch_domain::ids::TaskId;
use thiserror::Error;

/// Kinds surfaced by the orchestration core to callers.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("task not found: {0}")]
    NotFound(TaskId),

    #[error("operation not allowed in current state for task {task_id}: {reason}")]
    InvalidState { task_id: TaskId, reason: String },

    #[error("transition rejected for task {task_id}: {from} -> {to} is not admissible")]
    InvalidTransition {
        task_id: TaskId,
        from: String,
        to: String,
    },

    #[error("validation failed: {0}")]
    ValidationError(String),

    #[error("task already exists: {0}")]
    AlreadyExists(TaskId),

    #[error("resource exhausted: {0}")]
    ResourceError(String),

    #[error("task {0} was cancelled")]
    Cancelled(TaskId),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<FindTaskError> for OrchestratorError {
    fn from(e: FindTaskError) -> Self {
        match e {
            FindTaskError::NotFound(id) => Self::NotFound(id),
            FindTaskError::Database(err) => Self::Internal(err.to_string()),
        }
    }
}

impl From<CreateTaskError> for OrchestratorError {
    fn from(e: CreateTaskError) -> Self {
        match e {
            CreateTaskError::AlreadyExists(id) => Self::AlreadyExists(id),
            CreateTaskError::Database(err) => Self::Internal(err.to_string()),
        }
    }
}

impl From<UpdateTaskError> for OrchestratorError {
    fn from(e: UpdateTaskError) -> Self {
        match e {
            UpdateTaskError::NotFound(id) => Self::NotFound(id),
            UpdateTaskError::Database(err) => Self::Internal(err.to_string()),
        }
    }
}

impl From<GetContextError> for OrchestratorError {
    fn from(e: GetContextError) -> Self {
        match e {
            GetContextError::NotFound(id) => Self::NotFound(id),
            GetContextError::Database(err) => Self::Internal(err.to_string()),
        }
    }
}

impl From<InitializeContextError> for OrchestratorError {
    fn from(e: InitializeContextError) -> Self {
        match e {
            InitializeContextError::AlreadyExists(id) => Self::AlreadyExists(id),
            InitializeContextError::Database(err) => Self::Internal(err.to_string()),
        }
    }
}

impl From<UpdateContextError> for OrchestratorError {
    fn from(e: UpdateContextError) -> Self {
        match e {
            UpdateContextError::NotFound(id) => Self::NotFound(id),
            UpdateContextError::Database(err) => Self::Internal(err.to_string()),
        }
    }
}

impl From<ReadStateError> for OrchestratorError {
    fn from(e: ReadStateError) -> Self {
        match e {
            ReadStateError::TaskNotFound(id) => Self::NotFound(id),
            ReadStateError::Database(err) => Self::Internal(err.to_string()),
        }
    }
}

impl From<WriteStateError> for OrchestratorError {
    fn from(e: WriteStateError) -> Self {
        match e {
            WriteStateError::TaskNotFound(id) => Self::NotFound(id),
            WriteStateError::Database(err) => Self::Internal(err.to_string()),
        }
    }
}

impl From<ReconcileStateError> for OrchestratorError {
    fn from(e: ReconcileStateError) -> Self {
        match e {
            ReconcileStateError::TaskNotFound(id) => Self::NotFound(id),
            ReconcileStateError::NoHistory(id) => {
                Self::Internal(format!("no transition history for task {id}"))
            }
            ReconcileStateError::Database(err) => Self::Internal(err.to_string()),
        }
    }
}
