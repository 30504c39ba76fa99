//! Per-operation repository errors
//!
//! Each repository operation has its own error type for precise error handling.

use orch_domain::ids::{NotificationId, ProjectId, TaskId, UserId};
use orch_domain::state_token::StateToken;
use thiserror::Error;

// =============================================================================
// Task Repository Errors
// =============================================================================

#[derive(Debug, Error)]
pub enum CreateTaskError {
    #[error("task already exists: {0}")]
    AlreadyExists(TaskId),
    #[error("database error")]
    Database(#[source] sqlx::Error),
}

#[derive(Debug, Error)]
pub enum FindTaskError {
    #[error("task not found: {0}")]
    NotFound(TaskId),
    #[error("database error")]
    Database(#[source] sqlx::Error),
}

#[derive(Debug, Error)]
pub enum UpdateTaskError {
    #[error("task not found: {0}")]
    NotFound(TaskId),
    #[error("database error")]
    Database(#[source] sqlx::Error),
}

#[derive(Debug, Error)]
pub enum ListTasksError {
    #[error("database error")]
    Database(#[source] sqlx::Error),
}

// =============================================================================
// Context Store Errors
// =============================================================================

#[derive(Debug, Error)]
pub enum InitializeContextError {
    #[error("context already exists for task {0} with conflicting initial data")]
    AlreadyExists(TaskId),
    #[error("database error")]
    Database(#[source] sqlx::Error),
}

#[derive(Debug, Error)]
pub enum GetContextError {
    #[error("context not found for task {0}")]
    NotFound(TaskId),
    #[error("database error")]
    Database(#[source] sqlx::Error),
}

#[derive(Debug, Error)]
pub enum UpdateContextError {
    #[error("context not found for task {0}")]
    NotFound(TaskId),
    #[error("database error")]
    Database(#[source] sqlx::Error),
}

// =============================================================================
// State Manager / Transition Repository Errors
// =============================================================================

#[derive(Debug, Error)]
pub enum WriteStateError {
    #[error("task not found: {0}")]
    TaskNotFound(TaskId),
    #[error("database error")]
    Database(#[source] sqlx::Error),
}

#[derive(Debug, Error)]
pub enum ReadStateError {
    #[error("task not found: {0}")]
    TaskNotFound(TaskId),
    #[error("database error")]
    Database(#[source] sqlx::Error),
}

#[derive(Debug, Error)]
pub enum ReconcileStateError {
    #[error("task not found: {0}")]
    TaskNotFound(TaskId),
    #[error("no transition history to reconcile from for task {0}")]
    NoHistory(TaskId),
    #[error("database error")]
    Database(#[source] sqlx::Error),
}

#[derive(Debug, Error)]
pub enum AppendTransitionError {
    #[error("task not found: {0}")]
    TaskNotFound(TaskId),
    #[error("database error")]
    Database(#[source] sqlx::Error),
}

#[derive(Debug, Error)]
pub enum ListTransitionsError {
    #[error("database error")]
    Database(#[source] sqlx::Error),
}

/// Surfaced when a caller asks the State Manager for a state it never
/// observed; distinct from `TaskNotFound` since the task exists.
#[derive(Debug, Error)]
pub enum StateMismatchError {
    #[error("context cache state {cached} disagrees with authoritative state {authoritative} for task {task_id}")]
    Disagreement {
        task_id: TaskId,
        cached: StateToken,
        authoritative: StateToken,
    },
}

// =============================================================================
// Recovery Repository Errors
// =============================================================================

#[derive(Debug, Error)]
pub enum RecordRecoveryError {
    #[error("task not found: {0}")]
    TaskNotFound(TaskId),
    #[error("database error")]
    Database(#[source] sqlx::Error),
}

#[derive(Debug, Error)]
pub enum ListRecoveryError {
    #[error("database error")]
    Database(#[source] sqlx::Error),
}

// =============================================================================
// Notification Repository Errors
// =============================================================================

#[derive(Debug, Error)]
pub enum CreateNotificationError {
    #[error("database error")]
    Database(#[source] sqlx::Error),
}

#[derive(Debug, Error)]
pub enum FindNotificationError {
    #[error("notification not found: {0}")]
    NotFound(NotificationId),
    #[error("database error")]
    Database(#[source] sqlx::Error),
}

#[derive(Debug, Error)]
pub enum ListNotificationsError {
    #[error("database error")]
    Database(#[source] sqlx::Error),
}

// =============================================================================
// Subscriber Repository Errors
// =============================================================================

#[derive(Debug, Error)]
pub enum SubscribeError {
    #[error("task not found: {0}")]
    TaskNotFound(TaskId),
    #[error("project not found: {0}")]
    ProjectNotFound(ProjectId),
    #[error("user not found: {0}")]
    UserNotFound(UserId),
    #[error("database error")]
    Database(#[source] sqlx::Error),
}

#[derive(Debug, Error)]
pub enum ResolveSubscribersError {
    #[error("database error")]
    Database(#[source] sqlx::Error),
}
