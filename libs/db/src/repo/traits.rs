//! Repository trait definitions
//!
//! These traits define the interface for data access operations.
//! Postgres implementations live in `pg_*` modules; in-memory
//! implementations backing unit tests live in `memory`.

use async_trait::async_trait;
use serde_json::Value as Json;

use orch_domain::context::{Context, RecoveryMeta, StepResult, TransitionRecord};
use orch_domain::enums::{TaskPriority, TaskType};
use orch_domain::ids::{NotificationId, ProjectId, TaskId, UserId};
use orch_domain::notification::Notification;
use orch_domain::recovery::RecoveryRecord;
use orch_domain::state_token::StateToken;
use orch_domain::task::Task;

use crate::pagination::{Page, Pagination};
use crate::repo::errors::*;

// =============================================================================
// Input Types
// =============================================================================

/// Input for creating a new task.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub title: String,
    pub description: String,
    pub priority: TaskPriority,
    pub task_type: TaskType,
    pub project_id: Option<ProjectId>,
    pub assignee: Option<UserId>,
    pub tags: Vec<String>,
}

/// Filters accepted by `TaskRepository::list`.
#[derive(Debug, Clone, Default)]
pub struct TaskFilters {
    pub state: Option<StateToken>,
    pub project_id: Option<ProjectId>,
    pub priority: Option<TaskPriority>,
    pub assignee: Option<UserId>,
}

/// Mutable lifecycle fields the State Manager may update on a task.
#[derive(Debug, Clone, Default)]
pub struct TaskLifecycleUpdate {
    pub current_state: Option<StateToken>,
    pub current_step: Option<Option<String>>,
}

/// Aggregate counts backing `getOrchestrationStats`.
#[derive(Debug, Clone, Default)]
pub struct OrchestrationStats {
    pub active: u64,
    pub queued: u64,
    pub completed: u64,
    pub failed: u64,
    pub by_phase: std::collections::HashMap<String, u64>,
}

// =============================================================================
// Task Repository
// =============================================================================

#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn find_by_id(&self, id: &TaskId) -> Result<Option<Task>, FindTaskError>;

    async fn create(&self, new_task: &NewTask) -> Result<Task, CreateTaskError>;

    /// Apply a lifecycle update. Descriptor fields are immutable and
    /// not exposed here.
    async fn update_lifecycle(
        &self,
        id: &TaskId,
        update: &TaskLifecycleUpdate,
    ) -> Result<Task, UpdateTaskError>;

    async fn list(
        &self,
        filters: &TaskFilters,
        pagination: Pagination,
    ) -> Result<Page<Task>, ListTasksError>;

    async fn stats(&self) -> Result<OrchestrationStats, ListTasksError>;
}

// =============================================================================
// Context Store
// =============================================================================

#[async_trait]
pub trait ContextRepository: Send + Sync {
    /// Create the context record. Idempotent on identical `initial_data`;
    /// fails with `AlreadyExists` on conflicting reinitialization.
    async fn initialize(
        &self,
        task: &Task,
        initial_data: std::collections::HashMap<String, Json>,
    ) -> Result<Context, InitializeContextError>;

    async fn get(&self, task_id: &TaskId) -> Result<Context, GetContextError>;

    /// Dotted-path update under `Context.data`, creating intermediate
    /// maps as needed.
    async fn update_data_path(
        &self,
        task_id: &TaskId,
        path: &str,
        value: Json,
    ) -> Result<(), UpdateContextError>;

    /// Merge a step result, preserving the prior `recovery.attempts`
    /// counter when the new result carries none.
    async fn add_step_result(
        &self,
        task_id: &TaskId,
        step_name: &str,
        result: StepResult,
    ) -> Result<(), UpdateContextError>;

    /// Append `record` to the context's history and update the cached
    /// `currentState` to `record.to_state`. Called by the State Manager
    /// immediately after the authoritative `StateRepository` write
    /// commits, to keep the Context Store cache in step per spec's
    /// "must equal the authoritative State Manager value at every
    /// quiescent point" invariant.
    async fn record_transition(
        &self,
        task_id: &TaskId,
        record: TransitionRecord,
    ) -> Result<(), UpdateContextError>;
}

// =============================================================================
// State Manager
// =============================================================================

#[async_trait]
pub trait StateRepository: Send + Sync {
    async fn get_current_state(&self, task_id: &TaskId) -> Result<StateToken, ReadStateError>;

    /// Append a transition record and update `currentState` in a single
    /// transaction (or write-ahead-log equivalent).
    async fn write_transition(
        &self,
        task_id: &TaskId,
        next_state: StateToken,
        message: Option<String>,
        metadata: Json,
    ) -> Result<TransitionRecord, WriteStateError>;

    async fn get_state_history(
        &self,
        task_id: &TaskId,
    ) -> Result<Vec<TransitionRecord>, ListTransitionsError>;

    async fn get_last_transition(
        &self,
        task_id: &TaskId,
    ) -> Result<Option<TransitionRecord>, ListTransitionsError>;

    /// Replay the latest `task_state_transition` row to repair
    /// `tasks.current_state` if the two disagree after a crash.
    async fn reconcile(&self, task_id: &TaskId) -> Result<StateToken, ReconcileStateError>;
}

// =============================================================================
// Recovery Repository
// =============================================================================

#[async_trait]
pub trait RecoveryRepository: Send + Sync {
    async fn record(&self, record: RecoveryRecord) -> Result<(), RecordRecoveryError>;

    async fn list_for_step(
        &self,
        task_id: &TaskId,
        step_name: &str,
    ) -> Result<Vec<RecoveryRecord>, ListRecoveryError>;

    /// Current attempt count for `(task_id, step_name)`, i.e. the
    /// number of recovery records recorded so far.
    async fn attempt_count(
        &self,
        task_id: &TaskId,
        step_name: &str,
    ) -> Result<u32, ListRecoveryError>;
}

// =============================================================================
// Notification Repository
// =============================================================================

#[async_trait]
pub trait NotificationRepository: Send + Sync {
    async fn create(&self, notification: Notification) -> Result<(), CreateNotificationError>;

    async fn find_by_id(
        &self,
        id: &NotificationId,
    ) -> Result<Option<Notification>, FindNotificationError>;

    async fn list_for_task(
        &self,
        task_id: &TaskId,
        pagination: Pagination,
    ) -> Result<Page<Notification>, ListNotificationsError>;
}

// =============================================================================
// Subscriber Repository
// =============================================================================

/// Resolves the set of users interested in a task's or project's
/// notifications.
#[async_trait]
pub trait SubscriberResolver: Send + Sync {
    async fn subscribe_task(&self, task_id: &TaskId, user_id: &UserId)
        -> Result<(), SubscribeError>;

    async fn subscribe_project(
        &self,
        project_id: &ProjectId,
        user_id: &UserId,
    ) -> Result<(), SubscribeError>;

    async fn resolve_for_task(
        &self,
        task_id: &TaskId,
        project_id: Option<&ProjectId>,
    ) -> Result<Vec<UserId>, ResolveSubscribersError>;
}

/// Helper constructing a default `RecoveryMeta` bumped by one attempt,
/// used by callers assembling a `StepResult` after a retry.
#[must_use]
pub fn bump_attempts(prior: Option<&RecoveryMeta>) -> RecoveryMeta {
    let attempts = prior.map_or(0, |p| p.attempts) + 1;
    RecoveryMeta {
        attempts,
        last_error_type: prior.and_then(|p| p.last_error_type),
        last_strategy: prior.and_then(|p| p.last_strategy),
    }
}
