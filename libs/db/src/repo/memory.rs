//! In-memory repository implementations backing unit and integration
//! tests for C2–C6 without a database.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use serde_json::Value as Json;

use orch_domain::context::{Context, StepResult, TransitionRecord};
use orch_domain::ids::{NotificationId, ProjectId, TaskId, UserId};
use orch_domain::notification::Notification;
use orch_domain::recovery::RecoveryRecord;
use orch_domain::state_token::StateToken;
use orch_domain::task::Task;

use crate::pagination::{Page, Pagination};
use crate::repo::errors::*;
use crate::repo::traits::*;

/// In-memory `TaskRepository`, keyed by task id.
#[derive(Default)]
pub struct InMemoryTaskRepository {
    tasks: DashMap<TaskId, Task>,
}

#[async_trait]
impl TaskRepository for InMemoryTaskRepository {
    async fn find_by_id(&self, id: &TaskId) -> Result<Option<Task>, FindTaskError> {
        Ok(self.tasks.get(id).map(|t| t.clone()))
    }

    async fn create(&self, new_task: &NewTask) -> Result<Task, CreateTaskError> {
        let task = Task::new(
            new_task.title.clone(),
            new_task.description.clone(),
            new_task.priority,
            new_task.task_type.clone(),
            new_task.project_id,
            new_task.assignee,
            new_task.tags.clone(),
        );
        self.tasks.insert(task.id, task.clone());
        Ok(task)
    }

    async fn update_lifecycle(
        &self,
        id: &TaskId,
        update: &TaskLifecycleUpdate,
    ) -> Result<Task, UpdateTaskError> {
        let mut entry = self.tasks.get_mut(id).ok_or(UpdateTaskError::NotFound(*id))?;
        if let Some(state) = update.current_state {
            entry.current_state = state;
        }
        if let Some(step) = update.current_step.clone() {
            entry.current_step = step;
        }
        entry.updated_at = Utc::now();
        Ok(entry.clone())
    }

    async fn list(
        &self,
        filters: &TaskFilters,
        pagination: Pagination,
    ) -> Result<Page<Task>, ListTasksError> {
        let mut matching: Vec<Task> = self
            .tasks
            .iter()
            .map(|entry| entry.value().clone())
            .filter(|t| filters.state.map_or(true, |s| t.current_state == s))
            .filter(|t| filters.project_id.map_or(true, |p| t.project_id == Some(p)))
            .filter(|t| filters.priority.map_or(true, |p| t.priority == p))
            .filter(|t| filters.assignee.map_or(true, |a| t.assignee == Some(a)))
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = matching.len() as i64;
        let offset = pagination.offset.max(0) as usize;
        let limit = pagination.clamped_limit() as usize;
        let page_items = matching.into_iter().skip(offset).take(limit).collect();

        Ok(Page::new(page_items, total, &pagination))
    }

    async fn stats(&self) -> Result<OrchestrationStats, ListTasksError> {
        let mut stats = OrchestrationStats::default();
        for entry in &self.tasks {
            match entry.current_state {
                StateToken::Completed => stats.completed += 1,
                StateToken::Failed => stats.failed += 1,
                StateToken::Paused | StateToken::WaitingForInput => stats.queued += 1,
                StateToken::Phase(phase) => {
                    stats.active += 1;
                    *stats.by_phase.entry(phase.name().to_string()).or_insert(0) += 1;
                }
                _ => stats.active += 1,
            }
        }
        Ok(stats)
    }
}

impl InMemoryTaskRepository {
    /// Seed a task row directly, bypassing `create` (the Postgres
    /// counterpart's row already exists by the time tests need it).
    pub fn seed(&self, task: Task) {
        self.tasks.insert(task.id, task);
    }
}

/// In-memory `ContextRepository`, keyed by task id.
#[derive(Default)]
pub struct InMemoryContextRepository {
    contexts: DashMap<TaskId, Context>,
}

#[async_trait]
impl ContextRepository for InMemoryContextRepository {
    async fn initialize(
        &self,
        task: &Task,
        initial_data: HashMap<String, Json>,
    ) -> Result<Context, InitializeContextError> {
        if let Some(existing) = self.contexts.get(&task.id) {
            if existing.data == initial_data {
                return Ok(existing.clone());
            }
            return Err(InitializeContextError::AlreadyExists(task.id));
        }
        let context = Context::initialize(task.clone(), initial_data);
        self.contexts.insert(task.id, context.clone());
        Ok(context)
    }

    async fn get(&self, task_id: &TaskId) -> Result<Context, GetContextError> {
        self.contexts
            .get(task_id)
            .map(|c| c.clone())
            .ok_or(GetContextError::NotFound(*task_id))
    }

    async fn update_data_path(
        &self,
        task_id: &TaskId,
        path: &str,
        value: Json,
    ) -> Result<(), UpdateContextError> {
        let mut entry = self
            .contexts
            .get_mut(task_id)
            .ok_or(UpdateContextError::NotFound(*task_id))?;
        set_dotted_path(&mut entry.data, path, value);
        Ok(())
    }

    async fn add_step_result(
        &self,
        task_id: &TaskId,
        step_name: &str,
        result: StepResult,
    ) -> Result<(), UpdateContextError> {
        let mut entry = self
            .contexts
            .get_mut(task_id)
            .ok_or(UpdateContextError::NotFound(*task_id))?;
        entry.add_step_result(step_name, result);
        Ok(())
    }

    async fn record_transition(
        &self,
        task_id: &TaskId,
        record: TransitionRecord,
    ) -> Result<(), UpdateContextError> {
        let mut entry = self
            .contexts
            .get_mut(task_id)
            .ok_or(UpdateContextError::NotFound(*task_id))?;
        entry.current_state = record.to_state;
        entry.push_history(record);
        Ok(())
    }
}

fn set_dotted_path(data: &mut HashMap<String, Json>, path: &str, value: Json) {
    let mut segments = path.split('.');
    let Some(first) = segments.next() else {
        return;
    };
    let rest: Vec<&str> = segments.collect();
    if rest.is_empty() {
        data.insert(first.to_string(), value);
        return;
    }
    let entry = data
        .entry(first.to_string())
        .or_insert_with(|| Json::Object(serde_json::Map::new()));
    let Json::Object(map) = entry else {
        *entry = Json::Object(serde_json::Map::new());
        return;
    };
    let mut map = std::mem::take(map);
    set_dotted_path_rest(&mut map, &rest, value);
    *entry = Json::Object(map);
}

fn set_dotted_path_rest(map: &mut serde_json::Map<String, Json>, segments: &[&str], value: Json) {
    let Some((first, rest)) = segments.split_first() else {
        return;
    };
    if rest.is_empty() {
        map.insert((*first).to_string(), value);
        return;
    }
    let entry = map
        .entry((*first).to_string())
        .or_insert_with(|| Json::Object(serde_json::Map::new()));
    if !entry.is_object() {
        *entry = Json::Object(serde_json::Map::new());
    }
    if let Json::Object(inner) = entry {
        let mut inner = std::mem::take(inner);
        set_dotted_path_rest(&mut inner, rest, value);
        *entry = Json::Object(inner);
    }
}

/// In-memory `StateRepository`, backed by a task's current state plus an
/// append-only transition log, guarded by per-task serialization.
#[derive(Default)]
pub struct InMemoryStateRepository {
    states: DashMap<TaskId, StateToken>,
    history: Mutex<Vec<TransitionRecord>>,
}

#[async_trait]
impl StateRepository for InMemoryStateRepository {
    async fn get_current_state(&self, task_id: &TaskId) -> Result<StateToken, ReadStateError> {
        self.states
            .get(task_id)
            .map(|s| *s)
            .ok_or(ReadStateError::TaskNotFound(*task_id))
    }

    async fn write_transition(
        &self,
        task_id: &TaskId,
        next_state: StateToken,
        message: Option<String>,
        metadata: Json,
    ) -> Result<TransitionRecord, WriteStateError> {
        let from_state = *self
            .states
            .get(task_id)
            .ok_or(WriteStateError::TaskNotFound(*task_id))?;

        let record = TransitionRecord {
            task_id: *task_id,
            from_state,
            to_state: next_state,
            message,
            metadata,
            timestamp: Utc::now(),
        };

        self.states.insert(*task_id, next_state);
        self.history
            .lock()
            .expect("state history mutex poisoned")
            .push(record.clone());

        Ok(record)
    }

    async fn get_state_history(
        &self,
        task_id: &TaskId,
    ) -> Result<Vec<TransitionRecord>, ListTransitionsError> {
        Ok(self
            .history
            .lock()
            .expect("state history mutex poisoned")
            .iter()
            .filter(|r| r.task_id == *task_id)
            .cloned()
            .collect())
    }

    async fn get_last_transition(
        &self,
        task_id: &TaskId,
    ) -> Result<Option<TransitionRecord>, ListTransitionsError> {
        Ok(self
            .history
            .lock()
            .expect("state history mutex poisoned")
            .iter()
            .rev()
            .find(|r| r.task_id == *task_id)
            .cloned())
    }

    async fn reconcile(&self, task_id: &TaskId) -> Result<StateToken, ReconcileStateError> {
        let last = self
            .get_last_transition(task_id)
            .await
            .map_err(|ListTransitionsError::Database(e)| ReconcileStateError::Database(e))?
            .ok_or(ReconcileStateError::NoHistory(*task_id))?;
        self.states.insert(*task_id, last.to_state);
        Ok(last.to_state)
    }
}

impl InMemoryStateRepository {
    /// Seed the initial state for a task (the Postgres counterpart does
    /// this implicitly via the `tasks` row insert).
    pub fn seed(&self, task_id: TaskId, state: StateToken) {
        self.states.insert(task_id, state);
    }
}

/// In-memory `RecoveryRepository`, keyed by `(task_id, step_name)`.
#[derive(Default)]
pub struct InMemoryRecoveryRepository {
    records: DashMap<(TaskId, String), Vec<RecoveryRecord>>,
}

#[async_trait]
impl RecoveryRepository for InMemoryRecoveryRepository {
    async fn record(&self, record: RecoveryRecord) -> Result<(), RecordRecoveryError> {
        self.records
            .entry((record.task_id, record.step_name.clone()))
            .or_default()
            .push(record);
        Ok(())
    }

    async fn list_for_step(
        &self,
        task_id: &TaskId,
        step_name: &str,
    ) -> Result<Vec<RecoveryRecord>, ListRecoveryError> {
        Ok(self
            .records
            .get(&(*task_id, step_name.to_string()))
            .map(|v| v.clone())
            .unwrap_or_default())
    }

    async fn attempt_count(
        &self,
        task_id: &TaskId,
        step_name: &str,
    ) -> Result<u32, ListRecoveryError> {
        Ok(self
            .records
            .get(&(*task_id, step_name.to_string()))
            .map_or(0, |v| v.len() as u32))
    }
}

/// In-memory `NotificationRepository`.
#[derive(Default)]
pub struct InMemoryNotificationRepository {
    notifications: Mutex<Vec<Notification>>,
}

#[async_trait]
impl NotificationRepository for InMemoryNotificationRepository {
    async fn create(&self, notification: Notification) -> Result<(), CreateNotificationError> {
        self.notifications
            .lock()
            .expect("notification mutex poisoned")
            .push(notification);
        Ok(())
    }

    async fn find_by_id(
        &self,
        id: &NotificationId,
    ) -> Result<Option<Notification>, FindNotificationError> {
        Ok(self
            .notifications
            .lock()
            .expect("notification mutex poisoned")
            .iter()
            .find(|n| n.id == *id)
            .cloned())
    }

    async fn list_for_task(
        &self,
        task_id: &TaskId,
        pagination: Pagination,
    ) -> Result<Page<Notification>, ListNotificationsError> {
        let mut matching: Vec<Notification> = self
            .notifications
            .lock()
            .expect("notification mutex poisoned")
            .iter()
            .filter(|n| n.task_id == Some(*task_id))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        let total = matching.len() as i64;
        let offset = pagination.offset.max(0) as usize;
        let limit = pagination.clamped_limit() as usize;
        let items = matching.into_iter().skip(offset).take(limit).collect();

        Ok(Page::new(items, total, &pagination))
    }
}

/// In-memory `SubscriberResolver`.
#[derive(Default)]
pub struct InMemorySubscriberRepository {
    task_subs: DashMap<TaskId, HashSet<UserId>>,
    project_subs: DashMap<ProjectId, HashSet<UserId>>,
}

#[async_trait]
impl SubscriberResolver for InMemorySubscriberRepository {
    async fn subscribe_task(
        &self,
        task_id: &TaskId,
        user_id: &UserId,
    ) -> Result<(), SubscribeError> {
        self.task_subs.entry(*task_id).or_default().insert(*user_id);
        Ok(())
    }

    async fn subscribe_project(
        &self,
        project_id: &ProjectId,
        user_id: &UserId,
    ) -> Result<(), SubscribeError> {
        self.project_subs
            .entry(*project_id)
            .or_default()
            .insert(*user_id);
        Ok(())
    }

    async fn resolve_for_task(
        &self,
        task_id: &TaskId,
        project_id: Option<&ProjectId>,
    ) -> Result<Vec<UserId>, ResolveSubscribersError> {
        let mut users: HashSet<UserId> = self
            .task_subs
            .get(task_id)
            .map(|s| s.clone())
            .unwrap_or_default();
        if let Some(project_id) = project_id {
            if let Some(project_users) = self.project_subs.get(project_id) {
                users.extend(project_users.iter().copied());
            }
        }
        Ok(users.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orch_domain::enums::{TaskPriority, TaskType};

    #[tokio::test]
    async fn test_in_memory_task_lifecycle() {
        let repo = InMemoryTaskRepository::default();
        let task = repo
            .create(&NewTask {
                title: "t".to_string(),
                description: "d".to_string(),
                priority: TaskPriority::Low,
                task_type: TaskType::Feature,
                project_id: None,
                assignee: None,
                tags: vec![],
            })
            .await
            .unwrap();

        let fetched = repo.find_by_id(&task.id).await.unwrap().unwrap();
        assert_eq!(fetched.current_state, StateToken::Initialized);
    }

    #[tokio::test]
    async fn test_in_memory_state_history_ordering() {
        let repo = InMemoryStateRepository::default();
        let task_id = TaskId::new();
        repo.seed(task_id, StateToken::Initialized);

        repo.write_transition(
            &task_id,
            StateToken::Phase(orch_domain::state_token::Phase::TaskUnderstanding),
            None,
            Json::Null,
        )
        .await
        .unwrap();
        repo.write_transition(
            &task_id,
            StateToken::PhaseCompleted(orch_domain::state_token::Phase::TaskUnderstanding),
            None,
            Json::Null,
        )
        .await
        .unwrap();

        let history = repo.get_state_history(&task_id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].to_state, history[1].from_state);
    }

    #[tokio::test]
    async fn test_in_memory_recovery_attempt_count() {
        let repo = InMemoryRecoveryRepository::default();
        let task_id = TaskId::new();
        for attempt in 1..=3 {
            repo.record(RecoveryRecord {
                task_id,
                step_name: "code_generation".to_string(),
                error_type: orch_domain::enums::ErrorType::LlmError,
                error_message: "x".to_string(),
                strategy: orch_domain::enums::RecoveryStrategy::RetryWithBackoff,
                attempt_number: attempt,
                timestamp: Utc::now(),
            })
            .await
            .unwrap();
        }
        assert_eq!(
            repo.attempt_count(&task_id, "code_generation").await.unwrap(),
            3
        );
    }
}
