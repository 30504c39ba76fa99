//! PostgreSQL implementation of `TaskRepository`.

use async_trait::async_trait;
use sqlx::PgPool;
use std::str::FromStr;

use orch_domain::enums::{TaskPriority, TaskType};
use orch_domain::ids::{ProjectId, TaskId, UserId};
use orch_domain::state_token::StateToken;
use orch_domain::task::Task;

use crate::pagination::{Page, Pagination};
use crate::repo::errors::{CreateTaskError, FindTaskError, ListTasksError, UpdateTaskError};
use crate::repo::traits::{
    NewTask, OrchestrationStats, TaskFilters, TaskLifecycleUpdate, TaskRepository,
};

pub struct PgTaskRepository {
    pool: PgPool,
}

impl PgTaskRepository {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TaskRepository for PgTaskRepository {
    async fn find_by_id(&self, id: &TaskId) -> Result<Option<Task>, FindTaskError> {
        let row = sqlx::query_as::<_, TaskRow>(
            r#"
            SELECT id::text, title, description, priority::text, task_type, project_id::text,
                   assignee::text, tags, current_state, current_step, created_at, updated_at
            FROM tasks
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(FindTaskError::Database)?;

        row.map(TryInto::try_into)
            .transpose()
            .map_err(|_| FindTaskError::NotFound(*id))
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

        let row = sqlx::query_as::<_, TaskRow>(
            r#"
            INSERT INTO tasks (
                id, title, description, priority, task_type, project_id,
                assignee, tags, current_state, current_step, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING id::text, title, description, priority::text, task_type, project_id::text,
                      assignee::text, tags, current_state, current_step, created_at, updated_at
            "#,
        )
        .bind(task.id.as_uuid())
        .bind(&task.title)
        .bind(&task.description)
        .bind(priority_str(task.priority))
        .bind(serde_json::to_value(&task.task_type).unwrap_or_default())
        .bind(task.project_id.map(|p| *p.as_uuid()))
        .bind(task.assignee.map(|a| *a.as_uuid()))
        .bind(&task.tags)
        .bind(task.current_state.name())
        .bind(&task.current_step)
        .bind(task.created_at)
        .bind(task.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(CreateTaskError::Database)?;

        row.try_into()
            .map_err(|_| CreateTaskError::Database(sqlx::Error::RowNotFound))
    }

    async fn update_lifecycle(
        &self,
        id: &TaskId,
        update: &TaskLifecycleUpdate,
    ) -> Result<Task, UpdateTaskError> {
        let state_name = update.current_state.map(|s| s.name());

        let row = sqlx::query_as::<_, TaskRow>(
            r#"
            UPDATE tasks
            SET current_state = COALESCE($2, current_state),
                current_step = CASE WHEN $3 THEN $4 ELSE current_step END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING id::text, title, description, priority::text, task_type, project_id::text,
                      assignee::text, tags, current_state, current_step, created_at, updated_at
            "#,
        )
        .bind(id.as_uuid())
        .bind(state_name)
        .bind(update.current_step.is_some())
        .bind(update.current_step.clone().flatten())
        .fetch_optional(&self.pool)
        .await
        .map_err(UpdateTaskError::Database)?
        .ok_or(UpdateTaskError::NotFound(*id))?;

        row.try_into()
            .map_err(|_| UpdateTaskError::Database(sqlx::Error::RowNotFound))
    }

    async fn list(
        &self,
        filters: &TaskFilters,
        pagination: Pagination,
    ) -> Result<Page<Task>, ListTasksError> {
        let state_filter = filters.state.map(|s| s.name());
        let priority_filter = filters.priority.map(priority_str);

        let total = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM tasks
            WHERE ($1::text IS NULL OR current_state = $1)
              AND ($2::uuid IS NULL OR project_id = $2)
              AND ($3::text IS NULL OR priority = $3::task_priority)
              AND ($4::uuid IS NULL OR assignee = $4)
            "#,
        )
        .bind(&state_filter)
        .bind(filters.project_id.map(|p| *p.as_uuid()))
        .bind(&priority_filter)
        .bind(filters.assignee.map(|a| *a.as_uuid()))
        .fetch_one(&self.pool)
        .await
        .map_err(ListTasksError::Database)?;

        let rows = sqlx::query_as::<_, TaskRow>(
            r#"
            SELECT id::text, title, description, priority::text, task_type, project_id::text,
                   assignee::text, tags, current_state, current_step, created_at, updated_at
            FROM tasks
            WHERE ($1::text IS NULL OR current_state = $1)
              AND ($2::uuid IS NULL OR project_id = $2)
              AND ($3::text IS NULL OR priority = $3::task_priority)
              AND ($4::uuid IS NULL OR assignee = $4)
            ORDER BY created_at DESC
            LIMIT $5 OFFSET $6
            "#,
        )
        .bind(&state_filter)
        .bind(filters.project_id.map(|p| *p.as_uuid()))
        .bind(&priority_filter)
        .bind(filters.assignee.map(|a| *a.as_uuid()))
        .bind(pagination.clamped_limit())
        .bind(pagination.offset)
        .fetch_all(&self.pool)
        .await
        .map_err(ListTasksError::Database)?;

        let tasks: Vec<Task> = rows.into_iter().filter_map(|r| r.try_into().ok()).collect();

        Ok(Page::new(tasks, total, &pagination))
    }

    async fn stats(&self) -> Result<OrchestrationStats, ListTasksError> {
        let rows = sqlx::query_as::<_, (String, i64)>(
            "SELECT current_state, COUNT(*) FROM tasks GROUP BY current_state",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(ListTasksError::Database)?;

        let mut stats = OrchestrationStats::default();
        for (state_name, count) in rows {
            let count = count as u64;
            match StateToken::from_str(&state_name) {
                Ok(StateToken::Completed) => stats.completed += count,
                Ok(StateToken::Failed) => stats.failed += count,
                Ok(StateToken::Paused | StateToken::WaitingForInput) => stats.queued += count,
                Ok(StateToken::Phase(phase)) => {
                    stats.active += count;
                    *stats.by_phase.entry(phase.name().to_string()).or_insert(0) += count;
                }
                _ => stats.active += count,
            }
        }
        Ok(stats)
    }
}

fn priority_str(priority: TaskPriority) -> &'static str {
    match priority {
        TaskPriority::Low => "low",
        TaskPriority::Medium => "medium",
        TaskPriority::High => "high",
        TaskPriority::Critical => "critical",
    }
}

fn parse_priority(s: &str) -> TaskPriority {
    match s {
        "medium" => TaskPriority::Medium,
        "high" => TaskPriority::High,
        "critical" => TaskPriority::Critical,
        _ => TaskPriority::Low,
    }
}

#[derive(sqlx::FromRow)]
struct TaskRow {
    id: String,
    title: String,
    description: String,
    priority: String,
    task_type: serde_json::Value,
    project_id: Option<String>,
    assignee: Option<String>,
    tags: Vec<String>,
    current_state: String,
    current_step: Option<String>,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl TryFrom<TaskRow> for Task {
    type Error = orch_domain::ids::IdParseError;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        let id = TaskId::from_uuid(row.id.parse()?);
        let project_id = row
            .project_id
            .map(|p| p.parse::<uuid::Uuid>().map(ProjectId::from_uuid))
            .transpose()?;
        let assignee = row
            .assignee
            .map(|a| a.parse::<uuid::Uuid>().map(UserId::from_uuid))
            .transpose()?;

        Ok(Task {
            id,
            title: row.title,
            description: row.description,
            priority: parse_priority(&row.priority),
            task_type: serde_json::from_value(row.task_type)
                .unwrap_or(orch_domain::enums::TaskType::Feature),
            project_id,
            assignee,
            tags: row.tags,
            current_state: StateToken::from_str(&row.current_state)
                .unwrap_or(StateToken::Initialized),
            updated_at: row.updated_at,
            created_at: row.created_at,
            current_step: row.current_step,
        })
    }
}
