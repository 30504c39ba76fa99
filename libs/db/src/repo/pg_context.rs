//! PostgreSQL implementation of `ContextRepository`.
//!
//! The Context record is stored as a single JSON blob per task
//! (`task_context(task_id, json)`), matching spec's "normalized
//! equivalent" allowance. Mutations are read-modify-write inside a
//! transaction so concurrent updates to the same task serialize on the
//! row lock, keeping `addStepResult`/`update` atomic without needing
//! per-field SQL.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value as Json;
use sqlx::PgPool;

use orch_domain::context::{Context, StepResult, TransitionRecord};
use orch_domain::ids::TaskId;
use orch_domain::task::Task;

use crate::repo::errors::{GetContextError, InitializeContextError, UpdateContextError};
use crate::repo::traits::ContextRepository;

pub struct PgContextRepository {
    pool: PgPool,
}

impl PgContextRepository {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load(&self, task_id: &TaskId) -> Result<Option<Context>, sqlx::Error> {
        let row: Option<(Json,)> =
            sqlx::query_as("SELECT json FROM task_context WHERE task_id = $1")
                .bind(task_id.as_uuid())
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.and_then(|(json,)| serde_json::from_value(json).ok()))
    }
}

#[async_trait]
impl ContextRepository for PgContextRepository {
    async fn initialize(
        &self,
        task: &Task,
        initial_data: HashMap<String, Json>,
    ) -> Result<Context, InitializeContextError> {
        if let Some(existing) = self
            .load(&task.id)
            .await
            .map_err(InitializeContextError::Database)?
        {
            if existing.data == initial_data {
                return Ok(existing);
            }
            return Err(InitializeContextError::AlreadyExists(task.id));
        }

        let context = Context::initialize(task.clone(), initial_data);
        let json = serde_json::to_value(&context).unwrap_or_default();

        sqlx::query(
            r#"
            INSERT INTO task_context (task_id, json)
            VALUES ($1, $2)
            ON CONFLICT (task_id) DO NOTHING
            "#,
        )
        .bind(task.id.as_uuid())
        .bind(&json)
        .execute(&self.pool)
        .await
        .map_err(InitializeContextError::Database)?;

        Ok(context)
    }

    async fn get(&self, task_id: &TaskId) -> Result<Context, GetContextError> {
        self.load(task_id)
            .await
            .map_err(GetContextError::Database)?
            .ok_or(GetContextError::NotFound(*task_id))
    }

    async fn update_data_path(
        &self,
        task_id: &TaskId,
        path: &str,
        value: Json,
    ) -> Result<(), UpdateContextError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(UpdateContextError::Database)?;

        let row: Option<(Json,)> =
            sqlx::query_as("SELECT json FROM task_context WHERE task_id = $1 FOR UPDATE")
                .bind(task_id.as_uuid())
                .fetch_optional(&mut *tx)
                .await
                .map_err(UpdateContextError::Database)?;

        let mut context: Context = row
            .and_then(|(json,)| serde_json::from_value(json).ok())
            .ok_or(UpdateContextError::NotFound(*task_id))?;

        set_dotted_path(&mut context.data, path, value);

        let json = serde_json::to_value(&context).unwrap_or_default();
        sqlx::query("UPDATE task_context SET json = $2 WHERE task_id = $1")
            .bind(task_id.as_uuid())
            .bind(&json)
            .execute(&mut *tx)
            .await
            .map_err(UpdateContextError::Database)?;

        tx.commit().await.map_err(UpdateContextError::Database)?;
        Ok(())
    }

    async fn add_step_result(
        &self,
        task_id: &TaskId,
        step_name: &str,
        result: StepResult,
    ) -> Result<(), UpdateContextError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(UpdateContextError::Database)?;

        let row: Option<(Json,)> =
            sqlx::query_as("SELECT json FROM task_context WHERE task_id = $1 FOR UPDATE")
                .bind(task_id.as_uuid())
                .fetch_optional(&mut *tx)
                .await
                .map_err(UpdateContextError::Database)?;

        let mut context: Context = row
            .and_then(|(json,)| serde_json::from_value(json).ok())
            .ok_or(UpdateContextError::NotFound(*task_id))?;

        context.add_step_result(step_name, result);

        let json = serde_json::to_value(&context).unwrap_or_default();
        sqlx::query("UPDATE task_context SET json = $2 WHERE task_id = $1")
            .bind(task_id.as_uuid())
            .bind(&json)
            .execute(&mut *tx)
            .await
            .map_err(UpdateContextError::Database)?;

        tx.commit().await.map_err(UpdateContextError::Database)?;
        Ok(())
    }

    async fn record_transition(
        &self,
        task_id: &TaskId,
        record: TransitionRecord,
    ) -> Result<(), UpdateContextError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(UpdateContextError::Database)?;

        let row: Option<(Json,)> =
            sqlx::query_as("SELECT json FROM task_context WHERE task_id = $1 FOR UPDATE")
                .bind(task_id.as_uuid())
                .fetch_optional(&mut *tx)
                .await
                .map_err(UpdateContextError::Database)?;

        let mut context: Context = row
            .and_then(|(json,)| serde_json::from_value(json).ok())
            .ok_or(UpdateContextError::NotFound(*task_id))?;

        context.current_state = record.to_state;
        context.push_history(record);

        let json = serde_json::to_value(&context).unwrap_or_default();
        sqlx::query("UPDATE task_context SET json = $2 WHERE task_id = $1")
            .bind(task_id.as_uuid())
            .bind(&json)
            .execute(&mut *tx)
            .await
            .map_err(UpdateContextError::Database)?;

        tx.commit().await.map_err(UpdateContextError::Database)?;
        Ok(())
    }
}

/// Apply a dotted-path update (e.g. `"userInput.reviewer"`) under a
/// `HashMap<String, Json>`, creating intermediate object maps as needed.
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
    set_dotted_path_json(entry, &rest, value);
}

fn set_dotted_path_json(node: &mut Json, segments: &[&str], value: Json) {
    if !node.is_object() {
        *node = Json::Object(serde_json::Map::new());
    }
    let Json::Object(map) = node else {
        unreachable!()
    };

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
    set_dotted_path_json(entry, rest, value);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_dotted_path_creates_intermediate_maps() {
        let mut data = HashMap::new();
        set_dotted_path(
            &mut data,
            "userInput.reviewer.id",
            Json::String("u_123".to_string()),
        );

        let user_input = data.get("userInput").unwrap();
        assert_eq!(
            user_input
                .get("reviewer")
                .and_then(|r| r.get("id"))
                .and_then(Json::as_str),
            Some("u_123")
        );
    }

    #[test]
    fn test_set_dotted_path_top_level() {
        let mut data = HashMap::new();
        set_dotted_path(&mut data, "nextStateAfterInput", Json::String("x".to_string()));
        assert_eq!(data.get("nextStateAfterInput").and_then(Json::as_str), Some("x"));
    }
}
