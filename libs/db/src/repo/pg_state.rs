//! PostgreSQL implementation of `StateRepository`.
//!
//! Persists the authoritative `tasks.current_state` column and the
//! append-only `task_state_transition` audit log in one transaction per
//! write, per spec §4.3 step 4.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value as Json;
use sqlx::PgPool;

use orch_domain::context::TransitionRecord;
use orch_domain::ids::TaskId;
use orch_domain::state_token::StateToken;

use crate::repo::errors::{
    ListTransitionsError, ReadStateError, ReconcileStateError, WriteStateError,
};
use crate::repo::traits::StateRepository;

pub struct PgStateRepository {
    pool: PgPool,
}

impl PgStateRepository {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StateRepository for PgStateRepository {
    async fn get_current_state(&self, task_id: &TaskId) -> Result<StateToken, ReadStateError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT current_state FROM tasks WHERE id = $1")
                .bind(task_id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(ReadStateError::Database)?;

        let (state_name,) = row.ok_or(ReadStateError::TaskNotFound(*task_id))?;
        Ok(StateToken::from_str(&state_name).unwrap_or(StateToken::Initialized))
    }

    async fn write_transition(
        &self,
        task_id: &TaskId,
        next_state: StateToken,
        message: Option<String>,
        metadata: Json,
    ) -> Result<TransitionRecord, WriteStateError> {
        let mut tx = self.pool.begin().await.map_err(WriteStateError::Database)?;

        let row: Option<(String,)> =
            sqlx::query_as("SELECT current_state FROM tasks WHERE id = $1 FOR UPDATE")
                .bind(task_id.as_uuid())
                .fetch_optional(&mut *tx)
                .await
                .map_err(WriteStateError::Database)?;

        let (from_state_name,) = row.ok_or(WriteStateError::TaskNotFound(*task_id))?;
        let from_state = StateToken::from_str(&from_state_name).unwrap_or(StateToken::Initialized);
        let timestamp = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO task_state_transition (task_id, from_state, to_state, message, metadata_json, timestamp)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(task_id.as_uuid())
        .bind(from_state.name())
        .bind(next_state.name())
        .bind(&message)
        .bind(&metadata)
        .bind(timestamp)
        .execute(&mut *tx)
        .await
        .map_err(WriteStateError::Database)?;

        sqlx::query("UPDATE tasks SET current_state = $2, updated_at = $3 WHERE id = $1")
            .bind(task_id.as_uuid())
            .bind(next_state.name())
            .bind(timestamp)
            .execute(&mut *tx)
            .await
            .map_err(WriteStateError::Database)?;

        tx.commit().await.map_err(WriteStateError::Database)?;

        Ok(TransitionRecord {
            task_id: *task_id,
            from_state,
            to_state: next_state,
            message,
            metadata,
            timestamp,
        })
    }

    async fn get_state_history(
        &self,
        task_id: &TaskId,
    ) -> Result<Vec<TransitionRecord>, ListTransitionsError> {
        let rows = sqlx::query_as::<_, TransitionRow>(
            r#"
            SELECT task_id::text, from_state, to_state, message, metadata_json, timestamp
            FROM task_state_transition
            WHERE task_id = $1
            ORDER BY timestamp ASC
            "#,
        )
        .bind(task_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(ListTransitionsError::Database)?;

        Ok(rows.into_iter().filter_map(|r| r.try_into().ok()).collect())
    }

    async fn get_last_transition(
        &self,
        task_id: &TaskId,
    ) -> Result<Option<TransitionRecord>, ListTransitionsError> {
        let row = sqlx::query_as::<_, TransitionRow>(
            r#"
            SELECT task_id::text, from_state, to_state, message, metadata_json, timestamp
            FROM task_state_transition
            WHERE task_id = $1
            ORDER BY timestamp DESC
            LIMIT 1
            "#,
        )
        .bind(task_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(ListTransitionsError::Database)?;

        Ok(row.and_then(|r| r.try_into().ok()))
    }

    async fn reconcile(&self, task_id: &TaskId) -> Result<StateToken, ReconcileStateError> {
        let last = self
            .get_last_transition(task_id)
            .await
            .map_err(|ListTransitionsError::Database(e)| ReconcileStateError::Database(e))?
            .ok_or(ReconcileStateError::NoHistory(*task_id))?;

        let result = sqlx::query("UPDATE tasks SET current_state = $2 WHERE id = $1")
            .bind(task_id.as_uuid())
            .bind(last.to_state.name())
            .execute(&self.pool)
            .await
            .map_err(ReconcileStateError::Database)?;

        if result.rows_affected() == 0 {
            return Err(ReconcileStateError::TaskNotFound(*task_id));
        }

        Ok(last.to_state)
    }
}

#[derive(sqlx::FromRow)]
struct TransitionRow {
    task_id: String,
    from_state: String,
    to_state: String,
    message: Option<String>,
    metadata_json: Json,
    timestamp: chrono::DateTime<chrono::Utc>,
}

impl TryFrom<TransitionRow> for TransitionRecord {
    type Error = orch_domain::ids::IdParseError;

    fn try_from(row: TransitionRow) -> Result<Self, Self::Error> {
        Ok(TransitionRecord {
            task_id: TaskId::from_uuid(row.task_id.parse()?),
            from_state: StateToken::from_str(&row.from_state).unwrap_or(StateToken::Initialized),
            to_state: StateToken::from_str(&row.to_state).unwrap_or(StateToken::Initialized),
            message: row.message,
            metadata: row.metadata_json,
            timestamp: row.timestamp,
        })
    }
}
