//! PostgreSQL implementation of `RecoveryRepository`.

use async_trait::async_trait;
use sqlx::PgPool;

use orch_domain::enums::{ErrorType, RecoveryStrategy};
use orch_domain::ids::TaskId;
use orch_domain::recovery::RecoveryRecord;

use crate::repo::errors::{ListRecoveryError, RecordRecoveryError};
use crate::repo::traits::RecoveryRepository;

pub struct PgRecoveryRepository {
    pool: PgPool,
}

impl PgRecoveryRepository {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecoveryRepository for PgRecoveryRepository {
    async fn record(&self, record: RecoveryRecord) -> Result<(), RecordRecoveryError> {
        sqlx::query(
            r#"
            INSERT INTO task_recovery (task_id, step_name, error_type, error_json, strategy_json, timestamp)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(record.task_id.as_uuid())
        .bind(&record.step_name)
        .bind(serde_json::to_value(record.error_type).unwrap_or_default())
        .bind(serde_json::json!({ "message": record.error_message }))
        .bind(serde_json::json!({ "strategy": record.strategy, "attempt": record.attempt_number }))
        .bind(record.timestamp)
        .execute(&self.pool)
        .await
        .map_err(RecordRecoveryError::Database)?;

        Ok(())
    }

    async fn list_for_step(
        &self,
        task_id: &TaskId,
        step_name: &str,
    ) -> Result<Vec<RecoveryRecord>, ListRecoveryError> {
        let rows = sqlx::query_as::<_, RecoveryRow>(
            r#"
            SELECT task_id::text, step_name, error_type, error_json, strategy_json, timestamp
            FROM task_recovery
            WHERE task_id = $1 AND step_name = $2
            ORDER BY timestamp ASC
            "#,
        )
        .bind(task_id.as_uuid())
        .bind(step_name)
        .fetch_all(&self.pool)
        .await
        .map_err(ListRecoveryError::Database)?;

        Ok(rows.into_iter().filter_map(|r| r.try_into().ok()).collect())
    }

    async fn attempt_count(
        &self,
        task_id: &TaskId,
        step_name: &str,
    ) -> Result<u32, ListRecoveryError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM task_recovery WHERE task_id = $1 AND step_name = $2",
        )
        .bind(task_id.as_uuid())
        .bind(step_name)
        .fetch_one(&self.pool)
        .await
        .map_err(ListRecoveryError::Database)?;

        Ok(count as u32)
    }
}

#[derive(sqlx::FromRow)]
struct RecoveryRow {
    task_id: String,
    step_name: String,
    error_type: serde_json::Value,
    error_json: serde_json::Value,
    strategy_json: serde_json::Value,
    timestamp: chrono::DateTime<chrono::Utc>,
}

impl TryFrom<RecoveryRow> for RecoveryRecord {
    type Error = orch_domain::ids::IdParseError;

    fn try_from(row: RecoveryRow) -> Result<Self, Self::Error> {
        let error_type: ErrorType =
            serde_json::from_value(row.error_type).unwrap_or(ErrorType::UnknownError);
        let error_message = row
            .error_json
            .get("message")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let strategy: RecoveryStrategy = row
            .strategy_json
            .get("strategy")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or(RecoveryStrategy::Abort);
        let attempt_number = row
            .strategy_json
            .get("attempt")
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(1) as u32;

        Ok(RecoveryRecord {
            task_id: TaskId::from_uuid(row.task_id.parse()?),
            step_name: row.step_name,
            error_type,
            error_message,
            strategy,
            attempt_number,
            timestamp: row.timestamp,
        })
    }
}
