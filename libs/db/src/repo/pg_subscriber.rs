//! PostgreSQL implementation of `SubscriberResolver`.

use async_trait::async_trait;
use sqlx::PgPool;
use std::collections::HashSet;

use orch_domain::ids::{ProjectId, TaskId, UserId};

use crate::repo::errors::{ResolveSubscribersError, SubscribeError};
use crate::repo::traits::SubscriberResolver;

pub struct PgSubscriberRepository {
    pool: PgPool,
}

impl PgSubscriberRepository {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SubscriberResolver for PgSubscriberRepository {
    async fn subscribe_task(
        &self,
        task_id: &TaskId,
        user_id: &UserId,
    ) -> Result<(), SubscribeError> {
        sqlx::query(
            "INSERT INTO task_subscribers (task_id, user_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(task_id.as_uuid())
        .bind(user_id.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let Some(db_err) = e.as_database_error() {
                if db_err.constraint() == Some("task_subscribers_task_id_fkey") {
                    return SubscribeError::TaskNotFound(*task_id);
                }
                if db_err.constraint() == Some("task_subscribers_user_id_fkey") {
                    return SubscribeError::UserNotFound(*user_id);
                }
            }
            SubscribeError::Database(e)
        })?;

        Ok(())
    }

    async fn subscribe_project(
        &self,
        project_id: &ProjectId,
        user_id: &UserId,
    ) -> Result<(), SubscribeError> {
        sqlx::query(
            "INSERT INTO project_subscribers (project_id, user_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(project_id.as_uuid())
        .bind(user_id.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let Some(db_err) = e.as_database_error() {
                if db_err.constraint() == Some("project_subscribers_project_id_fkey") {
                    return SubscribeError::ProjectNotFound(*project_id);
                }
                if db_err.constraint() == Some("project_subscribers_user_id_fkey") {
                    return SubscribeError::UserNotFound(*user_id);
                }
            }
            SubscribeError::Database(e)
        })?;

        Ok(())
    }

    async fn resolve_for_task(
        &self,
        task_id: &TaskId,
        project_id: Option<&ProjectId>,
    ) -> Result<Vec<UserId>, ResolveSubscribersError> {
        let mut seen = HashSet::new();
        let mut users = Vec::new();

        let task_rows: Vec<(String,)> =
            sqlx::query_as("SELECT user_id::text FROM task_subscribers WHERE task_id = $1")
                .bind(task_id.as_uuid())
                .fetch_all(&self.pool)
                .await
                .map_err(ResolveSubscribersError::Database)?;

        for (id,) in task_rows {
            if let Ok(uuid) = id.parse() {
                let user_id = UserId::from_uuid(uuid);
                if seen.insert(user_id) {
                    users.push(user_id);
                }
            }
        }

        if let Some(project_id) = project_id {
            let project_rows: Vec<(String,)> = sqlx::query_as(
                "SELECT user_id::text FROM project_subscribers WHERE project_id = $1",
            )
            .bind(project_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(ResolveSubscribersError::Database)?;

            for (id,) in project_rows {
                if let Ok(uuid) = id.parse() {
                    let user_id = UserId::from_uuid(uuid);
                    if seen.insert(user_id) {
                        users.push(user_id);
                    }
                }
            }
        }

        Ok(users)
    }
}
