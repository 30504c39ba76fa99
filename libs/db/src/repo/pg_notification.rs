//! PostgreSQL implementation of `NotificationRepository`.

use async_trait::async_trait;
use sqlx::PgPool;

use orch_domain::ids::{NotificationId, ProjectId, TaskId};
use orch_domain::notification::Notification;

use crate::pagination::{Page, Pagination};
use crate::repo::errors::{CreateNotificationError, FindNotificationError, ListNotificationsError};
use crate::repo::traits::NotificationRepository;

pub struct PgNotificationRepository {
    pool: PgPool,
}

impl PgNotificationRepository {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationRepository for PgNotificationRepository {
    async fn create(&self, notification: Notification) -> Result<(), CreateNotificationError> {
        sqlx::query(
            r#"
            INSERT INTO notifications (
                id, type, task_id, project_id, title, message, data_json, priority, is_read, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, false, $9)
            "#,
        )
        .bind(notification.id.as_uuid())
        .bind(serde_json::to_value(notification.notification_type).unwrap_or_default())
        .bind(notification.task_id.map(|t| *t.as_uuid()))
        .bind(notification.project_id.map(|p| *p.as_uuid()))
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(&notification.data)
        .bind(serde_json::to_value(notification.priority).unwrap_or_default())
        .bind(notification.timestamp)
        .execute(&self.pool)
        .await
        .map_err(CreateNotificationError::Database)?;

        Ok(())
    }

    async fn find_by_id(
        &self,
        id: &NotificationId,
    ) -> Result<Option<Notification>, FindNotificationError> {
        let row = sqlx::query_as::<_, NotificationRow>(
            r#"
            SELECT id::text, type, task_id::text, project_id::text, title, message, data_json,
                   priority, created_at
            FROM notifications
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(FindNotificationError::Database)?;

        row.map(TryInto::try_into)
            .transpose()
            .map_err(|_| FindNotificationError::NotFound(*id))
    }

    async fn list_for_task(
        &self,
        task_id: &TaskId,
        pagination: Pagination,
    ) -> Result<Page<Notification>, ListNotificationsError> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM notifications WHERE task_id = $1")
            .bind(task_id.as_uuid())
            .fetch_one(&self.pool)
            .await
            .map_err(ListNotificationsError::Database)?;

        let rows = sqlx::query_as::<_, NotificationRow>(
            r#"
            SELECT id::text, type, task_id::text, project_id::text, title, message, data_json,
                   priority, created_at
            FROM notifications
            WHERE task_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(task_id.as_uuid())
        .bind(pagination.clamped_limit())
        .bind(pagination.offset)
        .fetch_all(&self.pool)
        .await
        .map_err(ListNotificationsError::Database)?;

        let notifications = rows.into_iter().filter_map(|r| r.try_into().ok()).collect();
        Ok(Page::new(notifications, total, &pagination))
    }
}

#[derive(sqlx::FromRow)]
struct NotificationRow {
    id: String,
    #[sqlx(rename = "type")]
    notification_type: serde_json::Value,
    task_id: Option<String>,
    project_id: Option<String>,
    title: String,
    message: String,
    data_json: serde_json::Value,
    priority: serde_json::Value,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl TryFrom<NotificationRow> for Notification {
    type Error = orch_domain::ids::IdParseError;

    fn try_from(row: NotificationRow) -> Result<Self, Self::Error> {
        let task_id = row
            .task_id
            .map(|t| t.parse::<uuid::Uuid>().map(TaskId::from_uuid))
            .transpose()?;
        let project_id = row
            .project_id
            .map(|p| p.parse::<uuid::Uuid>().map(ProjectId::from_uuid))
            .transpose()?;

        Ok(Notification {
            id: NotificationId::from_uuid(row.id.parse()?),
            notification_type: serde_json::from_value(row.notification_type)
                .unwrap_or(orch_domain::enums::NotificationType::Info),
            priority: serde_json::from_value(row.priority)
                .unwrap_or(orch_domain::enums::NotificationPriority::Low),
            task_id,
            project_id,
            title: row.title,
            message: row.message,
            data: row.data_json,
            timestamp: row.created_at,
        })
    }
}
