//! In-app notification feed

use chrono::Utc;
use serde::Serialize;
use shared::{AppError, Result, UserNotification};
use sqlx::PgPool;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Default, Serialize)]
pub struct TypeCount {
    pub total: i64,
    pub unread: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct NotificationStats {
    pub total_notifications: i64,
    pub unread_notifications: i64,
    pub type_counts: HashMap<String, TypeCount>,
}

#[derive(Clone)]
pub struct NotificationService {
    db: PgPool,
}

impl NotificationService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn create(
        &self,
        user_id: Uuid,
        title: &str,
        message: &str,
        notification_type: &str,
        related_id: Option<Uuid>,
    ) -> Result<UserNotification> {
        let notification = sqlx::query_as::<_, UserNotification>(
            r#"
            INSERT INTO user_notifications
                (id, user_id, title, message, notification_type, related_id,
                 is_read, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, FALSE, $7)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(title)
        .bind(message)
        .bind(notification_type)
        .bind(related_id)
        .bind(Utc::now())
        .fetch_one(&self.db)
        .await?;

        tracing::info!(
            user_id = %user_id,
            notification_id = %notification.id,
            notification_type = notification_type,
            "User notification created"
        );

        Ok(notification)
    }

    pub async fn list(
        &self,
        user_id: Uuid,
        unread_only: bool,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<UserNotification>> {
        let notifications = if unread_only {
            sqlx::query_as::<_, UserNotification>(
                r#"
                SELECT * FROM user_notifications
                WHERE user_id = $1 AND is_read = FALSE
                ORDER BY created_at DESC
                LIMIT $2 OFFSET $3
                "#,
            )
            .bind(user_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.db)
            .await?
        } else {
            sqlx::query_as::<_, UserNotification>(
                r#"
                SELECT * FROM user_notifications
                WHERE user_id = $1
                ORDER BY created_at DESC
                LIMIT $2 OFFSET $3
                "#,
            )
            .bind(user_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.db)
            .await?
        };

        Ok(notifications)
    }

    /// Marking an already-read notification is a no-op.
    pub async fn mark_read(
        &self,
        notification_id: Uuid,
        user_id: Uuid,
    ) -> Result<UserNotification> {
        let notification = sqlx::query_as::<_, UserNotification>(
            "SELECT * FROM user_notifications WHERE id = $1 AND user_id = $2",
        )
        .bind(notification_id)
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::not_found("notification"))?;

        if notification.is_read {
            return Ok(notification);
        }

        let updated = sqlx::query_as::<_, UserNotification>(
            r#"
            UPDATE user_notifications
            SET is_read = TRUE, read_at = $2
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(notification_id)
        .bind(Utc::now())
        .fetch_one(&self.db)
        .await?;

        Ok(updated)
    }

    pub async fn mark_all_read(&self, user_id: Uuid) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE user_notifications
            SET is_read = TRUE, read_at = $2
            WHERE user_id = $1 AND is_read = FALSE
            "#,
        )
        .bind(user_id)
        .bind(Utc::now())
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn stats(&self, user_id: Uuid) -> Result<NotificationStats> {
        let rows: Vec<(String, i64, i64)> = sqlx::query_as(
            r#"
            SELECT notification_type,
                   COUNT(*),
                   COUNT(*) FILTER (WHERE NOT is_read)
            FROM user_notifications
            WHERE user_id = $1
            GROUP BY notification_type
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;

        let mut stats = NotificationStats {
            total_notifications: 0,
            unread_notifications: 0,
            type_counts: HashMap::new(),
        };

        for (notification_type, total, unread) in rows {
            stats.total_notifications += total;
            stats.unread_notifications += unread;
            stats
                .type_counts
                .insert(notification_type, TypeCount { total, unread });
        }

        Ok(stats)
    }
}
