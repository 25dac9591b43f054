//! Coordinates delivery of one notification through the right channel
//! adapter and records the outcome on the notification row.

use super::adapters::{AdapterResult, AndroidAdapter, ChannelAdapter, IosAdapter, WebPushAdapter};
use chrono::Utc;
use serde_json::{json, Value};
use shared::{config::VapidConfig, ChannelType, NotificationStatus, Result, UserSubscription};
use sqlx::PgPool;
use uuid::Uuid;

pub struct NotificationManager {
    db: PgPool,
    webpush: WebPushAdapter,
    android: AndroidAdapter,
    ios: IosAdapter,
}

impl NotificationManager {
    pub fn new(db: PgPool, vapid: &VapidConfig) -> Self {
        Self {
            db,
            webpush: WebPushAdapter::new(vapid),
            android: AndroidAdapter,
            ios: IosAdapter,
        }
    }

    fn adapter(&self, channel: ChannelType) -> &dyn ChannelAdapter {
        match channel {
            ChannelType::Webpush => &self.webpush,
            ChannelType::Android => &self.android,
            ChannelType::Ios => &self.ios,
        }
    }

    /// Deliver one queued notification. Every exit path lands the record
    /// in `sent` or `failed`.
    pub async fn send_notification(
        &self,
        notification_id: Uuid,
        user_id: Uuid,
        message: &str,
        title: &str,
        channel: ChannelType,
        data: Option<&Value>,
    ) {
        tracing::info!(
            notification_id = %notification_id,
            user_id = %user_id,
            channel = %channel,
            "Sending notification"
        );

        let subscription = match self.active_subscription(user_id, channel).await {
            Ok(Some(subscription)) => subscription,
            Ok(None) => {
                self.mark_failed(
                    notification_id,
                    &format!("User has no subscription for channel {}", channel),
                )
                .await;
                return;
            }
            Err(e) => {
                self.mark_failed(notification_id, &e.to_string()).await;
                return;
            }
        };

        let empty = json!({});
        let result = self
            .adapter(channel)
            .send_notification(
                &subscription.subscription_data,
                title,
                message,
                data.unwrap_or(&empty),
            )
            .await;

        self.record_outcome(notification_id, channel, &subscription, result)
            .await;
    }

    async fn record_outcome(
        &self,
        notification_id: Uuid,
        channel: ChannelType,
        subscription: &UserSubscription,
        result: AdapterResult,
    ) {
        if result.success {
            self.mark_sent(notification_id, channel, result.delivery_info)
                .await;
            return;
        }

        let error = result
            .error
            .unwrap_or_else(|| "Unknown delivery error".to_string());

        if result.should_remove_subscription {
            if let Err(e) = self.deactivate_subscription(subscription.id).await {
                tracing::error!(
                    subscription_id = %subscription.id,
                    error = %e,
                    "Failed to deactivate dead subscription"
                );
            } else {
                tracing::info!(
                    subscription_id = %subscription.id,
                    "Dead subscription deactivated"
                );
            }
        }

        if result.should_retry {
            tracing::warn!(notification_id = %notification_id, "Channel rate-limited, retry advised");
        }

        self.mark_failed(notification_id, &error).await;
    }

    async fn active_subscription(
        &self,
        user_id: Uuid,
        channel: ChannelType,
    ) -> Result<Option<UserSubscription>> {
        let subscription = sqlx::query_as::<_, UserSubscription>(
            r#"
            SELECT * FROM user_subscriptions
            WHERE user_id = $1 AND channel = $2 AND is_active = TRUE
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .bind(channel.to_string())
        .fetch_optional(&self.db)
        .await?;

        Ok(subscription)
    }

    async fn deactivate_subscription(&self, subscription_id: Uuid) -> Result<()> {
        sqlx::query(
            "UPDATE user_subscriptions SET is_active = FALSE, updated_at = $2 WHERE id = $1",
        )
        .bind(subscription_id)
        .bind(Utc::now())
        .execute(&self.db)
        .await?;

        Ok(())
    }

    async fn mark_sent(
        &self,
        notification_id: Uuid,
        channel: ChannelType,
        delivery_info: Option<Value>,
    ) {
        let mut info = delivery_info.unwrap_or_else(|| json!({}));
        if let Some(map) = info.as_object_mut() {
            map.insert("channel".to_string(), json!(channel.to_string()));
            map.insert("sent_at".to_string(), json!(Utc::now()));
        }

        let result = sqlx::query(
            r#"
            UPDATE campaign_notifications
            SET status = $2,
                meta = meta || jsonb_build_object('delivery_info', $3::jsonb),
                updated_at = $4
            WHERE id = $1
            "#,
        )
        .bind(notification_id)
        .bind(NotificationStatus::SENT)
        .bind(&info)
        .bind(Utc::now())
        .execute(&self.db)
        .await;

        match result {
            Ok(_) => {
                tracing::info!(notification_id = %notification_id, "Notification sent")
            }
            Err(e) => {
                tracing::error!(notification_id = %notification_id, error = %e, "Failed to mark notification sent")
            }
        }
    }

    async fn mark_failed(&self, notification_id: Uuid, error: &str) {
        let result = sqlx::query(
            r#"
            UPDATE campaign_notifications
            SET status = $2,
                meta = meta || jsonb_build_object('error', $3::text, 'failed_at', $4::text),
                updated_at = $5
            WHERE id = $1
            "#,
        )
        .bind(notification_id)
        .bind(NotificationStatus::FAILED)
        .bind(error)
        .bind(Utc::now().to_rfc3339())
        .bind(Utc::now())
        .execute(&self.db)
        .await;

        match result {
            Ok(_) => {
                tracing::error!(notification_id = %notification_id, error, "Notification failed")
            }
            Err(e) => {
                tracing::error!(notification_id = %notification_id, error = %e, "Failed to mark notification failed")
            }
        }
    }
}
