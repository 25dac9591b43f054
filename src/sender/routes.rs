//! HTTP surface of the notification sender

use super::manager::NotificationManager;
use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use shared::{
    AppError, BatchSendRequest, ChannelCounts, ChannelType, HealthStatus,
    NotificationSendRequest, NotificationStatus, Result, SenderStats, UserSubscription,
};
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone)]
pub struct SenderState {
    pub db: PgPool,
    pub manager: Arc<NotificationManager>,
}

pub fn create_sender_router(state: SenderState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/send", post(send_notification))
        .route("/send-batch", post(send_batch))
        .route("/status/:notification_id", get(notification_status))
        .route("/stats", get(sender_stats))
        .route("/subscriptions", post(register_subscription))
        .route(
            "/subscriptions/:subscription_id/deactivate",
            post(deactivate_subscription),
        )
        .with_state(state)
}

async fn root() -> Json<Value> {
    Json(json!({
        "service": "notification-sender",
        "endpoints": {
            "send": "/send",
            "send_batch": "/send-batch",
            "status": "/status/{notification_id}",
            "stats": "/stats",
            "subscriptions": "/subscriptions",
        },
    }))
}

async fn health() -> Json<HealthStatus> {
    Json(HealthStatus::healthy("notification-sender"))
}

async fn user_exists(db: &PgPool, user_id: Uuid) -> Result<bool> {
    let row: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(db)
        .await?;
    Ok(row.is_some())
}

/// Create the queued record and schedule asynchronous delivery.
async fn enqueue(state: &SenderState, request: &NotificationSendRequest) -> Result<Value> {
    if !user_exists(&state.db, request.user_id).await? {
        return Err(AppError::not_found("user"));
    }

    let meta = json!({
        "channel": request.channel.to_string(),
        "title": request.title,
        "data": request.data.clone().unwrap_or(json!({})),
    });

    let notification_id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO campaign_notifications
            (id, user_id, campaign_id, message, status, meta, created_at, updated_at)
        VALUES ($1, $2, NULL, $3, $4, $5, $6, $6)
        "#,
    )
    .bind(notification_id)
    .bind(request.user_id)
    .bind(&request.message)
    .bind(NotificationStatus::QUEUED)
    .bind(&meta)
    .bind(Utc::now())
    .execute(&state.db)
    .await?;

    let manager = state.manager.clone();
    let request = request.clone();
    tokio::spawn(async move {
        manager
            .send_notification(
                notification_id,
                request.user_id,
                &request.message,
                &request.title,
                request.channel,
                request.data.as_ref(),
            )
            .await;
    });

    Ok(json!({
        "notification_id": notification_id,
        "user_id": request.user_id,
        "status": NotificationStatus::QUEUED,
    }))
}

async fn send_notification(
    State(state): State<SenderState>,
    Json(request): Json<NotificationSendRequest>,
) -> Result<Json<Value>> {
    let result = enqueue(&state, &request).await?;
    Ok(Json(result))
}

/// Batch endpoint: each request is processed independently and reports its
/// own outcome.
async fn send_batch(
    State(state): State<SenderState>,
    Json(batch): Json<BatchSendRequest>,
) -> Json<Value> {
    let mut results = Vec::with_capacity(batch.requests.len());

    for request in &batch.requests {
        match enqueue(&state, request).await {
            Ok(result) => results.push(result),
            Err(e) => results.push(json!({
                "user_id": request.user_id,
                "status": "error",
                "error": e.to_string(),
            })),
        }
    }

    Json(json!({ "results": results }))
}

async fn notification_status(
    State(state): State<SenderState>,
    Path(notification_id): Path<Uuid>,
) -> Result<Json<Value>> {
    let row: Option<(String, chrono::DateTime<Utc>, chrono::DateTime<Utc>, Value)> =
        sqlx::query_as(
            "SELECT status, created_at, updated_at, meta FROM campaign_notifications WHERE id = $1",
        )
        .bind(notification_id)
        .fetch_optional(&state.db)
        .await?;

    let (status, created_at, updated_at, meta) =
        row.ok_or_else(|| AppError::not_found("notification"))?;

    Ok(Json(json!({
        "id": notification_id,
        "status": status,
        "created_at": created_at,
        "updated_at": updated_at,
        "meta": meta,
    })))
}

async fn sender_stats(State(state): State<SenderState>) -> Result<Json<SenderStats>> {
    let (total, queued, sent, failed): (i64, i64, i64, i64) = sqlx::query_as(
        r#"
        SELECT COUNT(*),
               COUNT(*) FILTER (WHERE status = 'queued'),
               COUNT(*) FILTER (WHERE status = 'sent'),
               COUNT(*) FILTER (WHERE status = 'failed')
        FROM campaign_notifications
        "#,
    )
    .fetch_one(&state.db)
    .await?;

    let rows: Vec<(Option<String>, String, i64)> = sqlx::query_as(
        r#"
        SELECT meta->>'channel', status, COUNT(*)
        FROM campaign_notifications
        GROUP BY meta->>'channel', status
        "#,
    )
    .fetch_all(&state.db)
    .await?;

    let mut channel_stats: HashMap<String, ChannelCounts> = HashMap::new();
    for (channel, status, count) in rows {
        let entry = channel_stats
            .entry(channel.unwrap_or_else(|| "unknown".to_string()))
            .or_default();
        entry.total += count;
        match status.as_str() {
            "queued" => entry.queued += count,
            "sent" => entry.sent += count,
            "failed" => entry.failed += count,
            _ => {}
        }
    }

    Ok(Json(SenderStats {
        total_notifications: total,
        queued_notifications: queued,
        sent_notifications: sent,
        failed_notifications: failed,
        channel_stats,
    }))
}

#[derive(Debug, Deserialize)]
struct SubscriptionRequest {
    user_id: Uuid,
    channel: ChannelType,
    subscription_data: Value,
}

async fn register_subscription(
    State(state): State<SenderState>,
    Json(request): Json<SubscriptionRequest>,
) -> Result<Json<UserSubscription>> {
    if !user_exists(&state.db, request.user_id).await? {
        return Err(AppError::not_found("user"));
    }

    if request.channel == ChannelType::Webpush
        && !super::adapters::WebPushAdapter::validate_subscription(&request.subscription_data)
    {
        return Err(AppError::validation(
            "Webpush subscriptions need endpoint and p256dh/auth keys",
        ));
    }

    let subscription = sqlx::query_as::<_, UserSubscription>(
        r#"
        INSERT INTO user_subscriptions
            (id, user_id, channel, subscription_data, is_active, created_at, updated_at)
        VALUES ($1, $2, $3, $4, TRUE, $5, $5)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(request.user_id)
    .bind(request.channel.to_string())
    .bind(&request.subscription_data)
    .bind(Utc::now())
    .fetch_one(&state.db)
    .await?;

    tracing::info!(
        user_id = %request.user_id,
        channel = %request.channel,
        "Subscription registered"
    );

    Ok(Json(subscription))
}

async fn deactivate_subscription(
    State(state): State<SenderState>,
    Path(subscription_id): Path<Uuid>,
) -> Result<Json<Value>> {
    let result = sqlx::query(
        "UPDATE user_subscriptions SET is_active = FALSE, updated_at = $2 WHERE id = $1",
    )
    .bind(subscription_id)
    .bind(Utc::now())
    .execute(&state.db)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found("subscription"));
    }

    Ok(Json(json!({"subscription_id": subscription_id, "is_active": false})))
}
