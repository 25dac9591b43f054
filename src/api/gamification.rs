//! Gamification endpoints: profiles, XP, badges, rewards, redemptions,
//! special rewards and the in-app notification feed.

use crate::domains::gamification::{
    engine::UserStats,
    notifications::NotificationStats,
    rewards::{CodeValidation, RedemptionReceipt},
    special::{CreateSpecialRewardRequest, DistributionResult, SpecialRewardView},
    GamificationEngine, NotificationService, RewardService, SpecialRewardService,
};
use crate::middleware::{
    require_admin, require_self_or_admin, require_vendor_or_admin, CurrentUser,
};
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use shared::{
    ExperienceEntry, GamificationProfile, RedemptionWithReward, Result, Reward,
    RewardRedemption, SpecialReward, SpecialRewardRedemption, TicketProcessedEvent,
    UserBadge, UserNotification,
};
use uuid::Uuid;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users/:user_id/stats", get(user_stats))
        .route("/users/:user_id/profile", get(user_profile))
        .route("/users/:user_id/badges", get(user_badges))
        .route("/users/:user_id/experience-log", get(experience_log))
        .route("/events/ticket-processed", post(ticket_processed))
        .route("/users/:user_id/add-experience", post(add_experience))
        .route("/users/:user_id/reset", post(reset_profile))
        .route("/rewards", get(list_rewards).post(create_reward))
        .route("/rewards/:reward_id", get(get_reward))
        .route(
            "/users/:user_id/redeem-reward/:reward_id",
            post(redeem_reward),
        )
        .route("/users/:user_id/redemptions", get(user_redemptions))
        .route("/redemptions/:code/use", post(use_redemption))
        .route("/redemptions/:code/expire", post(expire_redemption))
        .route("/redemptions/:code", get(validate_redemption))
        .route("/special-rewards", post(create_special_reward))
        .route(
            "/special-rewards/:reward_id/distribute",
            post(distribute_special_reward),
        )
        .route("/users/:user_id/special-rewards", get(user_special_rewards))
        .route(
            "/users/:user_id/special-rewards/available",
            get(available_special_rewards),
        )
        .route(
            "/users/:user_id/redeem-special/:reward_id",
            post(redeem_special_reward),
        )
        .route("/users/:user_id/notifications", get(user_notifications))
        .route(
            "/users/:user_id/notifications/read-all",
            post(mark_all_notifications_read),
        )
        .route(
            "/users/:user_id/notifications/:notification_id/read",
            post(mark_notification_read),
        )
        .route(
            "/users/:user_id/notifications/stats",
            get(notification_stats),
        )
}

fn engine(state: &AppState) -> GamificationEngine {
    GamificationEngine::new(state.db_pool.clone())
}

fn rewards(state: &AppState) -> RewardService {
    RewardService::new(state.db_pool.clone())
}

fn special(state: &AppState) -> SpecialRewardService {
    SpecialRewardService::new(state.db_pool.clone())
}

fn notifications(state: &AppState) -> NotificationService {
    NotificationService::new(state.db_pool.clone())
}

async fn user_stats(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
    Path(user_id): Path<Uuid>,
) -> Result<Json<UserStats>> {
    require_self_or_admin(&ctx, user_id)?;
    let stats = engine(&state).get_user_stats(user_id).await?;
    Ok(Json(stats))
}

async fn user_profile(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
    Path(user_id): Path<Uuid>,
) -> Result<Json<GamificationProfile>> {
    require_self_or_admin(&ctx, user_id)?;
    let profile = engine(&state).get_or_create_profile(user_id).await?;
    Ok(Json(profile))
}

async fn user_badges(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Vec<UserBadge>>> {
    require_self_or_admin(&ctx, user_id)?;
    let badges = engine(&state).get_badges(user_id).await?;
    Ok(Json(badges))
}

#[derive(Debug, Deserialize)]
struct LogQuery {
    #[serde(default = "default_log_limit")]
    limit: i64,
}

fn default_log_limit() -> i64 {
    20
}

async fn experience_log(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
    Path(user_id): Path<Uuid>,
    Query(query): Query<LogQuery>,
) -> Result<Json<Vec<ExperienceEntry>>> {
    require_self_or_admin(&ctx, user_id)?;
    let log = engine(&state)
        .get_experience_log(user_id, query.limit.clamp(1, 200))
        .await?;
    Ok(Json(log))
}

/// Internal event intake; the in-process pipeline normally calls the
/// engine directly, this endpoint serves external processors.
async fn ticket_processed(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
    Json(event): Json<TicketProcessedEvent>,
) -> Result<Json<Value>> {
    require_admin(&ctx)?;

    let lock = state.user_lock(event.user_id);
    let _guard = lock.lock().await;

    let (profile, new_badges) = engine(&state).process_ticket_event(&event).await?;

    Ok(Json(json!({
        "message": "Event processed",
        "user_id": event.user_id,
        "ticket_id": event.ticket_id,
        "level": profile.level,
        "experience": profile.experience,
        "new_badges": new_badges.len(),
    })))
}

#[derive(Debug, Deserialize)]
struct AddExperienceRequest {
    experience_gained: i32,
    reason: String,
    ticket_id: Option<Uuid>,
}

async fn add_experience(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
    Path(user_id): Path<Uuid>,
    Json(request): Json<AddExperienceRequest>,
) -> Result<Json<Value>> {
    require_admin(&ctx)?;

    let profile = engine(&state)
        .add_experience(
            user_id,
            request.experience_gained,
            &request.reason,
            request.ticket_id,
        )
        .await?;

    Ok(Json(json!({
        "message": "Experience added",
        "user_id": user_id,
        "experience_gained": request.experience_gained,
        "new_total_experience": profile.experience,
        "new_level": profile.level,
    })))
}

async fn reset_profile(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Value>> {
    require_admin(&ctx)?;
    engine(&state).reset(user_id).await?;
    Ok(Json(json!({
        "message": "Gamification profile reset",
        "user_id": user_id,
    })))
}

async fn list_rewards(State(state): State<AppState>) -> Result<Json<Vec<Reward>>> {
    let rewards = rewards(&state).list_active().await?;
    Ok(Json(rewards))
}

#[derive(Debug, Deserialize)]
struct CreateRewardRequest {
    name: String,
    description: Option<String>,
    points_cost: i32,
    reward_type: String,
    reward_value: Option<String>,
    max_redemptions: Option<i32>,
}

async fn create_reward(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
    Json(request): Json<CreateRewardRequest>,
) -> Result<Json<Reward>> {
    require_admin(&ctx)?;

    let reward = rewards(&state)
        .create(
            &request.name,
            request.description.as_deref(),
            request.points_cost,
            &request.reward_type,
            request.reward_value.as_deref(),
            request.max_redemptions,
        )
        .await?;
    Ok(Json(reward))
}

async fn get_reward(
    State(state): State<AppState>,
    Path(reward_id): Path<Uuid>,
) -> Result<Json<Reward>> {
    let reward = rewards(&state).get(reward_id).await?;
    Ok(Json(reward))
}

async fn redeem_reward(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
    Path((user_id, reward_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<RedemptionReceipt>> {
    require_self_or_admin(&ctx, user_id)?;

    let lock = state.user_lock(user_id);
    let _guard = lock.lock().await;

    let receipt = rewards(&state).redeem(user_id, reward_id).await?;
    Ok(Json(receipt))
}

#[derive(Debug, Deserialize)]
struct RedemptionQuery {
    status: Option<String>,
}

async fn user_redemptions(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
    Path(user_id): Path<Uuid>,
    Query(query): Query<RedemptionQuery>,
) -> Result<Json<Vec<RedemptionWithReward>>> {
    require_self_or_admin(&ctx, user_id)?;

    let redemptions = rewards(&state)
        .user_redemptions(user_id, query.status.as_deref())
        .await?;
    Ok(Json(redemptions))
}

async fn use_redemption(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
    Path(code): Path<String>,
) -> Result<Json<RewardRedemption>> {
    require_vendor_or_admin(&ctx)?;
    let redemption = rewards(&state).use_code(&code).await?;
    Ok(Json(redemption))
}

async fn expire_redemption(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
    Path(code): Path<String>,
) -> Result<Json<RewardRedemption>> {
    require_vendor_or_admin(&ctx)?;
    let redemption = rewards(&state).expire_code(&code).await?;
    Ok(Json(redemption))
}

async fn validate_redemption(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<CodeValidation>> {
    let validation = rewards(&state).validate_code(&code).await?;
    Ok(Json(validation))
}

async fn create_special_reward(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
    Json(request): Json<CreateSpecialRewardRequest>,
) -> Result<Json<SpecialReward>> {
    require_admin(&ctx)?;
    let reward = special(&state).create(request).await?;
    Ok(Json(reward))
}

#[derive(Debug, Deserialize)]
struct DistributeRequest {
    target_users: Vec<Uuid>,
    #[serde(default = "default_true")]
    send_notifications: bool,
}

fn default_true() -> bool {
    true
}

async fn distribute_special_reward(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
    Path(reward_id): Path<Uuid>,
    Json(request): Json<DistributeRequest>,
) -> Result<Json<DistributionResult>> {
    require_admin(&ctx)?;

    let result = special(&state)
        .distribute(
            reward_id,
            &request.target_users,
            request.send_notifications,
            &notifications(&state),
        )
        .await?;
    Ok(Json(result))
}

#[derive(Debug, Default, Deserialize)]
struct SegmentsQuery {
    /// Comma-separated segment names used for targeted-reward access
    segments: Option<String>,
}

fn parse_segments(query: &SegmentsQuery) -> Vec<String> {
    query
        .segments
        .as_deref()
        .map(|raw| {
            raw.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

async fn user_special_rewards(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
    Path(user_id): Path<Uuid>,
    Query(query): Query<SegmentsQuery>,
) -> Result<Json<Vec<SpecialRewardView>>> {
    require_self_or_admin(&ctx, user_id)?;

    let views = special(&state)
        .all_for_user(user_id, &parse_segments(&query))
        .await?;
    Ok(Json(views))
}

async fn available_special_rewards(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
    Path(user_id): Path<Uuid>,
    Query(query): Query<SegmentsQuery>,
) -> Result<Json<Vec<SpecialReward>>> {
    require_self_or_admin(&ctx, user_id)?;

    let available = special(&state)
        .available_for_user(user_id, &parse_segments(&query))
        .await?;
    Ok(Json(available))
}

async fn redeem_special_reward(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
    Path((user_id, reward_id)): Path<(Uuid, Uuid)>,
    Query(query): Query<SegmentsQuery>,
) -> Result<Json<SpecialRewardRedemption>> {
    require_self_or_admin(&ctx, user_id)?;

    let lock = state.user_lock(user_id);
    let _guard = lock.lock().await;

    let redemption = special(&state)
        .redeem(user_id, reward_id, &parse_segments(&query))
        .await?;
    Ok(Json(redemption))
}

#[derive(Debug, Deserialize)]
struct NotificationQuery {
    #[serde(default)]
    unread_only: bool,
    #[serde(default = "default_log_limit")]
    limit: i64,
    #[serde(default)]
    offset: i64,
}

async fn user_notifications(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
    Path(user_id): Path<Uuid>,
    Query(query): Query<NotificationQuery>,
) -> Result<Json<Vec<UserNotification>>> {
    require_self_or_admin(&ctx, user_id)?;

    let list = notifications(&state)
        .list(
            user_id,
            query.unread_only,
            query.limit.clamp(1, 200),
            query.offset.max(0),
        )
        .await?;
    Ok(Json(list))
}

async fn mark_notification_read(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
    Path((user_id, notification_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<UserNotification>> {
    require_self_or_admin(&ctx, user_id)?;

    let notification = notifications(&state)
        .mark_read(notification_id, user_id)
        .await?;
    Ok(Json(notification))
}

async fn mark_all_notifications_read(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Value>> {
    require_self_or_admin(&ctx, user_id)?;

    let updated = notifications(&state).mark_all_read(user_id).await?;
    Ok(Json(json!({
        "message": "All notifications marked as read",
        "notifications_updated": updated,
    })))
}

async fn notification_stats(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
    Path(user_id): Path<Uuid>,
) -> Result<Json<NotificationStats>> {
    require_self_or_admin(&ctx, user_id)?;

    let stats = notifications(&state).stats(user_id).await?;
    Ok(Json(stats))
}
