//! Admin CRM endpoints: segments, campaigns, outbound notifications and
//! preference inference. Everything here sits behind the admin guard.

use crate::domains::crm::{
    campaigns::{CampaignResponse, CreateCampaignRequest},
    segments::CreateSegmentRequest,
    CampaignService, PreferenceService, SegmentService,
};
use crate::domains::identity::IdentityService;
use crate::middleware::{require_admin, CurrentUser};
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use shared::{CampaignNotification, ChannelType, Result, Segment};
use uuid::Uuid;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/segments", get(list_segments).post(create_segment))
        .route("/segments/:segment_id", get(get_segment))
        .route("/segments/:segment_id/preview-users", post(preview_segment))
        .route("/campaigns", get(list_campaigns).post(create_campaign))
        .route("/campaigns/:campaign_id", get(get_campaign))
        .route(
            "/campaigns/:campaign_id/preview-users",
            post(preview_campaign),
        )
        .route("/campaigns/:campaign_id/dispatch", post(dispatch_campaign))
        .route(
            "/campaigns/:campaign_id/send-notifications",
            post(send_campaign_notifications),
        )
        .route("/notifications", get(list_notifications))
        .route(
            "/notifications/:notification_id/mark-sent",
            post(mark_notification_sent),
        )
        .route("/preferences/summary", get(preferences_summary))
        .route("/preferences/infer-all", post(infer_all_preferences))
        .route("/preferences/infer-new", post(infer_new_preferences))
        .route("/preferences/infer/:user_id", post(infer_user_preferences))
        .route("/preferences/:user_id", get(get_user_preferences))
}

fn preferences(state: &AppState) -> PreferenceService {
    PreferenceService::new(state.db_pool.clone(), state.textgen.clone())
}

fn segments(state: &AppState) -> SegmentService {
    SegmentService::new(
        state.db_pool.clone(),
        state.textgen.clone(),
        preferences(state),
    )
}

fn campaigns(state: &AppState) -> CampaignService {
    CampaignService::new(
        state.db_pool.clone(),
        state.textgen.clone(),
        segments(state),
        state.sender.clone(),
    )
}

async fn create_segment(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
    Json(request): Json<CreateSegmentRequest>,
) -> Result<Json<Segment>> {
    require_admin(&ctx)?;
    let segment = segments(&state).create(request).await?;
    Ok(Json(segment))
}

async fn list_segments(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
) -> Result<Json<Vec<Segment>>> {
    require_admin(&ctx)?;
    let segments = segments(&state).list().await?;
    Ok(Json(segments))
}

async fn get_segment(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
    Path(segment_id): Path<Uuid>,
) -> Result<Json<Segment>> {
    require_admin(&ctx)?;
    let segment = segments(&state).get(segment_id).await?;
    Ok(Json(segment))
}

#[derive(Debug, Deserialize)]
struct PreviewQuery {
    #[serde(default = "default_preview_limit")]
    limit: usize,
}

fn default_preview_limit() -> usize {
    100
}

async fn preview_segment(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
    Path(segment_id): Path<Uuid>,
    Query(query): Query<PreviewQuery>,
) -> Result<Json<Vec<Uuid>>> {
    require_admin(&ctx)?;

    let users = segments(&state)
        .preview_users(segment_id, query.limit.clamp(1, 1000))
        .await?;
    Ok(Json(users))
}

async fn create_campaign(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
    Json(request): Json<CreateCampaignRequest>,
) -> Result<Json<CampaignResponse>> {
    require_admin(&ctx)?;
    let campaign = campaigns(&state).create(request).await?;
    Ok(Json(campaign))
}

async fn list_campaigns(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
) -> Result<Json<Vec<CampaignResponse>>> {
    require_admin(&ctx)?;
    let campaigns = campaigns(&state).list().await?;
    Ok(Json(campaigns))
}

async fn get_campaign(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
    Path(campaign_id): Path<Uuid>,
) -> Result<Json<CampaignResponse>> {
    require_admin(&ctx)?;
    let campaign = campaigns(&state).get(campaign_id).await?;
    Ok(Json(campaign))
}

async fn preview_campaign(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
    Path(campaign_id): Path<Uuid>,
    Query(query): Query<PreviewQuery>,
) -> Result<Json<Vec<Uuid>>> {
    require_admin(&ctx)?;

    let users = campaigns(&state)
        .preview_users(campaign_id, query.limit.clamp(1, 1000))
        .await?;
    Ok(Json(users))
}

async fn dispatch_campaign(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
    Path(campaign_id): Path<Uuid>,
) -> Result<Json<Vec<CampaignNotification>>> {
    require_admin(&ctx)?;
    let notifications = campaigns(&state).dispatch(campaign_id).await?;
    Ok(Json(notifications))
}

#[derive(Debug, Deserialize)]
struct SendQuery {
    #[serde(default = "default_channel")]
    channel: ChannelType,
}

fn default_channel() -> ChannelType {
    ChannelType::Webpush
}

async fn send_campaign_notifications(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
    Path(campaign_id): Path<Uuid>,
    Query(query): Query<SendQuery>,
) -> Result<Json<Value>> {
    require_admin(&ctx)?;

    let result = campaigns(&state)
        .send_notifications(campaign_id, query.channel)
        .await?;
    Ok(Json(result))
}

#[derive(Debug, Deserialize)]
struct NotificationListQuery {
    status: Option<String>,
}

async fn list_notifications(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
    Query(query): Query<NotificationListQuery>,
) -> Result<Json<Vec<CampaignNotification>>> {
    require_admin(&ctx)?;

    let notifications = campaigns(&state)
        .list_notifications(query.status.as_deref())
        .await?;
    Ok(Json(notifications))
}

#[derive(Debug, Deserialize)]
struct MarkSentRequest {
    delivery_info: Option<Value>,
}

async fn mark_notification_sent(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
    Path(notification_id): Path<Uuid>,
    Json(request): Json<MarkSentRequest>,
) -> Result<Json<CampaignNotification>> {
    require_admin(&ctx)?;

    let notification = campaigns(&state)
        .mark_notification_sent(notification_id, request.delivery_info)
        .await?;
    Ok(Json(notification))
}

async fn get_user_preferences(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Value>> {
    require_admin(&ctx)?;

    let preferences = preferences(&state).get_with_inference(user_id).await?;
    Ok(Json(json!({
        "user_id": user_id,
        "preferences": preferences,
    })))
}

async fn infer_user_preferences(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Value>> {
    require_admin(&ctx)?;

    let preferences = preferences(&state).update_automatically(user_id).await?;
    Ok(Json(json!({
        "user_id": user_id,
        "preferences": preferences,
    })))
}

async fn infer_all_preferences(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
) -> Result<Json<Value>> {
    require_admin(&ctx)?;

    let results = preferences(&state).infer_all().await?;
    Ok(Json(json!({
        "processed_users": results.len(),
        "results": results,
    })))
}

#[derive(Debug, Deserialize)]
struct InferNewQuery {
    #[serde(default = "default_days_back")]
    days_back: i64,
}

fn default_days_back() -> i64 {
    30
}

async fn infer_new_preferences(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
    Query(query): Query<InferNewQuery>,
) -> Result<Json<Value>> {
    require_admin(&ctx)?;

    let results = preferences(&state).infer_new(query.days_back).await?;
    Ok(Json(json!({
        "processed_users": results.len(),
        "days_back": query.days_back.clamp(1, 365),
        "results": results,
    })))
}

async fn preferences_summary(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
) -> Result<Json<Value>> {
    require_admin(&ctx)?;

    let summary = IdentityService::new(state.db_pool.clone(), state.auth.clone())
        .preferences_summary()
        .await?;
    Ok(Json(summary))
}
