//! Purchase-history endpoints

use crate::domains::history::{
    service::{CreatePurchaseRequest, PurchaseSummary, SpendingPeriod},
    HistoryService,
};
use crate::middleware::{require_admin, require_self_or_admin, CurrentUser};
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use shared::{PurchaseRecord, Result};
use uuid::Uuid;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/purchase-history/create", post(create_record))
        .route("/users/:user_id/purchase-history", get(purchase_history))
        .route("/users/:user_id/purchase-summary", get(purchase_summary))
        .route("/users/:user_id/spending-by-period", get(spending_by_period))
}

fn history(state: &AppState) -> HistoryService {
    HistoryService::new(state.db_pool.clone())
}

async fn create_record(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
    Json(request): Json<CreatePurchaseRequest>,
) -> Result<Json<PurchaseRecord>> {
    require_admin(&ctx)?;

    let record = history(&state).create_purchase_record(request).await?;
    Ok(Json(record))
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    #[serde(default = "default_limit")]
    limit: i64,
    #[serde(default)]
    offset: i64,
}

fn default_limit() -> i64 {
    50
}

async fn purchase_history(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
    Path(user_id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<PurchaseRecord>>> {
    require_self_or_admin(&ctx, user_id)?;

    let records = history(&state)
        .get_user_purchase_history(user_id, query.limit.clamp(1, 200), query.offset.max(0))
        .await?;
    Ok(Json(records))
}

async fn purchase_summary(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
    Path(user_id): Path<Uuid>,
) -> Result<Json<PurchaseSummary>> {
    require_self_or_admin(&ctx, user_id)?;

    let summary = history(&state).get_user_purchase_summary(user_id).await?;
    Ok(Json(summary))
}

#[derive(Debug, Deserialize)]
struct PeriodQuery {
    #[serde(default = "default_days")]
    days: i64,
}

fn default_days() -> i64 {
    30
}

async fn spending_by_period(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
    Path(user_id): Path<Uuid>,
    Query(query): Query<PeriodQuery>,
) -> Result<Json<SpendingPeriod>> {
    require_self_or_admin(&ctx, user_id)?;

    let period = history(&state)
        .get_user_spending_by_period(user_id, query.days.clamp(1, 365))
        .await?;
    Ok(Json(period))
}
