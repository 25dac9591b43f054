//! Market-store registry endpoints

use crate::domains::stores::{
    service::{CreateStoreRequest, UpdateStoreRequest},
    StoreService,
};
use crate::middleware::{require_admin, CurrentUser};
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use shared::{MarketStore, Result};
use uuid::Uuid;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/market-stores", get(list_stores).post(create_store))
        .route(
            "/market-stores/:store_id",
            get(get_store).put(update_store).delete(deactivate_store),
        )
        .route("/market-stores/verify/:name", get(verify_store))
}

fn stores(state: &AppState) -> StoreService {
    StoreService::new(state.db_pool.clone())
}

#[derive(Debug, Default, Deserialize)]
struct ListQuery {
    #[serde(default)]
    include_inactive: bool,
}

async fn list_stores(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<MarketStore>>> {
    let stores = stores(&state).list(query.include_inactive).await?;
    Ok(Json(stores))
}

async fn create_store(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
    Json(request): Json<CreateStoreRequest>,
) -> Result<Json<MarketStore>> {
    require_admin(&ctx)?;
    let store = stores(&state).create(request).await?;
    Ok(Json(store))
}

async fn get_store(
    State(state): State<AppState>,
    Path(store_id): Path<Uuid>,
) -> Result<Json<MarketStore>> {
    let store = stores(&state).get(store_id).await?;
    Ok(Json(store))
}

async fn update_store(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
    Path(store_id): Path<Uuid>,
    Json(request): Json<UpdateStoreRequest>,
) -> Result<Json<MarketStore>> {
    require_admin(&ctx)?;
    let store = stores(&state).update(store_id, request).await?;
    Ok(Json(store))
}

async fn deactivate_store(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
    Path(store_id): Path<Uuid>,
) -> Result<Json<MarketStore>> {
    require_admin(&ctx)?;
    let store = stores(&state).deactivate(store_id).await?;
    Ok(Json(store))
}

async fn verify_store(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Value>> {
    let is_market_store = stores(&state).is_market_store(&name).await?;
    Ok(Json(json!({
        "store_name": name,
        "is_market_store": is_market_store,
    })))
}
