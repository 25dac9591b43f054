//! HTTP surface of the main backend, one router module per subsystem

pub mod auth;
pub mod crm;
pub mod gamification;
pub mod market_stores;
pub mod purchase_history;
pub mod tickets;

use crate::state::AppState;
use axum::{routing::get, Json, Router};
use serde_json::{json, Value};
use shared::HealthStatus;

pub fn create_api_router() -> Router<AppState> {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .merge(auth::router())
        .merge(market_stores::router())
        .merge(tickets::router())
        .merge(purchase_history::router())
        .merge(gamification::router())
        .merge(crm::router())
}

async fn root() -> Json<Value> {
    Json(json!({
        "service": "mercat-backend",
        "endpoints": {
            "auth": "/auth",
            "tickets": "/tickets",
            "market_stores": "/market-stores",
            "purchase_history": "/purchase-history",
            "gamification": "/users/{id}/stats",
            "crm": "/segments",
        },
    }))
}

async fn health() -> Json<HealthStatus> {
    Json(HealthStatus::healthy("mercat-backend"))
}
