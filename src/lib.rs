use axum::{extract::DefaultBodyLimit, middleware as axum_middleware, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod db;
pub mod domains;
pub mod middleware;
pub mod sender;
pub mod services;
pub mod state;

use api::create_api_router;
use shared::auth::middleware::auth_middleware;
use state::AppState;

/// Router for the main backend service.
pub fn create_app_router(app_state: AppState) -> Router {
    let body_limit = app_state.config.uploads.max_file_size_bytes as usize + 1024 * 1024;

    create_api_router()
        .layer(axum_middleware::from_fn_with_state(
            app_state.auth.clone(),
            auth_middleware,
        ))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}
