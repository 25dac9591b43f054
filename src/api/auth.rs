//! Identity endpoints: registration, login, token lifecycle and the
//! role-guarded admin user operations.

use crate::domains::identity::{
    service::{AdminOverview, AuthResponse, LoginRequest, RegisterRequest},
    IdentityService,
};
use crate::middleware::{require_admin, CurrentUser};
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use shared::{auth::Roles, AppError, Result, TokenPair, UserResponse};
use uuid::Uuid;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/verify", post(verify))
        .route("/auth/refresh", post(refresh))
        .route("/users/me", get(me))
        .route("/admin/users", get(list_users))
        .route("/admin/users/:user_id/promote-vendor", post(promote_vendor))
        .route("/admin/users/:user_id/promote-admin", post(promote_admin))
        .route("/admin/overview", get(admin_overview))
}

fn identity(state: &AppState) -> IdentityService {
    IdentityService::new(state.db_pool.clone(), state.auth.clone())
}

async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<Json<AuthResponse>> {
    // Privileged roles are minted by promotion, not self-registration.
    if matches!(request.role.as_deref(), Some(Roles::ADMIN)) {
        return Err(AppError::authorization(
            "Admin accounts cannot be self-registered",
        ));
    }

    let response = identity(&state).register(request).await?;
    Ok(Json(response))
}

async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<AuthResponse>> {
    let response = identity(&state).login(request).await?;
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
struct VerifyRequest {
    token: String,
}

async fn verify(
    State(state): State<AppState>,
    Json(request): Json<VerifyRequest>,
) -> Result<Json<Value>> {
    let user_id = identity(&state).verify(&request.token)?;
    Ok(Json(json!({"valid": true, "user_id": user_id})))
}

#[derive(Debug, Deserialize)]
struct RefreshRequest {
    refresh_token: String,
}

async fn refresh(
    State(state): State<AppState>,
    Json(request): Json<RefreshRequest>,
) -> Result<Json<TokenPair>> {
    let pair = identity(&state).refresh(&request.refresh_token)?;
    Ok(Json(pair))
}

async fn me(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
) -> Result<Json<UserResponse>> {
    let user_id = shared::utils::parse_uuid(&ctx.user_id, "user")?;
    let user = identity(&state).get_user(user_id).await?;
    Ok(Json(user.into()))
}

#[derive(Debug, Deserialize)]
struct Pagination {
    #[serde(default = "default_limit")]
    limit: i64,
    #[serde(default)]
    offset: i64,
}

fn default_limit() -> i64 {
    50
}

async fn list_users(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
    Query(page): Query<Pagination>,
) -> Result<Json<Vec<UserResponse>>> {
    require_admin(&ctx)?;

    let users = identity(&state)
        .list_users(page.limit.clamp(1, 500), page.offset.max(0))
        .await?;
    Ok(Json(users))
}

async fn promote_vendor(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
    Path(user_id): Path<Uuid>,
) -> Result<Json<UserResponse>> {
    require_admin(&ctx)?;
    let user = identity(&state).promote(user_id, Roles::VENDOR).await?;
    Ok(Json(user))
}

async fn promote_admin(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
    Path(user_id): Path<Uuid>,
) -> Result<Json<UserResponse>> {
    require_admin(&ctx)?;
    let user = identity(&state).promote(user_id, Roles::ADMIN).await?;
    Ok(Json(user))
}

async fn admin_overview(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
) -> Result<Json<AdminOverview>> {
    require_admin(&ctx)?;
    let overview = identity(&state).admin_overview().await?;
    Ok(Json(overview))
}
