//! Ticket endpoints: upload, digital issuing, processing and history

use crate::domains::tickets::{service::DigitalTicketRequest, TicketService};
use crate::middleware::{
    require_admin, require_self_or_admin, require_vendor_or_admin, CurrentUser,
};
use crate::services::ProcessingPipeline;
use crate::state::AppState;
use axum::{
    extract::{Multipart, Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use shared::{AppError, PendingTicket, ProcessingResult, Result, TicketResponse};
use uuid::Uuid;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/tickets/upload", post(upload_ticket))
        .route("/tickets/digital", post(create_digital_ticket))
        .route("/tickets/pending", get(pending_tickets))
        .route("/tickets/process-pending", post(process_pending))
        .route("/tickets/:ticket_id/process", post(process_ticket))
        .route("/tickets/history/:user_id", get(ticket_history))
        .route("/tickets/:ticket_id", get(get_ticket))
}

fn tickets(state: &AppState) -> TicketService {
    TicketService::new(state.db_pool.clone(), state.config.uploads.clone())
}

/// Multipart upload: `file` (image) + optional `user_id` (admins may
/// upload on behalf of another user).
async fn upload_ticket(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
    mut multipart: Multipart,
) -> Result<Json<TicketResponse>> {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut user_id: Option<Uuid> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::validation(format!("Malformed multipart body: {}", e)))?
    {
        let name = field.name().map(|n| n.to_string());
        match name.as_deref() {
            Some("file") => {
                let filename = field
                    .file_name()
                    .map(|f| f.to_string())
                    .ok_or_else(|| AppError::validation("File field needs a filename"))?;
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::validation(format!("Failed to read upload: {}", e)))?;
                file = Some((filename, data.to_vec()));
            }
            Some("user_id") => {
                let raw = field
                    .text()
                    .await
                    .map_err(|e| AppError::validation(format!("Malformed user_id field: {}", e)))?;
                user_id = Some(shared::utils::parse_uuid(&raw, "user")?);
            }
            _ => {}
        }
    }

    let (filename, data) = file.ok_or_else(|| AppError::validation("Missing file field"))?;

    let caller_id = shared::utils::parse_uuid(&ctx.user_id, "user")?;
    let target_user = user_id.unwrap_or(caller_id);
    require_self_or_admin(&ctx, target_user)?;

    let ticket = tickets(&state).upload(target_user, &filename, &data).await?;
    Ok(Json(ticket.into()))
}

/// Vendor-issued digital ticket: created approved and fanned out to
/// history and gamification immediately.
async fn create_digital_ticket(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
    Json(request): Json<DigitalTicketRequest>,
) -> Result<Json<TicketResponse>> {
    require_vendor_or_admin(&ctx)?;

    let ticket = tickets(&state).create_digital(&request).await?;

    let purchase_date = ticket
        .metadata
        .get("purchase_date")
        .and_then(|d| d.as_str())
        .and_then(|d| d.parse::<DateTime<Utc>>().ok())
        .unwrap_or_else(Utc::now);

    ProcessingPipeline::new(&state)
        .fan_out_digital(
            &ticket,
            &request.store_name,
            request.total_amount,
            &request.products,
            purchase_date,
        )
        .await;

    Ok(Json(ticket.into()))
}

#[derive(Debug, Deserialize)]
struct PendingQuery {
    #[serde(default = "default_pending_limit")]
    limit: i64,
}

fn default_pending_limit() -> i64 {
    50
}

/// Pending queue with inlined base64 images, consumed by processing
/// workers.
async fn pending_tickets(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
    Query(query): Query<PendingQuery>,
) -> Result<Json<Vec<PendingTicket>>> {
    require_admin(&ctx)?;

    let pending = tickets(&state)
        .pending_with_images(query.limit.clamp(1, 200))
        .await?;
    Ok(Json(pending))
}

async fn process_ticket(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
    Path(ticket_id): Path<Uuid>,
) -> Result<Json<ProcessingResult>> {
    require_admin(&ctx)?;

    let pipeline = ProcessingPipeline::new(&state);
    let ticket = pipeline.tickets().get(ticket_id).await?;
    let result = pipeline.process_ticket(&ticket).await?;
    Ok(Json(result))
}

async fn process_pending(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
) -> Result<Json<Value>> {
    require_admin(&ctx)?;

    // Synchronous drain runs without the inter-ticket spacing.
    let summary = ProcessingPipeline::new(&state)
        .process_pending_batch(std::time::Duration::ZERO, || false)
        .await?;
    Ok(Json(summary))
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    #[serde(default = "default_pending_limit")]
    limit: i64,
    #[serde(default)]
    offset: i64,
}

async fn ticket_history(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
    Path(user_id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<TicketResponse>>> {
    require_self_or_admin(&ctx, user_id)?;

    let history = tickets(&state)
        .user_history(user_id, query.limit.clamp(1, 200), query.offset.max(0))
        .await?;
    Ok(Json(history.into_iter().map(TicketResponse::from).collect()))
}

async fn get_ticket(
    State(state): State<AppState>,
    CurrentUser(ctx): CurrentUser,
    Path(ticket_id): Path<Uuid>,
) -> Result<Json<TicketResponse>> {
    let ticket = tickets(&state).get(ticket_id).await?;
    require_self_or_admin(&ctx, ticket.user_id)?;
    Ok(Json(ticket.into()))
}
