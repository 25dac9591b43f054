//! Ticket lifecycle and the uploaded-image file sink

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use shared::{
    config::UploadConfig, utils, AppError, PendingTicket, Result, Ticket, TicketStatus,
};
use sqlx::PgPool;
use std::path::{Path, PathBuf};
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize)]
pub struct DigitalTicketRequest {
    pub user_id: Uuid,
    pub store_name: String,
    pub total_amount: f64,
    #[serde(default)]
    pub products: Value,
    pub purchase_date: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct TicketService {
    db: PgPool,
    uploads: UploadConfig,
}

impl TicketService {
    pub fn new(db: PgPool, uploads: UploadConfig) -> Self {
        Self { db, uploads }
    }

    /// Persist the uploaded image under a content-addressed path and create
    /// the pending ticket record.
    pub async fn upload(
        &self,
        user_id: Uuid,
        original_filename: &str,
        data: &[u8],
    ) -> Result<Ticket> {
        if !utils::validate_file_extension(original_filename, &self.uploads.allowed_extensions) {
            return Err(AppError::validation(format!(
                "File extension not allowed. Allowed: {}",
                self.uploads.allowed_extensions.join(", ")
            )));
        }

        if !utils::validate_file_size(data.len() as u64, self.uploads.max_file_size_bytes) {
            return Err(AppError::validation(format!(
                "File too large. Maximum: {} bytes",
                self.uploads.max_file_size_bytes
            )));
        }

        let filename = utils::content_addressed_filename(data, original_filename);
        let user_dir = PathBuf::from(&self.uploads.upload_dir).join(user_id.to_string());
        tokio::fs::create_dir_all(&user_dir).await?;

        let file_path = user_dir.join(&filename);
        tokio::fs::write(&file_path, data).await?;

        let ticket = sqlx::query_as::<_, Ticket>(
            r#"
            INSERT INTO tickets
                (id, user_id, filename, original_filename, file_path, file_size,
                 mime_type, status, metadata, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, '{}', $9, $9)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(&filename)
        .bind(original_filename)
        .bind(file_path.to_string_lossy().as_ref())
        .bind(data.len() as i64)
        .bind(utils::get_mime_type(original_filename))
        .bind(TicketStatus::PENDING)
        .bind(Utc::now())
        .fetch_one(&self.db)
        .await?;

        tracing::info!(
            ticket_id = %ticket.id,
            user_id = %user_id,
            size = data.len(),
            "Ticket uploaded"
        );

        Ok(ticket)
    }

    /// Vendor-created digital tickets skip the vision pipeline entirely and
    /// are born approved.
    pub async fn create_digital(&self, request: &DigitalTicketRequest) -> Result<Ticket> {
        if request.store_name.trim().is_empty() {
            return Err(AppError::validation("store_name is required"));
        }
        if request.total_amount < 0.0 {
            return Err(AppError::validation("total_amount must be >= 0"));
        }

        let purchase_date = request.purchase_date.unwrap_or_else(Utc::now);
        let num_products = request
            .products
            .as_array()
            .map(|items| items.len())
            .unwrap_or(0);

        let metadata = json!({
            "type": "digital",
            "store_name": request.store_name,
            "total_amount": request.total_amount,
            "products": request.products,
            "purchase_date": purchase_date,
        });

        let processing_result = json!({
            "fecha": purchase_date.format("%d/%m/%Y").to_string(),
            "hora": purchase_date.format("%H:%M").to_string(),
            "tienda": request.store_name,
            "total": request.total_amount,
            "tipo_ticket": "digital",
            "productos": request.products,
            "num_productos": num_products,
            "procesado_correctamente": true,
            "es_tienda_mercado": true,
            "ticket_status": TicketStatus::DONE_APPROVED,
            "status_message": "Digital ticket issued by vendor",
        });

        let ticket = sqlx::query_as::<_, Ticket>(
            r#"
            INSERT INTO tickets
                (id, user_id, filename, original_filename, file_path, file_size,
                 mime_type, status, metadata, processing_result, created_at, updated_at)
            VALUES ($1, $2, '', 'digital', '', 0, 'application/json', $3, $4, $5, $6, $6)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(request.user_id)
        .bind(TicketStatus::DONE_APPROVED)
        .bind(&metadata)
        .bind(&processing_result)
        .bind(Utc::now())
        .fetch_one(&self.db)
        .await?;

        tracing::info!(
            ticket_id = %ticket.id,
            user_id = %request.user_id,
            store = %request.store_name,
            "Digital ticket created"
        );

        Ok(ticket)
    }

    pub async fn get(&self, ticket_id: Uuid) -> Result<Ticket> {
        sqlx::query_as::<_, Ticket>("SELECT * FROM tickets WHERE id = $1")
            .bind(ticket_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::not_found("ticket"))
    }

    /// Pending tickets in arrival order (oldest first)
    pub async fn pending(&self, limit: i64) -> Result<Vec<Ticket>> {
        let tickets = sqlx::query_as::<_, Ticket>(
            r#"
            SELECT * FROM tickets
            WHERE status = $1
            ORDER BY created_at ASC
            LIMIT $2
            "#,
        )
        .bind(TicketStatus::PENDING)
        .bind(limit)
        .fetch_all(&self.db)
        .await?;

        Ok(tickets)
    }

    /// Pending tickets with their image bytes inlined for workers
    pub async fn pending_with_images(&self, limit: i64) -> Result<Vec<PendingTicket>> {
        use base64::{engine::general_purpose, Engine as _};

        let tickets = self.pending(limit).await?;
        let mut result = Vec::with_capacity(tickets.len());

        for ticket in tickets {
            let image_base64 = match self.read_image(&ticket).await {
                Ok(bytes) => general_purpose::STANDARD.encode(bytes),
                Err(e) => {
                    tracing::warn!(ticket_id = %ticket.id, error = %e, "Image missing for pending ticket");
                    String::new()
                }
            };

            result.push(PendingTicket {
                id: ticket.id,
                user_id: ticket.user_id,
                original_filename: ticket.original_filename,
                image_base64,
                created_at: ticket.created_at,
            });
        }

        Ok(result)
    }

    pub async fn user_history(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Ticket>> {
        let tickets = sqlx::query_as::<_, Ticket>(
            r#"
            SELECT * FROM tickets
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db)
        .await?;

        Ok(tickets)
    }

    pub async fn read_image(&self, ticket: &Ticket) -> Result<Vec<u8>> {
        if ticket.file_path.is_empty() {
            return Err(AppError::not_found("ticket image"));
        }

        Ok(tokio::fs::read(Path::new(&ticket.file_path)).await?)
    }

    /// Move a pending ticket to its single terminal status, attaching the
    /// authoritative processing result. Only pending tickets transition.
    pub async fn set_terminal_status(
        &self,
        ticket_id: Uuid,
        status: &str,
        processing_result: &Value,
    ) -> Result<Ticket> {
        if !TicketStatus::TERMINAL.contains(&status) {
            return Err(AppError::internal(format!("Not a terminal status: {}", status)));
        }

        let updated = sqlx::query_as::<_, Ticket>(
            r#"
            UPDATE tickets
            SET status = $2, processing_result = $3, updated_at = $4
            WHERE id = $1 AND status = $5
            RETURNING *
            "#,
        )
        .bind(ticket_id)
        .bind(status)
        .bind(processing_result)
        .bind(Utc::now())
        .bind(TicketStatus::PENDING)
        .fetch_optional(&self.db)
        .await?;

        updated.ok_or_else(|| {
            AppError::conflict(format!("Ticket {} is not pending anymore", ticket_id))
        })
    }

    /// Processing results of the user's prior terminal tickets, the
    /// population the duplicate detector compares against.
    pub async fn prior_terminal_results(
        &self,
        user_id: Uuid,
        exclude_ticket: Uuid,
    ) -> Result<Vec<Value>> {
        let rows: Vec<(Value,)> = sqlx::query_as(
            r#"
            SELECT processing_result FROM tickets
            WHERE user_id = $1
              AND id != $2
              AND status IN ('done_approved', 'done_rejected', 'duplicate')
              AND processing_result IS NOT NULL
            "#,
        )
        .bind(user_id)
        .bind(exclude_ticket)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(|(r,)| r).collect())
    }
}
