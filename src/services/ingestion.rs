//! Ticket ingestion pipeline and the background worker driving it
//!
//! The worker polls pending tickets in arrival order, runs each through
//! the vision model, the duplicate detector and the market-store check,
//! then fans out to purchase history and gamification. One ticket is in
//! flight at a time and tickets of the same user are additionally guarded
//! by the per-user lock, which the synchronous processing endpoints share.

use crate::domains::gamification::GamificationEngine;
use crate::domains::history::{service::CreatePurchaseRequest, HistoryService};
use crate::domains::stores::StoreService;
use crate::domains::tickets::{vision, DuplicateDetector, TicketService};
use crate::state::AppState;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};
use shared::{
    config::WorkerConfig, utils::parse_ticket_datetime, AppError, ExtractedTicket,
    ProcessingResult, Result, Ticket, TicketProcessedEvent, TicketStatus,
};
use std::time::Duration;
use tokio::sync::watch;

#[derive(Clone)]
pub struct ProcessingPipeline {
    state: AppState,
    tickets: TicketService,
    stores: StoreService,
    history: HistoryService,
    engine: GamificationEngine,
    detector: DuplicateDetector,
}

impl ProcessingPipeline {
    pub fn new(state: &AppState) -> Self {
        Self {
            tickets: TicketService::new(state.db_pool.clone(), state.config.uploads.clone()),
            stores: StoreService::new(state.db_pool.clone()),
            history: HistoryService::new(state.db_pool.clone()),
            engine: GamificationEngine::new(state.db_pool.clone()),
            detector: DuplicateDetector::new(state.config.worker.duplicate_detection_enabled),
            state: state.clone(),
        }
    }

    pub fn tickets(&self) -> &TicketService {
        &self.tickets
    }

    /// Run one pending ticket to a terminal status and fan out its effects.
    pub async fn process_ticket(&self, ticket: &Ticket) -> Result<ProcessingResult> {
        let lock = self.state.user_lock(ticket.user_id);
        let _guard = lock.lock().await;

        if ticket.status != TicketStatus::PENDING {
            return Err(AppError::conflict(format!(
                "Ticket {} is not pending",
                ticket.id
            )));
        }

        // Vision call; transport or parse failures park the ticket as
        // failed without touching history or gamification.
        let extracted = match self.extract(ticket).await {
            Ok(extracted) => extracted,
            Err(e) => {
                let result = failed_result(&e.to_string());
                self.tickets
                    .set_terminal_status(
                        ticket.id,
                        TicketStatus::FAILED,
                        &serde_json::to_value(&result)?,
                    )
                    .await?;
                tracing::warn!(ticket_id = %ticket.id, error = %e, "Ticket processing failed");
                return Ok(result);
            }
        };

        let store_name = extracted.tienda.clone();
        let es_tienda_mercado = match &store_name {
            Some(name) => self.stores.is_market_store(name).await?,
            None => false,
        };

        let is_duplicate = if vision::has_structural_fields(&extracted) {
            let priors = self
                .tickets
                .prior_terminal_results(ticket.user_id, ticket.id)
                .await?;
            self.detector.is_duplicate(
                extracted.fecha.as_deref(),
                extracted.hora.as_deref(),
                &extracted.productos,
                &priors,
            )
        } else {
            false
        };

        let (status, status_message) = if is_duplicate {
            (TicketStatus::DUPLICATE, "Ticket duplicado detectado")
        } else if es_tienda_mercado {
            (
                TicketStatus::DONE_APPROVED,
                "Ticket aprobado - Tienda del mercado",
            )
        } else {
            (
                TicketStatus::DONE_REJECTED,
                "Ticket rechazado - No es tienda del mercado",
            )
        };

        let result = ProcessingResult {
            fecha: extracted.fecha.clone(),
            hora: extracted.hora.clone(),
            tienda: store_name.clone(),
            total: extracted.total.clone(),
            tipo_ticket: extracted.tipo_ticket.clone(),
            productos: extracted.productos.clone(),
            num_productos: extracted.productos.len(),
            procesado_correctamente: true,
            es_tienda_mercado,
            ticket_status: status.to_string(),
            status_message: status_message.to_string(),
            duplicate_detected: is_duplicate.then_some(true),
            error: None,
        };

        self.tickets
            .set_terminal_status(ticket.id, status, &serde_json::to_value(&result)?)
            .await?;

        // Duplicates leave history and gamification untouched.
        if !is_duplicate {
            self.fan_out(ticket, &extracted, es_tienda_mercado).await;
        }

        tracing::info!(
            ticket_id = %ticket.id,
            user_id = %ticket.user_id,
            status = status,
            store = store_name.as_deref().unwrap_or("?"),
            "Ticket processed"
        );

        Ok(result)
    }

    async fn extract(&self, ticket: &Ticket) -> Result<ExtractedTicket> {
        let image = self.tickets.read_image(ticket).await?;
        let text = self
            .state
            .vision
            .extract_ticket_text(&image, &ticket.mime_type)
            .await?;
        vision::parse_model_response(&text)
    }

    /// Purchase-history and gamification effects of a resolved ticket.
    /// History conflicts (re-processing) are logged and swallowed.
    async fn fan_out(&self, ticket: &Ticket, extracted: &ExtractedTicket, is_valid: bool) {
        let purchase_date = extracted
            .fecha
            .as_deref()
            .and_then(|f| parse_ticket_datetime(f, extracted.hora.as_deref()))
            .map(|naive| Utc.from_utc_datetime(&naive))
            .unwrap_or_else(Utc::now);

        if let Some(store_name) = &extracted.tienda {
            let request = CreatePurchaseRequest {
                user_id: ticket.user_id,
                ticket_id: ticket.id,
                purchase_date,
                store_name: store_name.clone(),
                total_amount: extracted.total_amount().unwrap_or(0.0),
                products: serde_json::to_value(&extracted.productos).unwrap_or(Value::Null),
                num_products: extracted.productos.len() as i32,
                ticket_type: extracted.tipo_ticket.clone(),
                is_market_store: is_valid,
            };

            match self.history.create_purchase_record(request).await {
                Ok(_) => {}
                Err(e) if e.is_unique_violation() => {
                    tracing::warn!(ticket_id = %ticket.id, "Purchase record already exists, skipping");
                }
                Err(e) => {
                    tracing::error!(ticket_id = %ticket.id, error = %e, "Failed to write purchase record");
                }
            }
        }

        let event = TicketProcessedEvent {
            user_id: ticket.user_id,
            ticket_id: ticket.id,
            is_valid,
            total_amount: extracted.total_amount(),
            store_name: extracted.tienda.clone(),
            processing_date: Utc::now(),
        };

        if let Err(e) = self.engine.process_ticket_event(&event).await {
            tracing::error!(ticket_id = %ticket.id, error = %e, "Gamification update failed");
        }
    }

    /// Digital tickets are already approved; only the fan-out runs.
    pub async fn fan_out_digital(
        &self,
        ticket: &Ticket,
        store_name: &str,
        total_amount: f64,
        products: &Value,
        purchase_date: DateTime<Utc>,
    ) {
        let lock = self.state.user_lock(ticket.user_id);
        let _guard = lock.lock().await;

        let request = CreatePurchaseRequest {
            user_id: ticket.user_id,
            ticket_id: ticket.id,
            purchase_date,
            store_name: store_name.to_string(),
            total_amount,
            products: products.clone(),
            num_products: products.as_array().map(|p| p.len()).unwrap_or(0) as i32,
            ticket_type: Some("digital".to_string()),
            is_market_store: true,
        };

        match self.history.create_purchase_record(request).await {
            Ok(_) => {}
            Err(e) if e.is_unique_violation() => {
                tracing::warn!(ticket_id = %ticket.id, "Purchase record already exists, skipping");
            }
            Err(e) => {
                tracing::error!(ticket_id = %ticket.id, error = %e, "Failed to write purchase record");
            }
        }

        let event = TicketProcessedEvent {
            user_id: ticket.user_id,
            ticket_id: ticket.id,
            is_valid: true,
            total_amount: Some(total_amount),
            store_name: Some(store_name.to_string()),
            processing_date: Utc::now(),
        };

        if let Err(e) = self.engine.process_ticket_event(&event).await {
            tracing::error!(ticket_id = %ticket.id, error = %e, "Gamification update failed");
        }
    }

    /// Drain the current pending batch once; used by the worker tick and
    /// the synchronous process-pending endpoint. `should_stop` is checked
    /// between tickets so a shutdown only waits for the in-flight one.
    pub async fn process_pending_batch(
        &self,
        per_ticket_delay: Duration,
        should_stop: impl Fn() -> bool,
    ) -> Result<Value> {
        let pending = self
            .tickets
            .pending(self.state.config.worker.batch_size)
            .await?;

        if pending.is_empty() {
            return Ok(json!({"message": "No pending tickets"}));
        }

        let total = pending.len();
        let mut processed = 0usize;
        let mut failed = 0usize;

        for ticket in pending {
            if should_stop() {
                break;
            }

            match self.process_ticket(&ticket).await {
                Ok(result) if result.ticket_status == TicketStatus::FAILED => failed += 1,
                Ok(_) => processed += 1,
                Err(e) => {
                    failed += 1;
                    tracing::error!(ticket_id = %ticket.id, error = %e, "Error processing ticket");
                }
            }

            // Spacing between tickets keeps the vision endpoint happy.
            if !per_ticket_delay.is_zero() && !should_stop() {
                tokio::time::sleep(per_ticket_delay).await;
            }
        }

        tracing::info!(total, processed, failed, "Pending batch processed");

        Ok(json!({
            "total_tickets": total,
            "processed_count": processed,
            "failed_count": failed,
        }))
    }
}

fn failed_result(error: &str) -> ProcessingResult {
    ProcessingResult {
        fecha: None,
        hora: None,
        tienda: None,
        total: Value::Null,
        tipo_ticket: None,
        productos: vec![],
        num_productos: 0,
        procesado_correctamente: false,
        es_tienda_mercado: false,
        ticket_status: TicketStatus::FAILED.to_string(),
        status_message: format!("Error en el procesamiento: {}", error),
        duplicate_detected: None,
        error: Some(error.to_string()),
    }
}

/// Long-lived background task polling for pending tickets.
pub struct IngestionWorker {
    pipeline: ProcessingPipeline,
    config: WorkerConfig,
    shutdown: watch::Receiver<bool>,
}

impl IngestionWorker {
    pub fn new(state: &AppState, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            pipeline: ProcessingPipeline::new(state),
            config: state.config.worker.clone(),
            shutdown,
        }
    }

    /// Poll loop. Shutdown lets the in-flight batch item finish, then
    /// exits before the next sleep.
    pub async fn run(mut self) {
        tracing::info!(
            poll_interval = self.config.poll_interval_seconds,
            batch_size = self.config.batch_size,
            "Ingestion worker started"
        );

        let per_ticket_delay = Duration::from_millis(self.config.per_ticket_delay_ms);

        loop {
            if *self.shutdown.borrow() {
                break;
            }

            let shutdown = self.shutdown.clone();
            if let Err(e) = self
                .pipeline
                .process_pending_batch(per_ticket_delay, move || *shutdown.borrow())
                .await
            {
                tracing::error!(error = %e, "Ingestion tick failed");
            }

            let sleep = tokio::time::sleep(Duration::from_secs(self.config.poll_interval_seconds));
            tokio::pin!(sleep);

            tokio::select! {
                _ = &mut sleep => {}
                _ = self.shutdown.changed() => {
                    if *self.shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Ingestion worker stopped");
    }
}
