//! Wire types shared between the backend, the worker and the sender

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

/// Notification delivery channels
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ChannelType {
    #[serde(rename = "webpush")]
    Webpush,
    #[serde(rename = "android")]
    Android,
    #[serde(rename = "ios")]
    Ios,
}

impl std::fmt::Display for ChannelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelType::Webpush => write!(f, "webpush"),
            ChannelType::Android => write!(f, "android"),
            ChannelType::Ios => write!(f, "ios"),
        }
    }
}

impl std::str::FromStr for ChannelType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "webpush" => Ok(ChannelType::Webpush),
            "android" => Ok(ChannelType::Android),
            "ios" => Ok(ChannelType::Ios),
            other => Err(format!("unknown channel: {}", other)),
        }
    }
}

/// One product line as extracted by the vision model.
///
/// The model is asked for plain numbers but routinely returns strings, so
/// the raw values stay untyped until normalization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractedProduct {
    #[serde(default)]
    pub cantidad: Value,
    #[serde(default)]
    pub nombre: Value,
    #[serde(default)]
    pub precio: Value,
}

/// Structured extraction of a receipt image
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractedTicket {
    #[serde(default)]
    pub fecha: Option<String>,
    #[serde(default)]
    pub hora: Option<String>,
    #[serde(default)]
    pub tienda: Option<String>,
    #[serde(default)]
    pub total: Value,
    #[serde(default)]
    pub tipo_ticket: Option<String>,
    #[serde(default)]
    pub productos: Vec<ExtractedProduct>,
}

impl ExtractedTicket {
    /// Total as a non-negative amount; unparsable totals coerce to None.
    pub fn total_amount(&self) -> Option<f64> {
        scalar_to_f64(&self.total).filter(|v| *v >= 0.0)
    }
}

/// Render an untyped scalar the way the wire format prints it.
pub fn scalar_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

pub fn scalar_to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().replace(',', ".").parse::<f64>().ok(),
        _ => None,
    }
}

/// The `processing_result` JSON persisted on a ticket after the worker ran
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingResult {
    pub fecha: Option<String>,
    pub hora: Option<String>,
    pub tienda: Option<String>,
    pub total: Value,
    pub tipo_ticket: Option<String>,
    pub productos: Vec<ExtractedProduct>,
    pub num_productos: usize,
    pub procesado_correctamente: bool,
    pub es_tienda_mercado: bool,
    pub ticket_status: String,
    pub status_message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duplicate_detected: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Event emitted towards the gamification engine after a ticket resolves
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketProcessedEvent {
    pub user_id: Uuid,
    pub ticket_id: Uuid,
    pub is_valid: bool,
    pub total_amount: Option<f64>,
    pub store_name: Option<String>,
    pub processing_date: DateTime<Utc>,
}

/// Request accepted by the sender's /send endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationSendRequest {
    pub user_id: Uuid,
    pub message: String,
    pub title: String,
    pub channel: ChannelType,
    #[serde(default)]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSendRequest {
    pub requests: Vec<NotificationSendRequest>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSendResult {
    pub results: Vec<Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelCounts {
    pub total: i64,
    pub queued: i64,
    pub sent: i64,
    pub failed: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SenderStats {
    pub total_notifications: i64,
    pub queued_notifications: i64,
    pub sent_notifications: i64,
    pub failed_notifications: i64,
    pub channel_stats: HashMap<String, ChannelCounts>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub service: String,
    pub timestamp: DateTime<Utc>,
}

impl HealthStatus {
    pub fn healthy(service: &str) -> Self {
        Self {
            status: "healthy".to_string(),
            service: service.to_string(),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scalar_coercions() {
        assert_eq!(scalar_to_text(&json!("  pan ")), "pan");
        assert_eq!(scalar_to_text(&json!(2)), "2");
        assert_eq!(scalar_to_text(&Value::Null), "");

        assert_eq!(scalar_to_f64(&json!("50.00")), Some(50.0));
        assert_eq!(scalar_to_f64(&json!("12,30")), Some(12.3));
        assert_eq!(scalar_to_f64(&json!(7)), Some(7.0));
        assert_eq!(scalar_to_f64(&json!("n/a")), None);
    }

    #[test]
    fn negative_totals_are_dropped() {
        let ticket = ExtractedTicket {
            total: json!("-3.50"),
            ..Default::default()
        };
        assert_eq!(ticket.total_amount(), None);
    }

    #[test]
    fn processing_result_omits_empty_optionals() {
        let result = ProcessingResult {
            fecha: None,
            hora: None,
            tienda: Some("Mercadona".to_string()),
            total: json!("20.00"),
            tipo_ticket: None,
            productos: vec![],
            num_productos: 0,
            procesado_correctamente: true,
            es_tienda_mercado: true,
            ticket_status: "done_approved".to_string(),
            status_message: "ok".to_string(),
            duplicate_detected: None,
            error: None,
        };

        let value = serde_json::to_value(&result).unwrap();
        assert!(value.get("duplicate_detected").is_none());
        assert!(value.get("error").is_none());
        assert_eq!(value["ticket_status"], "done_approved");
    }
}
