//! HTTP clients for the external model endpoints and the sender service

use crate::{config::ServicesConfig, error::AppError, types::*, Result};
use base64::{engine::general_purpose, Engine as _};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ServiceClient {
    client: Client,
    base_url: String,
    service_name: String,
}

impl ServiceClient {
    pub fn new(base_url: String, service_name: String, timeout_seconds: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            service_name,
        })
    }

    /// Make a GET request
    pub async fn get<T>(&self, endpoint: &str) -> Result<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        let url = format!("{}{}", self.base_url, endpoint);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.map_reqwest_error(e))?;

        self.handle_response(response).await
    }

    /// Make a POST request
    pub async fn post<T, R>(&self, endpoint: &str, body: &T) -> Result<R>
    where
        T: Serialize,
        R: for<'de> Deserialize<'de>,
    {
        let url = format!("{}{}", self.base_url, endpoint);

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| self.map_reqwest_error(e))?;

        self.handle_response(response).await
    }

    pub async fn health_check(&self) -> Result<HealthStatus> {
        self.get("/health").await
    }

    async fn handle_response<T>(&self, response: Response) -> Result<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        let status = response.status();

        if status.is_success() {
            response.json::<T>().await.map_err(|e| {
                AppError::external_service(
                    &self.service_name,
                    format!("Failed to deserialize response: {}", e),
                )
            })
        } else {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());

            Err(AppError::external_service(
                &self.service_name,
                format!("HTTP {} - {}", status, error_text),
            ))
        }
    }

    fn map_reqwest_error(&self, error: reqwest::Error) -> AppError {
        if error.is_timeout() {
            AppError::timeout(format!("Request to {} timed out", self.service_name))
        } else if error.is_connect() {
            AppError::service_unavailable(&self.service_name)
        } else {
            AppError::external_service(&self.service_name, error.to_string())
        }
    }
}

/// Fixed extraction prompt sent alongside every receipt image
pub const TICKET_EXTRACTION_PROMPT: &str = r#"Analiza esta imagen de un ticket de compra y extrae la siguiente información en formato JSON:

{
    "fecha": "fecha del ticket (formato DD/MM/YYYY)",
    "hora": "hora del ticket (formato HH:MM)",
    "tienda": "nombre de la tienda o establecimiento",
    "total": "importe total del ticket (solo el número)",
    "tipo_ticket": "tipo de ticket (supermercado, restaurante, gasolinera, farmacia, otros)",
    "productos": [
        {
            "cantidad": "cantidad del producto",
            "nombre": "nombre del producto",
            "precio": "precio del producto (solo el número)"
        }
    ]
}

Reglas importantes:
- Si no encuentras algún campo, ponlo como null
- Para productos, extrae solo los que sean claramente productos (no totales, impuestos, etc.)
- Los precios deben ser solo números (sin símbolos de moneda)
- Responde SOLO con el JSON, sin texto adicional"#;

/// Client for the external vision model (image bytes -> structured text)
#[derive(Debug, Clone)]
pub struct VisionClient {
    client: Client,
    url: String,
    api_key: String,
}

impl VisionClient {
    pub fn new(config: &ServicesConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.vision_timeout_seconds))
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to create vision client: {}", e)))?;

        Ok(Self {
            client,
            url: config.vision_api_url.clone(),
            api_key: config.vision_api_key.clone(),
        })
    }

    /// Send the image with the fixed extraction prompt and return the raw
    /// model text. Transport and shape failures surface as `ExternalService`
    /// errors; the caller decides how to record them.
    pub async fn extract_ticket_text(&self, image_data: &[u8], mime_type: &str) -> Result<String> {
        let image_base64 = general_purpose::STANDARD.encode(image_data);

        let payload = json!({
            "contents": [
                {
                    "parts": [
                        { "text": TICKET_EXTRACTION_PROMPT },
                        {
                            "inline_data": {
                                "mime_type": mime_type,
                                "data": image_base64
                            }
                        }
                    ]
                }
            ]
        });

        let response = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .header("X-goog-api-key", &self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::timeout("vision model request")
                } else {
                    AppError::external_service("vision", e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::external_service(
                "vision",
                format!("HTTP {} - {}", status, body),
            ));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| AppError::external_service("vision", e.to_string()))?;

        Self::candidate_text(&body)
            .ok_or_else(|| AppError::external_service("vision", "Unexpected response shape"))
    }

    /// Pull `candidates[0].content.parts[0].text` out of the response body.
    pub fn candidate_text(body: &Value) -> Option<String> {
        body.get("candidates")?
            .get(0)?
            .get("content")?
            .get("parts")?
            .get(0)?
            .get("text")?
            .as_str()
            .map(|s| s.to_string())
    }
}

/// Client for the generative text endpoint (prompt + system -> text)
#[derive(Debug, Clone)]
pub struct TextGenClient {
    client: Client,
    base_url: String,
    model: String,
}

impl TextGenClient {
    pub fn new(config: &ServicesConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.llm_timeout_seconds))
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to create LLM client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.llm_url.clone(),
            model: config.llm_model.clone(),
        })
    }

    /// Simple text generation. Every call site provides its own
    /// deterministic fallback; this method only reports errors.
    pub async fn generate(
        &self,
        prompt: &str,
        system: Option<&str>,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String> {
        let full_prompt = match system {
            Some(system) => format!("<SYSTEM>\n{}\n</SYSTEM>\n\n{}", system, prompt),
            None => prompt.to_string(),
        };

        let payload = json!({
            "model": self.model,
            "prompt": full_prompt,
            "options": {
                "temperature": temperature,
                "num_predict": max_tokens,
            },
            "stream": false,
        });

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::timeout("text generation request")
                } else {
                    AppError::external_service("llm", e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::external_service(
                "llm",
                format!("HTTP {} - {}", status, body),
            ));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| AppError::external_service("llm", e.to_string()))?;

        Ok(body
            .get("response")
            .and_then(|r| r.as_str())
            .unwrap_or_default()
            .to_string())
    }
}

/// Client used by the campaign dispatcher to reach the sender service
#[derive(Debug, Clone)]
pub struct SenderClient {
    client: ServiceClient,
}

impl SenderClient {
    pub fn new(config: &ServicesConfig) -> Result<Self> {
        let client = ServiceClient::new(
            config.sender_url.clone(),
            "notification-sender".to_string(),
            config.sender_timeout_seconds,
        )?;
        Ok(Self { client })
    }

    pub async fn send(&self, request: &NotificationSendRequest) -> Result<Value> {
        self.client.post("/send", request).await
    }

    pub async fn send_batch(&self, requests: Vec<NotificationSendRequest>) -> Result<BatchSendResult> {
        self.client
            .post("/send-batch", &BatchSendRequest { requests })
            .await
    }

    pub async fn health(&self) -> Result<HealthStatus> {
        self.client.health_check().await
    }
}
