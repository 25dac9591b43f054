//! Web Push delivery with VAPID authorization
//!
//! The payload is posted straight to the subscription endpoint with a
//! VAPID-signed JWT (ES256) in the Authorization header. 410 responses
//! mean the subscription is gone and must be deactivated; 429 is a
//! transient rate limit.

use super::{AdapterResult, ChannelAdapter};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::Serialize;
use serde_json::{json, Value};
use shared::config::VapidConfig;

const PUSH_TTL_SECONDS: u32 = 86400;
const VAPID_TOKEN_VALIDITY_HOURS: i64 = 12;

#[derive(Debug, Serialize)]
struct VapidClaims {
    aud: String,
    exp: i64,
    sub: String,
}

pub struct WebPushAdapter {
    client: Client,
    public_key: String,
    contact_email: String,
    signing_key: Option<EncodingKey>,
}

impl WebPushAdapter {
    pub fn new(config: &VapidConfig) -> Self {
        let signing_key = if config.private_key_pem.is_empty() {
            tracing::warn!("VAPID keys not configured, WebPush will not work");
            None
        } else {
            match EncodingKey::from_ec_pem(config.private_key_pem.as_bytes()) {
                Ok(key) => Some(key),
                Err(e) => {
                    tracing::error!(error = %e, "Invalid VAPID private key");
                    None
                }
            }
        };

        Self {
            client: Client::new(),
            public_key: config.public_key.clone(),
            contact_email: config.contact_email.clone(),
            signing_key,
        }
    }

    /// Required subscription shape: `{endpoint, keys: {p256dh, auth}}`.
    pub fn validate_subscription(subscription_data: &Value) -> bool {
        let has_endpoint = subscription_data
            .get("endpoint")
            .and_then(|e| e.as_str())
            .map(|e| !e.is_empty())
            .unwrap_or(false);

        let keys = subscription_data.get("keys");
        let has_keys = keys
            .map(|k| k.get("p256dh").is_some() && k.get("auth").is_some())
            .unwrap_or(false);

        has_endpoint && has_keys
    }

    /// Audience for the VAPID token: scheme + authority of the endpoint.
    pub fn endpoint_origin(endpoint: &str) -> Option<String> {
        let scheme_end = endpoint.find("://")?;
        let rest = &endpoint[scheme_end + 3..];
        let authority_end = rest.find('/').unwrap_or(rest.len());
        Some(format!(
            "{}://{}",
            &endpoint[..scheme_end],
            &rest[..authority_end]
        ))
    }

    fn vapid_authorization(&self, endpoint: &str) -> Result<String, String> {
        let key = self
            .signing_key
            .as_ref()
            .ok_or_else(|| "VAPID keys not configured".to_string())?;

        let aud = Self::endpoint_origin(endpoint)
            .ok_or_else(|| format!("Malformed subscription endpoint: {}", endpoint))?;

        let claims = VapidClaims {
            aud,
            exp: (Utc::now() + Duration::hours(VAPID_TOKEN_VALIDITY_HOURS)).timestamp(),
            sub: format!("mailto:{}", self.contact_email),
        };

        let token = encode(&Header::new(Algorithm::ES256), &claims, key)
            .map_err(|e| format!("VAPID token signing failed: {}", e))?;

        Ok(format!("vapid t={}, k={}", token, self.public_key))
    }
}

#[async_trait]
impl ChannelAdapter for WebPushAdapter {
    async fn send_notification(
        &self,
        subscription_data: &Value,
        title: &str,
        message: &str,
        data: &Value,
    ) -> AdapterResult {
        if !Self::validate_subscription(subscription_data) {
            return AdapterResult::failed("Invalid subscription data");
        }

        let endpoint = subscription_data
            .get("endpoint")
            .and_then(|e| e.as_str())
            .unwrap_or_default();

        let authorization = match self.vapid_authorization(endpoint) {
            Ok(authorization) => authorization,
            Err(e) => return AdapterResult::failed(e),
        };

        let payload = json!({
            "title": title,
            "body": message,
            "icon": "/icon-192x192.png",
            "badge": "/badge-72x72.png",
            "data": data,
        });

        let response = self
            .client
            .post(endpoint)
            .header("Authorization", authorization)
            .header("TTL", PUSH_TTL_SECONDS)
            .header("Urgency", "normal")
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(e) => return AdapterResult::failed(format!("WebPush transport error: {}", e)),
        };

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();

        if (200..300).contains(&status) {
            tracing::info!(status, title, "WebPush notification sent");
        }

        classify_push_response(status, &body)
    }
}

/// Map a push-service response onto the delivery outcome: 410 means the
/// subscription is dead, 429 is a retryable rate limit.
pub fn classify_push_response(status: u16, body: &str) -> AdapterResult {
    match status {
        200..=299 => AdapterResult::ok(json!({
            "status_code": status,
            "response": body,
            "channel": "webpush",
        })),
        410 => AdapterResult {
            success: false,
            error: Some("Subscription expired or invalid".to_string()),
            should_remove_subscription: true,
            ..Default::default()
        },
        429 => AdapterResult {
            success: false,
            error: Some("Rate limit exceeded".to_string()),
            should_retry: true,
            ..Default::default()
        },
        _ => AdapterResult::failed(format!("WebPush error: {} - {}", status, body)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscription_validation() {
        let good = json!({
            "endpoint": "https://push.example.org/v1/abc",
            "keys": {"p256dh": "BP...", "auth": "xy"}
        });
        assert!(WebPushAdapter::validate_subscription(&good));

        let missing_keys = json!({"endpoint": "https://push.example.org/v1/abc"});
        assert!(!WebPushAdapter::validate_subscription(&missing_keys));

        let missing_auth = json!({
            "endpoint": "https://push.example.org/v1/abc",
            "keys": {"p256dh": "BP..."}
        });
        assert!(!WebPushAdapter::validate_subscription(&missing_auth));

        let empty_endpoint = json!({"endpoint": "", "keys": {"p256dh": "a", "auth": "b"}});
        assert!(!WebPushAdapter::validate_subscription(&empty_endpoint));
    }

    #[test]
    fn origin_extraction() {
        assert_eq!(
            WebPushAdapter::endpoint_origin("https://fcm.googleapis.com/fcm/send/abc:123").as_deref(),
            Some("https://fcm.googleapis.com")
        );
        assert_eq!(
            WebPushAdapter::endpoint_origin("https://push.example.org").as_deref(),
            Some("https://push.example.org")
        );
        assert_eq!(WebPushAdapter::endpoint_origin("not-a-url"), None);
    }

    #[test]
    fn gone_subscriptions_are_flagged_for_removal() {
        let result = classify_push_response(410, "");
        assert!(!result.success);
        assert!(result.should_remove_subscription);
        assert!(!result.should_retry);
    }

    #[test]
    fn rate_limits_ask_for_retry() {
        let result = classify_push_response(429, "slow down");
        assert!(!result.success);
        assert!(result.should_retry);
        assert!(!result.should_remove_subscription);
    }

    #[test]
    fn success_carries_delivery_info() {
        let result = classify_push_response(201, "created");
        assert!(result.success);
        let info = result.delivery_info.unwrap();
        assert_eq!(info["status_code"], 201);
        assert_eq!(info["channel"], "webpush");
    }

    #[test]
    fn other_statuses_fail_with_error_text() {
        let result = classify_push_response(400, "bad payload");
        assert!(!result.success);
        assert!(result.error.unwrap().contains("400"));
        assert!(!result.should_remove_subscription);
        assert!(!result.should_retry);
    }
}
