//! Channel adapters. Webpush is the concrete implementation; the mobile
//! channels are stubs until the native apps ship.

pub mod android;
pub mod ios;
pub mod webpush;

use async_trait::async_trait;
use serde_json::Value;

pub use android::AndroidAdapter;
pub use ios::IosAdapter;
pub use webpush::WebPushAdapter;

/// Outcome of one delivery attempt. `should_remove_subscription` asks the
/// caller to deactivate a dead subscription (HTTP 410); `should_retry`
/// flags transient rate limiting (HTTP 429).
#[derive(Debug, Clone, Default)]
pub struct AdapterResult {
    pub success: bool,
    pub delivery_info: Option<Value>,
    pub error: Option<String>,
    pub should_remove_subscription: bool,
    pub should_retry: bool,
}

impl AdapterResult {
    pub fn ok(delivery_info: Value) -> Self {
        Self {
            success: true,
            delivery_info: Some(delivery_info),
            ..Default::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }
}

#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    async fn send_notification(
        &self,
        subscription_data: &Value,
        title: &str,
        message: &str,
        data: &Value,
    ) -> AdapterResult;
}
