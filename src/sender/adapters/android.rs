//! Android channel stub. Reports success without delivering until the FCM
//! integration lands.

use super::{AdapterResult, ChannelAdapter};
use async_trait::async_trait;
use serde_json::{json, Value};

pub struct AndroidAdapter;

#[async_trait]
impl ChannelAdapter for AndroidAdapter {
    async fn send_notification(
        &self,
        _subscription_data: &Value,
        title: &str,
        _message: &str,
        _data: &Value,
    ) -> AdapterResult {
        tracing::info!(title, "Android adapter stub: notification accepted");

        AdapterResult::ok(json!({
            "channel": "android",
            "stub": true,
        }))
    }
}
