//! iOS channel stub. Reports success without delivering until the APNs
//! integration lands.

use super::{AdapterResult, ChannelAdapter};
use async_trait::async_trait;
use serde_json::{json, Value};

pub struct IosAdapter;

#[async_trait]
impl ChannelAdapter for IosAdapter {
    async fn send_notification(
        &self,
        _subscription_data: &Value,
        title: &str,
        _message: &str,
        _data: &Value,
    ) -> AdapterResult {
        tracing::info!(title, "iOS adapter stub: notification accepted");

        AdapterResult::ok(json!({
            "channel": "ios",
            "stub": true,
        }))
    }
}
