use async_trait::async_trait;
use reqwest::{header, Client};
use serde_json::Value;
use std::time::Duration;

use super::{NotificationSender, SenderError};
use crate::monitoring::executor::to_header_map;
use crate::notifications::models::NotificationChannel;

pub const DEFAULT_WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// POSTs JSON payloads to a channel's webhook URL.
pub struct WebhookSender {
    client: Client,
    timeout: Duration,
}

impl Default for WebhookSender {
    fn default() -> Self {
        Self::new(DEFAULT_WEBHOOK_TIMEOUT)
    }
}

impl WebhookSender {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            timeout,
        }
    }
}

#[async_trait]
impl NotificationSender for WebhookSender {
    async fn send(&self, channel: &NotificationChannel, rendered_body: &str) -> Result<(), SenderError> {
        let payload: Value = serde_json::from_str(rendered_body)?;

        // Custom headers go in first so the JSON content type always wins.
        let mut headers = to_header_map(&channel.headers).map_err(SenderError::InvalidConfiguration)?;
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        let response = self
            .client
            .post(&channel.webhook_url)
            .headers(headers)
            .timeout(self.timeout)
            .body(payload.to_string())
            .send()
            .await?;
        let status = response.status();

        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            return Err(SenderError::SendFailed(format!(
                "Webhook returned non-success status: {status}. Body: {error_body}"
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn channel(url: &str) -> NotificationChannel {
        NotificationChannel {
            id: 1,
            name: "ops".to_string(),
            webhook_url: url.to_string(),
            headers: HashMap::new(),
            body_template: String::new(),
            enabled: true,
        }
    }

    #[tokio::test]
    async fn test_malformed_body_fails_before_sending() {
        let sender = WebhookSender::default();
        let err = sender
            .send(&channel("http://127.0.0.1:9/hook"), "{\"text\": oops}")
            .await
            .unwrap_err();
        assert!(matches!(err, SenderError::InvalidPayload(_)));
    }

    #[tokio::test]
    async fn test_invalid_header_is_configuration_error() {
        let sender = WebhookSender::default();
        let mut ch = channel("http://127.0.0.1:9/hook");
        ch.headers.insert("bad header".to_string(), "x".to_string());
        let err = sender.send(&ch, "{}").await.unwrap_err();
        assert!(matches!(err, SenderError::InvalidConfiguration(_)));
    }
}
