use async_trait::async_trait;
use thiserror::Error;

use super::models::NotificationChannel;

pub mod webhook;

#[derive(Error, Debug)]
pub enum SenderError {
    #[error("Failed to send notification: {0}")]
    SendFailed(String),
    #[error("Invalid configuration for sender: {0}")]
    InvalidConfiguration(String),
    #[error("Rendered body is not valid JSON: {0}")]
    InvalidPayload(#[from] serde_json::Error),
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),
}

/// Delivers an already rendered body to one channel.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    /// # Arguments
    ///
    /// * `channel` - The target channel; its URL and custom headers are used as-is.
    /// * `rendered_body` - The channel's body template after placeholder substitution.
    async fn send(&self, channel: &NotificationChannel, rendered_body: &str) -> Result<(), SenderError>;
}
