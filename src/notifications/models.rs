use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// An outbound webhook target with its own body template and headers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationChannel {
    pub id: i32,
    pub name: String,
    pub webhook_url: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// JSON body with `{{ path.to.value }}` placeholders.
    pub body_template: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    Failure,
    Recovery,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Failure => "FAILURE",
            EventType::Recovery => "RECOVERY",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One dispatch attempt to one channel, handed to the delivery log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationEvent {
    pub channel_id: i32,
    pub channel_name: String,
    pub host_id: i32,
    pub endpoint_id: i32,
    pub event_type: EventType,
    pub rendered_body: String,
    pub delivery_success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}
