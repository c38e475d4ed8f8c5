use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A monitored service grouping one or more endpoints.
/// Owned by the configuration store; the engine only reads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Host {
    pub id: i32,
    pub name: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Default probe interval for endpoints without an override.
    #[serde(default)]
    pub interval_seconds: Option<i64>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub notification: NotificationSettings,
}

impl Host {
    /// Whether outcomes for this host can ever lead to a webhook.
    pub fn notifications_active(&self) -> bool {
        self.notification.enabled && !self.notification.channel_ids.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default)]
    pub cooldown_minutes: u32,
    /// Ordered; dispatch follows this order.
    #[serde(default)]
    pub channel_ids: Vec<i32>,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            failure_threshold: default_failure_threshold(),
            cooldown_minutes: 0,
            channel_ids: Vec::new(),
        }
    }
}

/// One probed URL or script under a host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Endpoint {
    pub id: i32,
    pub host_id: i32,
    pub name: String,
    pub probe: ProbeMode,
    /// Overrides the host's interval when set.
    #[serde(default)]
    pub interval_seconds: Option<i64>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Endpoint {
    /// Endpoint override first, then the host default.
    pub fn effective_interval(&self, host: &Host) -> Option<i64> {
        self.interval_seconds.or(host.interval_seconds)
    }

    /// The configured URL, or an empty string for script endpoints.
    pub fn configured_url(&self) -> &str {
        match &self.probe {
            ProbeMode::Config(config) => &config.url,
            ProbeMode::Code { .. } => "",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum ProbeMode {
    Config(HttpProbeConfig),
    /// Executed by the external sandbox; `script` is an opaque reference.
    Code { script: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpProbeConfig {
    /// Absolute URL, a path relative to the host base URL, or empty for the base URL itself.
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub body_encoding: BodyEncoding,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl Default for HttpProbeConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            method: default_method(),
            headers: HashMap::new(),
            body: None,
            body_encoding: BodyEncoding::default(),
            timeout_ms: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BodyEncoding {
    #[default]
    Json,
    FormUrlencoded,
    Xml,
}

impl BodyEncoding {
    pub fn content_type(self) -> &'static str {
        match self {
            BodyEncoding::Json => "application/json",
            BodyEncoding::FormUrlencoded => "application/x-www-form-urlencoded",
            BodyEncoding::Xml => "application/xml",
        }
    }
}

/// Result of a single probe. Not retained by the engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProbeOutcome {
    pub endpoint_id: i32,
    pub success: bool,
    pub status_code: Option<u16>,
    pub response_time_ms: i64,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

fn default_true() -> bool {
    true
}

fn default_failure_threshold() -> u32 {
    1
}

fn default_method() -> String {
    "GET".to_string()
}
