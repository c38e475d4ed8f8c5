//! Executes a single probe for an endpoint and normalizes the result.
//!
//! `execute` never fails: configuration problems and transport errors are reported as an
//! outcome with `success = false`.
use chrono::Utc;
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE},
    Client, Method, RequestBuilder,
};
use serde_json::Value;
use std::collections::HashMap;
use std::error::Error as _;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

use super::script::{ScriptEnv, ScriptExecutor, ScriptOutcome};
use crate::db::models::{BodyEncoding, Endpoint, Host, HttpProbeConfig, ProbeMode, ProbeOutcome};

pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;
pub const NO_RESPONSE_MESSAGE: &str = "No response received";
pub const MISSING_URL_MESSAGE: &str = "No URL configured for endpoint or service";

#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

#[derive(Error, Debug)]
pub enum BodyError {
    #[error("Body is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("Form body must be a JSON object")]
    NotAnObject,
}

/// A probe request body, validated against its declared encoding.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Json(Value),
    Form(Vec<(String, String)>),
    Xml(String),
}

impl RequestBody {
    pub fn parse(encoding: BodyEncoding, raw: &str) -> Result<Self, BodyError> {
        match encoding {
            BodyEncoding::Json => Ok(RequestBody::Json(serde_json::from_str(raw)?)),
            BodyEncoding::FormUrlencoded => match serde_json::from_str::<Value>(raw)? {
                Value::Object(map) => Ok(RequestBody::Form(
                    map.into_iter()
                        .map(|(key, value)| {
                            let value = match value {
                                Value::String(s) => s,
                                Value::Null => String::new(),
                                other => other.to_string(),
                            };
                            (key, value)
                        })
                        .collect(),
                )),
                _ => Err(BodyError::NotAnObject),
            },
            BodyEncoding::Xml => Ok(RequestBody::Xml(raw.to_string())),
        }
    }

    /// Content type is expected to be on the request already.
    fn apply(self, request: RequestBuilder) -> RequestBuilder {
        match self {
            RequestBody::Json(value) => request.json(&value),
            RequestBody::Form(pairs) => request.form(&pairs),
            RequestBody::Xml(text) => request.body(text),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    pub default_timeout_ms: u64,
    pub user_agent: String,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            default_timeout_ms: DEFAULT_TIMEOUT_MS,
            user_agent: format!("uptime-monitor/{}", crate::version::VERSION),
        }
    }
}

pub struct ProbeExecutor {
    client: Client,
    default_timeout: Duration,
    script_executor: Arc<dyn ScriptExecutor>,
}

impl ProbeExecutor {
    pub fn new(
        settings: ExecutorSettings,
        script_executor: Arc<dyn ScriptExecutor>,
    ) -> Result<Self, ExecutorError> {
        let client = Client::builder().user_agent(settings.user_agent).build()?;
        Ok(Self {
            client,
            default_timeout: Duration::from_millis(settings.default_timeout_ms.max(1)),
            script_executor,
        })
    }

    pub async fn execute(&self, endpoint: &Endpoint, host: &Host) -> ProbeOutcome {
        match &endpoint.probe {
            ProbeMode::Config(config) => self.execute_http(endpoint.id, config, host).await,
            ProbeMode::Code { script } => self.execute_script(endpoint, script, host).await,
        }
    }

    async fn execute_http(&self, endpoint_id: i32, config: &HttpProbeConfig, host: &Host) -> ProbeOutcome {
        let Some(url) = resolve_url(&config.url, host.base_url.as_deref()) else {
            return failed(endpoint_id, 0, MISSING_URL_MESSAGE.to_string());
        };

        let method = match Method::from_bytes(config.method.trim().to_uppercase().as_bytes()) {
            Ok(method) => method,
            Err(_) => {
                return failed(endpoint_id, 0, format!("Invalid HTTP method: {}", config.method));
            }
        };

        let mut headers = match to_header_map(&merge_headers(&host.headers, &config.headers)) {
            Ok(headers) => headers,
            Err(message) => return failed(endpoint_id, 0, message),
        };

        let body = config.body.as_deref().filter(|b| !b.trim().is_empty());
        // A configured Content-Type wins over the encoding's default.
        if body.is_some() && !headers.contains_key(CONTENT_TYPE) {
            headers.insert(
                CONTENT_TYPE,
                HeaderValue::from_static(config.body_encoding.content_type()),
            );
        }

        let timeout = config
            .timeout_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
            .unwrap_or(self.default_timeout);

        let mut request = self
            .client
            .request(method, &url)
            .headers(headers)
            .timeout(timeout);

        if let Some(raw) = body {
            request = match RequestBody::parse(config.body_encoding, raw) {
                Ok(body) => body.apply(request),
                Err(e) => {
                    warn!(
                        endpoint_id,
                        encoding = ?config.body_encoding,
                        error = %e,
                        "Probe body does not match its encoding; sending it unmodified."
                    );
                    request.body(raw.to_string())
                }
            };
        }

        debug!(endpoint_id, url = %url, timeout_ms = timeout.as_millis() as u64, "Sending probe request.");
        let started = Instant::now();
        match request.send().await {
            Ok(response) => ProbeOutcome {
                endpoint_id,
                success: true,
                status_code: Some(response.status().as_u16()),
                response_time_ms: started.elapsed().as_millis() as i64,
                message: "Success".to_string(),
                timestamp: Utc::now(),
            },
            Err(e) => {
                let elapsed = started.elapsed().as_millis() as i64;
                let message = if e.is_timeout() {
                    NO_RESPONSE_MESSAGE.to_string()
                } else {
                    describe_transport_error(&e)
                };
                debug!(endpoint_id, error = %message, "Probe request failed.");
                failed(endpoint_id, elapsed, message)
            }
        }
    }

    async fn execute_script(&self, endpoint: &Endpoint, script: &str, host: &Host) -> ProbeOutcome {
        let env = ScriptEnv {
            endpoint_id: endpoint.id,
            endpoint_name: endpoint.name.clone(),
            host_id: host.id,
            host_name: host.name.clone(),
            base_url: host.base_url.clone(),
            headers: host.headers.clone(),
        };
        let raw = self.script_executor.run_script(script, &env).await;
        normalize_script_outcome(endpoint.id, raw)
    }
}

/// Absolute URLs win; an empty URL means the host base; anything else is a path under the base.
pub fn resolve_url(endpoint_url: &str, base_url: Option<&str>) -> Option<String> {
    let endpoint_url = endpoint_url.trim();
    if endpoint_url.starts_with("http://") || endpoint_url.starts_with("https://") {
        return Some(endpoint_url.to_string());
    }

    let base = base_url.map(str::trim).filter(|b| !b.is_empty())?;
    if endpoint_url.is_empty() {
        return Some(base.to_string());
    }

    Some(format!(
        "{}/{}",
        base.trim_end_matches('/'),
        endpoint_url.trim_start_matches('/')
    ))
}

/// Host headers overlaid with endpoint headers; the endpoint wins on collisions.
/// Names compare case-insensitively.
pub fn merge_headers(
    host_headers: &HashMap<String, String>,
    endpoint_headers: &HashMap<String, String>,
) -> HashMap<String, String> {
    let mut merged: HashMap<String, String> = host_headers
        .iter()
        .filter(|(name, _)| !endpoint_headers.keys().any(|k| k.eq_ignore_ascii_case(name)))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    merged.extend(endpoint_headers.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged
}

pub(crate) fn to_header_map(headers: &HashMap<String, String>) -> Result<HeaderMap, String> {
    let mut header_map = HeaderMap::new();
    for (key, value) in headers {
        let name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|e| format!("Invalid header name '{key}': {e}"))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| format!("Invalid value for header '{key}': {e}"))?;
        header_map.insert(name, value);
    }
    Ok(header_map)
}

fn normalize_script_outcome(endpoint_id: i32, raw: ScriptOutcome) -> ProbeOutcome {
    let message = raw.message.unwrap_or_else(|| {
        if raw.success {
            "Success".to_string()
        } else {
            "Script execution failed".to_string()
        }
    });
    ProbeOutcome {
        endpoint_id,
        success: raw.success,
        status_code: raw.status_code,
        response_time_ms: raw.response_time_ms.unwrap_or(0).max(0),
        message,
        timestamp: Utc::now(),
    }
}

fn failed(endpoint_id: i32, response_time_ms: i64, message: String) -> ProbeOutcome {
    ProbeOutcome {
        endpoint_id,
        success: false,
        status_code: None,
        response_time_ms,
        message,
        timestamp: Utc::now(),
    }
}

// reqwest's top-level message hides the cause ("error sending request"), so append the chain.
fn describe_transport_error(e: &reqwest::Error) -> String {
    let mut message = e.to_string();
    let mut source = e.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crate::monitoring::script::UnavailableScriptExecutor;

    fn host(base_url: Option<&str>) -> Host {
        Host {
            id: 1,
            name: "api".to_string(),
            base_url: base_url.map(str::to_string),
            headers: HashMap::new(),
            interval_seconds: Some(30),
            enabled: true,
            notification: Default::default(),
        }
    }

    fn executor(script_executor: Arc<dyn ScriptExecutor>) -> ProbeExecutor {
        ProbeExecutor::new(ExecutorSettings::default(), script_executor).unwrap()
    }

    #[test]
    fn test_resolve_url_variants() {
        let base = Some("https://api.example.com/");
        assert_eq!(
            resolve_url("http://other.example.com/x", base).as_deref(),
            Some("http://other.example.com/x")
        );
        assert_eq!(resolve_url("", base).as_deref(), Some("https://api.example.com/"));
        assert_eq!(
            resolve_url("/health", base).as_deref(),
            Some("https://api.example.com/health")
        );
        assert_eq!(
            resolve_url("health", Some("https://api.example.com")).as_deref(),
            Some("https://api.example.com/health")
        );
        assert_eq!(resolve_url("/health", None), None);
        assert_eq!(resolve_url("", Some("  ")), None);
    }

    #[test]
    fn test_endpoint_headers_override_host_headers() {
        let host_headers = HashMap::from([
            ("X-Env".to_string(), "prod".to_string()),
            ("Authorization".to_string(), "host".to_string()),
        ]);
        let endpoint_headers = HashMap::from([("Authorization".to_string(), "endpoint".to_string())]);
        let merged = merge_headers(&host_headers, &endpoint_headers);
        assert_eq!(merged["Authorization"], "endpoint");
        assert_eq!(merged["X-Env"], "prod");

        let lowercase = HashMap::from([("authorization".to_string(), "lower".to_string())]);
        let merged = merge_headers(&host_headers, &lowercase);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged["authorization"], "lower");
        assert!(!merged.contains_key("Authorization"));
    }

    #[test]
    fn test_body_parsing_per_encoding() {
        assert_eq!(
            RequestBody::parse(BodyEncoding::Json, r#"{"a":1}"#).unwrap(),
            RequestBody::Json(serde_json::json!({"a": 1}))
        );
        assert!(matches!(
            RequestBody::parse(BodyEncoding::Json, "{not json"),
            Err(BodyError::InvalidJson(_))
        ));

        let form = RequestBody::parse(BodyEncoding::FormUrlencoded, r#"{"user":"bob","n":2}"#).unwrap();
        match form {
            RequestBody::Form(mut pairs) => {
                pairs.sort();
                assert_eq!(
                    pairs,
                    vec![
                        ("n".to_string(), "2".to_string()),
                        ("user".to_string(), "bob".to_string())
                    ]
                );
            }
            other => panic!("expected form body, got {other:?}"),
        }
        assert!(matches!(
            RequestBody::parse(BodyEncoding::FormUrlencoded, "[1,2]"),
            Err(BodyError::NotAnObject)
        ));

        assert_eq!(
            RequestBody::parse(BodyEncoding::Xml, "<ping/>").unwrap(),
            RequestBody::Xml("<ping/>".to_string())
        );
    }

    #[tokio::test]
    async fn test_missing_base_url_fails_without_network() {
        let endpoint = Endpoint {
            id: 7,
            host_id: 1,
            name: "relative".to_string(),
            probe: ProbeMode::Config(HttpProbeConfig {
                url: "/health".to_string(),
                ..Default::default()
            }),
            interval_seconds: None,
            enabled: true,
        };
        let outcome = executor(Arc::new(UnavailableScriptExecutor))
            .execute(&endpoint, &host(None))
            .await;
        assert!(!outcome.success);
        assert_eq!(outcome.status_code, None);
        assert_eq!(outcome.response_time_ms, 0);
        assert_eq!(outcome.message, MISSING_URL_MESSAGE);
    }

    #[tokio::test]
    async fn test_invalid_method_is_reported() {
        let endpoint = Endpoint {
            id: 8,
            host_id: 1,
            name: "bad-method".to_string(),
            probe: ProbeMode::Config(HttpProbeConfig {
                url: "http://127.0.0.1:9/".to_string(),
                method: "GE T".to_string(),
                ..Default::default()
            }),
            interval_seconds: None,
            enabled: true,
        };
        let outcome = executor(Arc::new(UnavailableScriptExecutor))
            .execute(&endpoint, &host(None))
            .await;
        assert!(!outcome.success);
        assert!(outcome.message.starts_with("Invalid HTTP method"));
    }

    #[tokio::test]
    async fn test_connection_refused_is_a_failed_outcome() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let endpoint = Endpoint {
            id: 9,
            host_id: 1,
            name: "closed-port".to_string(),
            probe: ProbeMode::Config(HttpProbeConfig {
                url: format!("http://{addr}/"),
                timeout_ms: Some(2_000),
                ..Default::default()
            }),
            interval_seconds: None,
            enabled: true,
        };
        let outcome = executor(Arc::new(UnavailableScriptExecutor))
            .execute(&endpoint, &host(None))
            .await;
        assert!(!outcome.success);
        assert_eq!(outcome.status_code, None);
        assert!(!outcome.message.is_empty());
    }

    struct FixedScript(ScriptOutcome);

    #[async_trait]
    impl ScriptExecutor for FixedScript {
        async fn run_script(&self, script: &str, env: &ScriptEnv) -> ScriptOutcome {
            assert_eq!(script, "checks/login.js");
            assert_eq!(env.host_name, "api");
            self.0.clone()
        }
    }

    #[tokio::test]
    async fn test_code_mode_delegates_and_normalizes() {
        let endpoint = Endpoint {
            id: 11,
            host_id: 1,
            name: "login".to_string(),
            probe: ProbeMode::Code {
                script: "checks/login.js".to_string(),
            },
            interval_seconds: None,
            enabled: true,
        };

        let ok = executor(Arc::new(FixedScript(ScriptOutcome {
            success: true,
            status_code: Some(204),
            ..Default::default()
        })))
        .execute(&endpoint, &host(None))
        .await;
        assert!(ok.success);
        assert_eq!(ok.status_code, Some(204));
        assert_eq!(ok.response_time_ms, 0);
        assert_eq!(ok.message, "Success");

        let failed = executor(Arc::new(FixedScript(ScriptOutcome {
            success: false,
            response_time_ms: Some(35),
            ..Default::default()
        })))
        .execute(&endpoint, &host(None))
        .await;
        assert!(!failed.success);
        assert_eq!(failed.response_time_ms, 35);
        assert_eq!(failed.message, "Script execution failed");
    }
}
