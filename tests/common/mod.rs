// =============================================================================
// SHARED TEST FIXTURES
// A local HTTP server that plays both the probed service and the webhook receiver,
// plus builders for hosts, endpoints and channels.
// =============================================================================
#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, Method, StatusCode, Uri},
    routing::{any, get, post},
    Router,
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use uptime_monitor::db::models::{Endpoint, Host, HttpProbeConfig, NotificationSettings, ProbeMode};
use uptime_monitor::monitoring::script::{ScriptEnv, ScriptExecutor, ScriptOutcome};
use uptime_monitor::notifications::models::NotificationChannel;

#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub method: String,
    pub path: String,
    /// Lowercased names, in arrival order; repeated headers appear once per value.
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl CapturedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.header_values(name).into_iter().next()
    }

    pub fn header_values(&self, name: &str) -> Vec<&str> {
        let name = name.to_ascii_lowercase();
        self.headers
            .iter()
            .filter(|(k, _)| *k == name)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).expect("captured body is JSON")
    }
}

#[derive(Clone, Default)]
struct ServerState {
    captured: Arc<Mutex<Vec<CapturedRequest>>>,
}

pub struct TestServer {
    pub addr: SocketAddr,
    captured: Arc<Mutex<Vec<CapturedRequest>>>,
}

impl TestServer {
    pub async fn spawn() -> Self {
        let state = ServerState::default();
        let captured = state.captured.clone();

        let app = Router::new()
            .route("/ok", get(|| async { "ok" }))
            .route("/status/{code}", get(respond_with_status))
            .route(
                "/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(3)).await;
                    "late"
                }),
            )
            .route("/echo", any(capture_ok))
            .route("/api/echo", any(capture_ok))
            .route("/hook/ok", post(capture_ok))
            .route("/hook/fail", post(capture_fail))
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, captured }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn captured(&self) -> Vec<CapturedRequest> {
        self.captured.lock().await.clone()
    }

    pub async fn captured_at(&self, path: &str) -> Vec<CapturedRequest> {
        self.captured()
            .await
            .into_iter()
            .filter(|r| r.path == path)
            .collect()
    }
}

async fn respond_with_status(Path(code): Path<u16>) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_REQUEST)
}

async fn record(state: &ServerState, method: Method, uri: Uri, headers: HeaderMap, body: Bytes) {
    let headers = headers
        .iter()
        .map(|(k, v)| (k.as_str().to_string(), v.to_str().unwrap_or_default().to_string()))
        .collect();
    state.captured.lock().await.push(CapturedRequest {
        method: method.to_string(),
        path: uri.path().to_string(),
        headers,
        body: String::from_utf8_lossy(&body).into_owned(),
    });
}

async fn capture_ok(
    State(state): State<ServerState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    record(&state, method, uri, headers, body).await;
    StatusCode::OK
}

async fn capture_fail(
    State(state): State<ServerState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    record(&state, method, uri, headers, body).await;
    StatusCode::INTERNAL_SERVER_ERROR
}

/// A sandbox stand-in whose health is flipped by the test.
#[derive(Default)]
pub struct SwitchableScript {
    pub failing: AtomicBool,
    pub runs: AtomicUsize,
}

impl SwitchableScript {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ScriptExecutor for SwitchableScript {
    async fn run_script(&self, _script: &str, _env: &ScriptEnv) -> ScriptOutcome {
        self.runs.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            ScriptOutcome {
                success: false,
                message: Some("connection refused".to_string()),
                status_code: None,
                response_time_ms: Some(5),
            }
        } else {
            ScriptOutcome {
                success: true,
                message: None,
                status_code: Some(200),
                response_time_ms: Some(5),
            }
        }
    }
}

pub fn host(id: i32, base_url: Option<String>) -> Host {
    Host {
        id,
        name: format!("service-{id}"),
        base_url,
        headers: HashMap::new(),
        interval_seconds: Some(60),
        enabled: true,
        notification: NotificationSettings::default(),
    }
}

pub fn host_with_alerts(id: i32, threshold: u32, cooldown_minutes: u32, channel_ids: Vec<i32>) -> Host {
    let mut host = host(id, Some("https://service.example.com".to_string()));
    host.notification = NotificationSettings {
        enabled: true,
        failure_threshold: threshold,
        cooldown_minutes,
        channel_ids,
    };
    host
}

pub fn http_endpoint(id: i32, host_id: i32, config: HttpProbeConfig) -> Endpoint {
    Endpoint {
        id,
        host_id,
        name: format!("endpoint-{id}"),
        probe: ProbeMode::Config(config),
        interval_seconds: None,
        enabled: true,
    }
}

pub fn script_endpoint(id: i32, host_id: i32) -> Endpoint {
    Endpoint {
        id,
        host_id,
        name: format!("endpoint-{id}"),
        probe: ProbeMode::Code {
            script: "checks/health.js".to_string(),
        },
        interval_seconds: None,
        enabled: true,
    }
}

pub fn channel(id: i32, webhook_url: String) -> NotificationChannel {
    NotificationChannel {
        id,
        name: format!("channel-{id}"),
        webhook_url,
        headers: HashMap::new(),
        body_template: r#"{"event": "{{eventType}}", "service": "{{service.name}}", "endpoint": "{{endpoint.name}}", "failures": "{{details.consecutiveFailures}}", "status": "{{details.status}}"}"#.to_string(),
        enabled: true,
    }
}
