//! Interface to the external sandbox that runs code-mode probes.
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;

/// What a script sees about the endpoint it probes.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptEnv {
    pub endpoint_id: i32,
    pub endpoint_name: String,
    pub host_id: i32,
    pub host_name: String,
    pub base_url: Option<String>,
    pub headers: HashMap<String, String>,
}

/// Raw sandbox result; the executor fills in defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScriptOutcome {
    pub success: bool,
    pub message: Option<String>,
    pub status_code: Option<u16>,
    pub response_time_ms: Option<i64>,
}

/// Implementations must not panic or fail: internal sandbox errors become `success = false`.
#[async_trait]
pub trait ScriptExecutor: Send + Sync {
    async fn run_script(&self, script: &str, env: &ScriptEnv) -> ScriptOutcome;
}

/// Used when no sandbox is wired in.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableScriptExecutor;

#[async_trait]
impl ScriptExecutor for UnavailableScriptExecutor {
    async fn run_script(&self, _script: &str, _env: &ScriptEnv) -> ScriptOutcome {
        ScriptOutcome {
            success: false,
            message: Some("Code execution is not enabled".to_string()),
            status_code: None,
            response_time_ms: None,
        }
    }
}
