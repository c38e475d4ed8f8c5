use serde::Deserialize;
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::version::VERSION;

const ENV_PREFIX: &str = "UPTIME_";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse TOML from config file at {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("Failed to load config from environment: {0}")]
    Environment(#[from] envy::Error),
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub inventory_path: String,
    pub log_dir: String,
    pub default_timeout_ms: u64,
    pub webhook_timeout_secs: u64,
    pub result_retention: usize,
    pub user_agent: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            inventory_path: default_inventory_path(),
            log_dir: default_log_dir(),
            default_timeout_ms: 10_000,
            webhook_timeout_secs: 10,
            result_retention: 1_000,
            user_agent: default_user_agent(),
        }
    }
}

// Partial config for layering
#[derive(Deserialize, Default, Debug)]
struct PartialServerConfig {
    inventory_path: Option<String>,
    log_dir: Option<String>,
    default_timeout_ms: Option<u64>,
    webhook_timeout_secs: Option<u64>,
    result_retention: Option<usize>,
    user_agent: Option<String>,
}

fn default_inventory_path() -> String {
    "inventory.toml".to_string()
}

fn default_log_dir() -> String {
    "logs".to_string()
}

fn default_user_agent() -> String {
    format!("uptime-monitor/{VERSION}")
}

impl ServerConfig {
    /// File values first, `UPTIME_*` environment variables on top, defaults for the rest.
    pub fn load(config_path: Option<&str>) -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let file_config = match config_path {
            Some(path_str) => Self::read_file(Path::new(path_str))?,
            None => PartialServerConfig::default(),
        };
        let env_config: PartialServerConfig = envy::prefixed(ENV_PREFIX).from_env()?;

        Ok(Self::merge(env_config, file_config))
    }

    fn read_file(path: &Path) -> Result<PartialServerConfig, ConfigError> {
        if !path.exists() {
            return Ok(PartialServerConfig::default());
        }
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        toml::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            source: e,
        })
    }

    fn merge(env_config: PartialServerConfig, file_config: PartialServerConfig) -> Self {
        let defaults = ServerConfig::default();
        ServerConfig {
            inventory_path: env_config
                .inventory_path
                .or(file_config.inventory_path)
                .unwrap_or(defaults.inventory_path),
            log_dir: env_config.log_dir.or(file_config.log_dir).unwrap_or(defaults.log_dir),
            default_timeout_ms: env_config
                .default_timeout_ms
                .or(file_config.default_timeout_ms)
                .unwrap_or(defaults.default_timeout_ms),
            webhook_timeout_secs: env_config
                .webhook_timeout_secs
                .or(file_config.webhook_timeout_secs)
                .unwrap_or(defaults.webhook_timeout_secs),
            result_retention: env_config
                .result_retention
                .or(file_config.result_retention)
                .unwrap_or(defaults.result_retention),
            user_agent: env_config
                .user_agent
                .or(file_config.user_agent)
                .unwrap_or(defaults.user_agent),
        }
    }
}
