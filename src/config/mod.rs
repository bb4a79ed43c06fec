//! Configuration types and file loading

use crate::cache::CacheOptions;
use crate::core::protocol::PROTOCOL_VERSION;
use crate::utils::errors::{RelayError, RelayResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Worker process and transport policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Executable to spawn
    pub command: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    /// Per-request response window
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Resend budget per request on timeout/write failure
    pub request_retries: u32,
    /// Wait after spawn before the initialize handshake
    #[serde(with = "humantime_serde")]
    pub startup_grace: Duration,
    /// Delay before the first reconnection attempt; attempt k waits
    /// `reconnect_base_delay * backoff_multiplier^(k-1)`
    #[serde(with = "humantime_serde")]
    pub reconnect_base_delay: Duration,
    pub backoff_multiplier: f64,
    pub max_reconnect_attempts: u32,
    pub protocol_version: String,
    pub client_name: String,
    pub client_version: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            command: String::new(),
            args: Vec::new(),
            env: HashMap::new(),
            request_timeout: Duration::from_secs(30),
            request_retries: 2,
            startup_grace: Duration::from_millis(500),
            reconnect_base_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            max_reconnect_attempts: 3,
            protocol_version: PROTOCOL_VERSION.to_string(),
            client_name: env!("CARGO_PKG_NAME").to_string(),
            client_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl WorkerConfig {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Default::default()
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub worker: WorkerConfig,
    /// Per-cache policies keyed by cache name
    pub caches: HashMap<String, CacheOptions>,
}

/// Supported config file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Yaml,
}

impl ConfigFormat {
    /// Detect format from file extension and content
    pub fn detect(path: &Path, content: &str) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => ConfigFormat::Json,
            Some("yml") | Some("yaml") => ConfigFormat::Yaml,
            _ => {
                if content.trim_start().starts_with('{') {
                    ConfigFormat::Json
                } else {
                    ConfigFormat::Yaml
                }
            }
        }
    }
}

impl Config {
    /// Load a JSON or YAML config file.
    pub async fn load(path: impl Into<PathBuf>) -> RelayResult<Self> {
        let path = path.into();
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| RelayError::Config(format!("failed to read {}: {}", path.display(), e)))?;

        let format = ConfigFormat::detect(&path, &content);
        debug!(path = %path.display(), ?format, "loading config");

        match format {
            ConfigFormat::Json => serde_json::from_str(&content)
                .map_err(|e| RelayError::Config(format!("invalid JSON config: {}", e))),
            ConfigFormat::Yaml => serde_yaml::from_str(&content)
                .map_err(|e| RelayError::Config(format!("invalid YAML config: {}", e))),
        }
    }

    /// Cache policy for `name`, defaulting when unconfigured.
    pub fn cache_options(&self, name: &str) -> CacheOptions {
        self.caches.get(name).cloned().unwrap_or_default()
    }
}
