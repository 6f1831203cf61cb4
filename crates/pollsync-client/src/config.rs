//! Client settings.
//!
//! Every field has a default, so a TOML file only needs the keys it changes.
//! `POLLSYNC_PUSH_URL` and `POLLSYNC_API_URL` replace the endpoint defaults.

use anyhow::{Context, Result};
use pollsync_transport::WebSocketConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::reconnect::{Backoff, ReconnectPolicy};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// WebSocket push endpoint.
    #[serde(default = "default_push_url")]
    pub push_url: String,

    /// Base URL of the REST API.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    /// Retries after the first failed connect before giving up.
    #[serde(default = "default_attempts")]
    pub attempts: u32,

    /// Delay before the first retry, in milliseconds.
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,

    /// Upper bound for exponential backoff, in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    #[serde(default)]
    pub backoff: Backoff,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,

    /// Budget for dialing plus the `connected` reply, in milliseconds.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Whole-request timeout for REST calls, in milliseconds.
    #[serde(default = "default_http_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Serve Prometheus metrics from `pollwatch`.
    #[serde(default)]
    pub enabled: bool,

    /// Port the exporter listens on.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

fn default_push_url() -> String {
    std::env::var("POLLSYNC_PUSH_URL").unwrap_or_else(|_| "ws://127.0.0.1:8000/ws".to_string())
}

fn default_api_base_url() -> String {
    std::env::var("POLLSYNC_API_URL").unwrap_or_else(|_| "http://127.0.0.1:8000/api".to_string())
}

fn default_attempts() -> u32 {
    5
}

fn default_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    5_000
}

fn default_max_message_size() -> usize {
    64 * 1024
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_http_timeout_ms() -> u64 {
    10_000
}

fn default_metrics_port() -> u16 {
    9091
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            push_url: default_push_url(),
            api_base_url: default_api_base_url(),
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            delay_ms: default_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff: Backoff::default(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_message_size: default_max_message_size(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_http_timeout_ms(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
        }
    }
}

impl Config {
    /// Read the first config file found on the search path, or use defaults.
    ///
    /// # Errors
    ///
    /// Fails if a file is found but is not valid configuration.
    pub fn load() -> Result<Self> {
        const SEARCH_PATH: [&str; 3] = [
            "pollsync.toml",
            "/etc/pollsync/pollsync.toml",
            "~/.config/pollsync/pollsync.toml",
        ];

        let found = SEARCH_PATH
            .iter()
            .map(|p| shellexpand::tilde(p).into_owned())
            .find(|p| Path::new(p).is_file());

        match found {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    /// # Errors
    ///
    /// Fails if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("parsing {}", path.display()))
    }

    /// # Errors
    ///
    /// Fails on malformed TOML or an unknown enum value.
    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    #[must_use]
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy::new(
            self.reconnect.attempts,
            Duration::from_millis(self.reconnect.delay_ms),
            Duration::from_millis(self.reconnect.max_delay_ms),
            self.reconnect.backoff,
        )
    }

    #[must_use]
    pub fn websocket_config(&self) -> WebSocketConfig {
        WebSocketConfig {
            url: self.server.push_url.clone(),
            max_message_size: self.transport.max_message_size,
            connect_timeout: Duration::from_millis(self.transport.connect_timeout_ms),
        }
    }

    #[must_use]
    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http.timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reconnect_policy() {
        let config = Config::default();
        assert_eq!(config.reconnect_policy(), ReconnectPolicy::default());
        assert_eq!(config.http_timeout(), Duration::from_secs(10));
        assert!(!config.metrics.enabled);
    }

    #[test]
    fn test_partial_file() {
        let config = Config::from_toml(
            r#"
            [server]
            push_url = "ws://polls.example:9000/ws"

            [reconnect]
            attempts = 2
            backoff = "fixed"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.push_url, "ws://polls.example:9000/ws");
        assert_eq!(config.reconnect.attempts, 2);
        assert_eq!(config.reconnect.delay_ms, 1_000);
        assert_eq!(config.reconnect_policy().backoff, Backoff::Fixed);
        assert_eq!(config.transport.max_message_size, 64 * 1024);

        let ws = config.websocket_config();
        assert_eq!(ws.url, "ws://polls.example:9000/ws");
        assert_eq!(ws.connect_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_rejects_unknown_backoff() {
        assert!(Config::from_toml("[reconnect]\nbackoff = \"linear\"").is_err());
    }
}
