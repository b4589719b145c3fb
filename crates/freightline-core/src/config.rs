//! Client configuration.
//!
//! Every field is defaulted, so an absent or empty configuration file yields
//! a working local-development setup. Files are TOML:
//!
//! ```toml
//! [api]
//! base_url = "https://logistics.example.com/api"
//!
//! [realtime]
//! endpoint = "wss://logistics.example.com/ws"
//! max_reconnect_attempts = 5
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML for this schema.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level configuration for the Freightline SDK.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// HTTP API settings.
    pub api: ApiConfig,
    /// Realtime broker settings.
    pub realtime: RealtimeConfig,
}

impl ClientConfig {
    /// Load configuration from a TOML file. A missing file yields defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_str(&raw)
    }

    /// Parse configuration from a TOML string.
    #[allow(clippy::should_implement_trait)] // fallible parse, not FromStr
    pub fn from_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }
}

/// HTTP API settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Fixed origin and path prefix every request is issued against.
    pub base_url: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8081/api".to_string(),
        }
    }
}

/// Realtime broker settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    /// WebSocket endpoint of the push-message broker.
    pub endpoint: String,
    /// Ceiling on reconnection attempts after broker-level errors.
    pub max_reconnect_attempts: u32,
    /// Fixed delay before each broker-error reconnection attempt.
    pub retry_delay_ms: u64,
    /// Transport-owned automatic reconnect delay after socket failures.
    /// `None` disables transport-level recovery.
    pub transport_reconnect_delay_ms: Option<u64>,
    /// Heart-beat interval negotiated with the broker (both directions).
    pub heartbeat_ms: u64,
    /// Capacity of the in-memory notification ring; oldest entries are
    /// evicted once full.
    pub log_capacity: usize,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            endpoint: "ws://localhost:8081/ws".to_string(),
            max_reconnect_attempts: 5,
            retry_delay_ms: 5_000,
            transport_reconnect_delay_ms: Some(5_000),
            heartbeat_ms: 4_000,
            log_capacity: 256,
        }
    }
}

impl RealtimeConfig {
    /// Fixed delay before each broker-error reconnection attempt.
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Transport-owned automatic reconnect delay, if enabled.
    pub fn transport_reconnect_delay(&self) -> Option<Duration> {
        self.transport_reconnect_delay_ms.map(Duration::from_millis)
    }

    /// Heart-beat interval negotiated with the broker.
    pub fn heartbeat(&self) -> Duration {
        Duration::from_millis(self.heartbeat_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_the_local_backend() {
        let config = ClientConfig::default();
        assert_eq!(config.api.base_url, "http://localhost:8081/api");
        assert_eq!(config.realtime.endpoint, "ws://localhost:8081/ws");
        assert_eq!(config.realtime.max_reconnect_attempts, 5);
        assert_eq!(config.realtime.retry_delay(), Duration::from_secs(5));
        assert_eq!(
            config.realtime.transport_reconnect_delay(),
            Some(Duration::from_secs(5))
        );
    }

    #[test]
    fn partial_file_keeps_remaining_defaults() {
        let config = ClientConfig::from_str(
            r#"
            [api]
            base_url = "https://logistics.example.com/api"

            [realtime]
            max_reconnect_attempts = 3
            "#,
        )
        .unwrap();

        assert_eq!(config.api.base_url, "https://logistics.example.com/api");
        assert_eq!(config.realtime.max_reconnect_attempts, 3);
        assert_eq!(config.realtime.retry_delay_ms, 5_000);
        assert_eq!(config.realtime.log_capacity, 256);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let config = ClientConfig::load("/nonexistent/freightline.toml").unwrap();
        assert_eq!(config, ClientConfig::default());
    }

    #[test]
    fn load_reads_a_real_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[realtime]\nendpoint = \"wss://broker.example/ws\"").unwrap();

        let config = ClientConfig::load(file.path()).unwrap();
        assert_eq!(config.realtime.endpoint, "wss://broker.example/ws");
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let err = ClientConfig::from_str("[api\nbase_url = 3").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
