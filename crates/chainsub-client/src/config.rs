//! Subscriber configuration.

use std::path::Path;
use std::time::Duration;

use chainsub_core::{ReconnectConfig, DEFAULT_CHANNEL_PREFIX};
use serde::{Deserialize, Serialize};

/// Top-level configuration for a [`SubscriberClient`](crate::SubscriberClient).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriberConfig {
    /// Host (and optional port) of the indexing service, without scheme.
    pub server_url: String,
    #[serde(default = "bool_true")]
    pub use_ssl: bool,
    /// Client name reported to the broker.
    #[serde(default = "default_client_name")]
    pub client_name: String,
    /// Prefix prepended to every channel name.
    #[serde(default = "default_channel_prefix")]
    pub channel_prefix: String,
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,
    #[serde(default = "default_max_server_ping_delay_ms")]
    pub max_server_ping_delay_ms: u64,
    /// Request broker-side replay for every channel.
    #[serde(default = "bool_true")]
    pub recoverable: bool,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
}

fn bool_true() -> bool { true }
fn default_client_name() -> String { "chainsub".into() }
fn default_channel_prefix() -> String { DEFAULT_CHANNEL_PREFIX.into() }
fn default_read_timeout_ms() -> u64 { 30_000 }
fn default_write_timeout_ms() -> u64 { 2_000 }
fn default_handshake_timeout_ms() -> u64 { 30_000 }
fn default_max_server_ping_delay_ms() -> u64 { 30_000 }

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self::new("127.0.0.1:8000")
    }
}

impl SubscriberConfig {
    /// Config with defaults for everything but the server address.
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            use_ssl: true,
            client_name: default_client_name(),
            channel_prefix: default_channel_prefix(),
            read_timeout_ms: default_read_timeout_ms(),
            write_timeout_ms: default_write_timeout_ms(),
            handshake_timeout_ms: default_handshake_timeout_ms(),
            max_server_ping_delay_ms: default_max_server_ping_delay_ms(),
            recoverable: true,
            reconnect: ReconnectConfig::default(),
        }
    }

    /// Load a JSON config file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// WebSocket endpoint of the broker, requesting protobuf framing.
    pub fn websocket_url(&self) -> String {
        let scheme = if self.use_ssl { "wss" } else { "ws" };
        format!(
            "{scheme}://{}/connection/websocket?format=protobuf",
            self.server_url.trim_end_matches('/')
        )
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn max_server_ping_delay(&self) -> Duration {
        Duration::from_millis(self.max_server_ping_delay_ms)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}
