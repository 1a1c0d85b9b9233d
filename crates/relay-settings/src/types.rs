//! Settings sections.
//!
//! Every section is `#[serde(default)]` so a settings file only needs the
//! keys it changes. Durations are stored in milliseconds and exposed as
//! [`Duration`] through accessor methods.

use std::time::Duration;

use relay_core::logging::LogFormat;
use serde::{Deserialize, Serialize};

/// Root settings object.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelaySettings {
    /// HTTP / WebSocket listener and per-connection limits.
    pub server: ServerSettings,
    /// Redis session store used to validate tokens.
    pub session_store: SessionStoreSettings,
    /// Conversation/message storage service.
    pub storage: StorageSettings,
    /// Cross-process event bus.
    pub bus: BusSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

/// Listener and per-connection settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Bind port (`0` picks a free port).
    pub port: u16,
    /// Largest inbound frame accepted, in bytes.
    pub max_frame_bytes: usize,
    /// Outbound frames buffered per connection before it is dropped.
    pub outbound_queue_capacity: usize,
    /// Read deadline, refreshed by every frame and pong.
    pub read_timeout_ms: u64,
    /// Idle interval between keepalive pings. Must be shorter than the read deadline.
    pub ping_interval_ms: u64,
    /// Deadline for a single socket write.
    pub write_timeout_ms: u64,
    /// How long shutdown waits for background tasks.
    pub shutdown_timeout_ms: u64,
    /// Serve Prometheus metrics at `/metrics`.
    pub metrics_enabled: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_frame_bytes: 16 * 1024,
            outbound_queue_capacity: 256,
            read_timeout_ms: 60_000,
            ping_interval_ms: 54_000,
            write_timeout_ms: 10_000,
            shutdown_timeout_ms: 10_000,
            metrics_enabled: true,
        }
    }
}

impl ServerSettings {
    /// Read deadline.
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Keepalive interval.
    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    /// Per-write deadline.
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    /// Shutdown grace period.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

/// Session store connection settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionStoreSettings {
    /// Redis URL.
    pub redis_url: String,
    /// Prefix prepended to the token to form the lookup key.
    pub key_prefix: String,
    /// Per-lookup deadline.
    pub timeout_ms: u64,
}

impl Default for SessionStoreSettings {
    fn default() -> Self {
        Self {
            redis_url: "redis://127.0.0.1:6379".to_string(),
            key_prefix: "session:".to_string(),
            timeout_ms: 5_000,
        }
    }
}

impl SessionStoreSettings {
    /// Per-lookup deadline.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Storage service client settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageSettings {
    /// Base URL, without a trailing slash.
    pub base_url: String,
    /// Per-request deadline.
    pub timeout_ms: u64,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8081".to_string(),
            timeout_ms: 5_000,
        }
    }
}

impl StorageSettings {
    /// Per-request deadline.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Which bus implementation to run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusBackend {
    /// Redis pub/sub, shared across processes.
    #[default]
    Redis,
    /// In-process broadcast channel (single instance only).
    Memory,
}

/// Event bus settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BusSettings {
    /// Backend selection.
    pub backend: BusBackend,
    /// Redis URL (ignored by the memory backend).
    pub redis_url: String,
    /// Channel every process publishes to and subscribes on.
    pub channel: String,
    /// Buffer size of the in-process channel.
    pub memory_capacity: usize,
    /// Pause before re-subscribing after the subscription ends.
    pub resubscribe_delay_ms: u64,
}

impl Default for BusSettings {
    fn default() -> Self {
        Self {
            backend: BusBackend::Redis,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            channel: "chat:events".to_string(),
            memory_capacity: 1024,
            resubscribe_delay_ms: 1_000,
        }
    }
}

impl BusSettings {
    /// Re-subscribe pause.
    pub fn resubscribe_delay(&self) -> Duration {
        Duration::from_millis(self.resubscribe_delay_ms)
    }
}

/// Log output settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}
