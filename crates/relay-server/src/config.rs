//! Server configuration.

use std::time::Duration;

use relay_settings::RelaySettings;

/// Runtime configuration for the relay server.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Max inbound WebSocket frame and message size in bytes.
    pub max_frame_bytes: usize,
    /// Per-connection outbound queue capacity.
    pub outbound_queue_capacity: usize,
    /// Read deadline, refreshed by every inbound frame.
    pub read_timeout: Duration,
    /// Keepalive ping interval.
    pub ping_interval: Duration,
    /// Deadline for each socket write.
    pub write_timeout: Duration,
    /// Deadline for each storage call made on behalf of a command.
    pub command_timeout: Duration,
    /// How long shutdown waits for background tasks.
    pub shutdown_timeout: Duration,
    /// Serve `/metrics`.
    pub metrics_enabled: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_frame_bytes: 16 * 1024,
            outbound_queue_capacity: 256,
            read_timeout: Duration::from_secs(60),
            ping_interval: Duration::from_secs(54),
            write_timeout: Duration::from_secs(10),
            command_timeout: Duration::from_secs(5),
            shutdown_timeout: Duration::from_secs(10),
            metrics_enabled: true,
        }
    }
}

impl ServerConfig {
    /// Build from loaded settings.
    pub fn from_settings(settings: &RelaySettings) -> Self {
        let server = &settings.server;
        Self {
            host: server.host.clone(),
            port: server.port,
            max_frame_bytes: server.max_frame_bytes,
            outbound_queue_capacity: server.outbound_queue_capacity,
            read_timeout: server.read_timeout(),
            ping_interval: server.ping_interval(),
            write_timeout: server.write_timeout(),
            command_timeout: settings.storage.timeout(),
            shutdown_timeout: server.shutdown_timeout(),
            metrics_enabled: server.metrics_enabled,
        }
    }

    /// `host:port` for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Per-connection limits handed to each session.
    pub fn session_limits(&self) -> SessionLimits {
        SessionLimits {
            queue_capacity: self.outbound_queue_capacity,
            read_timeout: self.read_timeout,
            ping_interval: self.ping_interval,
            write_timeout: self.write_timeout,
        }
    }
}

/// Limits applied to one connection's loops.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionLimits {
    /// Outbound queue capacity.
    pub queue_capacity: usize,
    /// Inbound read deadline.
    pub read_timeout: Duration,
    /// Keepalive ping interval.
    pub ping_interval: Duration,
    /// Per-write deadline.
    pub write_timeout: Duration,
}
