//! # relay-server
//!
//! Axum HTTP + `WebSocket` delivery layer for chat.
//!
//! - `WebSocket` gateway: token validation before upgrade, one live
//!   connection per identity, bounded per-connection outbound queues
//! - Command handling: validated client frames become storage writes and bus events
//! - Bus bridge: one subscription per process fanning events out to local participants
//! - Presence snapshots on every join and leave
//! - Health and Prometheus endpoints, graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod health;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::{ServerConfig, SessionLimits};
pub use server::{AppState, RelayServer};
pub use shutdown::ShutdownCoordinator;
