//! WebSocket connection management, presence, command handling, and bus fan-out.

pub mod connection;
pub mod event_bridge;
pub mod handler;
pub mod presence;
pub mod registry;
pub mod session;
