//! # relay-core
//!
//! Shared vocabulary for the relay crates.
//!
//! - **Identities**: [`Identity`] for authenticated principals, [`ConnectionId`]
//!   for individual sockets
//! - **Frames**: inbound client commands, the bus event wire contract, and the
//!   redacted outbound frames delivered to clients
//! - **Errors**: the [`RelayError`] taxonomy and the client-facing messages it maps to
//! - **Logging**: `tracing` subscriber setup shared by the binary and tests

#![deny(unsafe_code)]

pub mod errors;
pub mod frames;
pub mod ids;
pub mod logging;

pub use errors::{ProtocolError, RelayError};
pub use frames::{
    BusEvent, Command, ConversationSnapshot, EventKind, InboundFrame, MessageRecord,
    OutboundFrame,
};
pub use ids::{ConnectionId, Identity};
