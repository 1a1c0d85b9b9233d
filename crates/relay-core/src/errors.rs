//! Error taxonomy shared across the relay.
//!
//! Every failure the relay can observe falls into one of five buckets, and
//! each bucket has a fixed consequence:
//!
//! | Variant | Consequence |
//! |---|---|
//! | [`RelayError::Unauthenticated`] | upgrade rejected with HTTP 401 |
//! | [`RelayError::Protocol`] | one error frame, connection stays open |
//! | [`RelayError::Authorization`] | one error frame, connection stays open |
//! | [`RelayError::Upstream`] | one generic error frame, cause only logged |
//! | [`RelayError::Transport`] | connection closed, unregistered, presence updated |

use thiserror::Error;

/// Client-facing message for frames that do not decode.
pub const INVALID_PAYLOAD: &str = "invalid payload";
/// Client-facing message for frames with an unknown `type`.
pub const UNSUPPORTED_TYPE: &str = "unsupported message type";
/// Client-facing message for a missing or blank `conversation_id`.
pub const CONVERSATION_ID_REQUIRED: &str = "conversation_id is required";
/// Client-facing message for a missing or blank `text`.
pub const TEXT_REQUIRED: &str = "text is required";
/// Client-facing message when the requester is not a participant.
pub const NOT_A_PARTICIPANT: &str = "not a participant in this conversation";
/// Generic message when persisting or publishing a chat message fails.
pub const SEND_FAILED: &str = "failed to send message";
/// Generic message when loading or sharing a conversation fails.
pub const CONVERSATION_FAILED: &str = "failed to share conversation";

/// A malformed or unsupported inbound frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// The frame is not a JSON object matching the inbound schema.
    #[error("invalid payload")]
    InvalidPayload,
    /// The frame's `type` is not one the relay handles.
    #[error("unsupported message type")]
    UnsupportedType,
    /// `conversation_id` is absent or blank after trimming.
    #[error("conversation_id is required")]
    MissingConversationId,
    /// `text` is absent or blank after trimming.
    #[error("text is required")]
    MissingText,
}

/// Top-level relay error.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Bad, expired, or missing session token.
    #[error("unauthenticated")]
    Unauthenticated,
    /// Malformed or unsupported frame from the client.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    /// The acting identity may not perform the operation.
    #[error("not a participant in this conversation")]
    Authorization,
    /// Session store, storage service, or bus failed. The payload is the
    /// generic message shown to the client.
    #[error("{0}")]
    Upstream(&'static str),
    /// Read or write failure, deadline expiry, or queue overflow.
    #[error("transport error: {0}")]
    Transport(String),
}

impl RelayError {
    /// Whether this error ends the connection it occurred on.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Unauthenticated | Self::Transport(_))
    }

    /// Short machine-readable category for logs and metrics labels.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "unauthenticated",
            Self::Protocol(_) => "protocol",
            Self::Authorization => "authorization",
            Self::Upstream(_) => "upstream",
            Self::Transport(_) => "transport",
        }
    }
}
