//! Auth error types.

use std::time::Duration;

/// Errors that can occur while validating a session token.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Token is empty, unknown, or expired.
    #[error("unauthenticated")]
    Unauthenticated,

    /// The session store did not answer within the deadline.
    #[error("session store lookup timed out after {0:?}")]
    Timeout(Duration),

    /// Redis command or connection failed.
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// A stored session record could not be decoded.
    #[error("malformed session record: {0}")]
    Json(#[from] serde_json::Error),

    /// Any other store failure.
    #[error("session store error: {0}")]
    Store(String),
}

impl AuthError {
    /// Whether the failure lies with the store rather than the token.
    pub fn is_upstream(&self) -> bool {
        !matches!(self, Self::Unauthenticated)
    }
}

/// Result type for auth operations.
pub type Result<T> = std::result::Result<T, AuthError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
