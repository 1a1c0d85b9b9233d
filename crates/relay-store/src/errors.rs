//! Storage client error types.

/// Errors returned by a [`ConversationStore`](crate::ConversationStore).
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Transport failure, timeout, or undecodable response body.
    #[error("storage request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with an unexpected status.
    #[error("storage service returned status {0}")]
    Status(u16),

    /// The configured base URL cannot carry a path.
    #[error("invalid storage base URL: {0}")]
    InvalidUrl(String),

    /// The service is unreachable (in-memory store simulating an outage).
    #[error("storage service unavailable")]
    Unavailable,
}

impl StorageError {
    /// Whether the request ran out of time.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Http(e) if e.is_timeout())
    }
}

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_display() {
        assert_eq!(
            StorageError::Status(502).to_string(),
            "storage service returned status 502"
        );
        assert!(!StorageError::Status(504).is_timeout());
    }

    #[test]
    fn invalid_url_display() {
        let err = StorageError::InvalidUrl("mailto:x".into());
        assert!(err.to_string().contains("mailto:x"));
    }
}
