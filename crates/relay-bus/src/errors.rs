//! Bus error types.

/// Errors that can occur while publishing to or subscribing on the bus.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    /// Redis command or connection failed.
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// An event could not be serialized.
    #[error("failed to encode bus event: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Result type for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;
