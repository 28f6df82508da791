use thiserror::Error;

/// Top-level error type for multi-API server operations.
///
/// Request-path failures never reach this type: they are answered inside an
/// envelope. This covers what can stop the process from serving.
#[derive(Debug, Error)]
pub enum MultiApiError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Internal(String),
}

/// Result type alias for multi-API server operations.
pub type Result<T> = std::result::Result<T, MultiApiError>;
