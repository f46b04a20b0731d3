//! Error types shared across the workspace.

/// Error type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised while building core models or loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Event record missing a required field or carrying an unreadable one
    #[error("Malformed event: {0}")]
    MalformedEvent(String),

    /// Configuration rejected by validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
