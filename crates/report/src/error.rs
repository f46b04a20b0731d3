//! Report error types.

/// Result type for report output.
pub type Result<T> = std::result::Result<T, ReportError>;

/// Errors that can occur while writing reports or sending notifications.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    /// A field every report must carry is missing
    #[error("Markdown field not found: {0}")]
    MissingField(&'static str),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A pattern failed to compile
    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// HTTP failure talking to the push service
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Push service rejected the message
    #[error("Notification rejected: {0}")]
    Rejected(String),
}
