//! Progress error types.

/// Error type for progress calculations.
pub type Result<T> = std::result::Result<T, ProgressError>;

/// Errors that can occur while attributing lessons to units.
///
/// None of these are fatal: callers keep the last known-good ratio.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProgressError {
    /// Not enough unit boundaries or surviving units to compute a ratio
    #[error("Insufficient data: {0}")]
    InsufficientData(String),
}
