//! Storage trait abstraction.

use async_trait::async_trait;

use crate::state::TrackerState;

/// Error type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Schema migration failed
    #[error("Migration error: {0}")]
    Migration(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Persistence for tracker state between update cycles.
///
/// Loading never fails on a missing or corrupt file; implementations fall
/// back to a backup or to the default state.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Load the current state.
    async fn load(&self) -> Result<TrackerState>;

    /// Persist the state, replacing the previous one.
    async fn save(&self, state: &TrackerState) -> Result<()>;

    /// Whether any state has been persisted yet.
    async fn exists(&self) -> bool;
}
