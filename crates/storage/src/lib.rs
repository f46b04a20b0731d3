//! Storage abstraction and implementations for Owlgorithm.
//!
//! This crate provides a trait-based state store with an atomic JSON
//! file implementation, timestamped backups and schema migrations.

#![warn(missing_docs)]

pub mod json_storage;
pub mod migration;
pub mod state;
pub mod trait_;

pub use json_storage::{JsonStateStore, DEFAULT_KEEP_BACKUPS};
pub use migration::{Migration, Migrator, LEGACY_SCHEMA_VERSION};
pub use state::{DailySummary, MigrationRecord, StateMetadata, TrackerState, CURRENT_SCHEMA_VERSION};
pub use trait_::{Result, StateStore, StorageError};
