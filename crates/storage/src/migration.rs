//! Schema migrations for persisted state.
//!
//! Migrations run on the raw JSON document before it is deserialized, so
//! old files load even when fields were added or renamed since.

use owl_core::Time;
use serde_json::{json, Map, Value};
use tracing::info;

use crate::state::{MigrationRecord, CURRENT_SCHEMA_VERSION};
use crate::trait_::{Result, StorageError};

/// Version assumed for documents without a `schema_version` field.
pub const LEGACY_SCHEMA_VERSION: &str = "1.0";

/// One step between two schema versions.
pub trait Migration: Send + Sync {
    /// Source version.
    fn from_version(&self) -> &'static str;

    /// Target version.
    fn to_version(&self) -> &'static str;

    /// Human-readable description.
    fn description(&self) -> &'static str;

    /// Rewrite the document in place.
    fn migrate(&self, doc: &mut Map<String, Value>, now: Time) -> Result<()>;
}

/// Adds metadata and the persisted lessons-per-unit ratio.
pub struct AddRatioAndMetadata;

impl Migration for AddRatioAndMetadata {
    fn from_version(&self) -> &'static str {
        "1.0"
    }

    fn to_version(&self) -> &'static str {
        "1.1"
    }

    fn description(&self) -> &'static str {
        "add metadata, migration history and last known lessons-per-unit"
    }

    fn migrate(&self, doc: &mut Map<String, Value>, now: Time) -> Result<()> {
        let created_at = match doc
            .get("last_updated")
            .or_else(|| doc.get("last_update_timestamp"))
        {
            Some(value) => value.clone(),
            None => serde_json::to_value(now)?,
        };

        let metadata = doc
            .entry("metadata")
            .or_insert_with(|| Value::Object(Map::new()));
        let Some(metadata) = metadata.as_object_mut() else {
            return Err(StorageError::Migration("metadata is not an object".to_string()));
        };
        metadata.entry("created_at").or_insert(created_at);
        metadata
            .entry("migration_history")
            .or_insert_with(|| Value::Array(Vec::new()));

        doc.entry("last_lessons_per_unit").or_insert(Value::Null);
        doc.entry("last_units_analyzed").or_insert(json!(0));

        // 1.0 stored dates with a midnight time component in some files.
        for key in ["last_scrape_date", "last_daily_reset"] {
            if let Some(Value::String(text)) = doc.get_mut(key) {
                if let Some(date) = text.strip_suffix("T00:00:00") {
                    *text = date.to_string();
                }
            }
        }

        Ok(())
    }
}

/// Applies migrations in sequence until the document is current.
pub struct Migrator {
    migrations: Vec<Box<dyn Migration>>,
}

impl Default for Migrator {
    fn default() -> Self {
        Self {
            migrations: vec![Box::new(AddRatioAndMetadata)],
        }
    }
}

impl Migrator {
    /// Whether the document needs migrating.
    pub fn needs_migration(&self, doc: &Value) -> bool {
        schema_version(doc) != CURRENT_SCHEMA_VERSION
    }

    /// Bring a document to the current schema version.
    ///
    /// Returns the number of migrations applied.
    pub fn migrate(&self, doc: &mut Value, now: Time) -> Result<usize> {
        let Some(map) = doc.as_object_mut() else {
            return Err(StorageError::Migration("state is not a JSON object".to_string()));
        };

        let mut applied = 0;
        loop {
            let version = map
                .get("schema_version")
                .and_then(Value::as_str)
                .unwrap_or(LEGACY_SCHEMA_VERSION)
                .to_string();
            if version == CURRENT_SCHEMA_VERSION {
                return Ok(applied);
            }

            let step = self
                .migrations
                .iter()
                .find(|m| m.from_version() == version)
                .ok_or_else(|| {
                    StorageError::Migration(format!("no migration path from version {version}"))
                })?;

            step.migrate(map, now)?;
            record(map, step.from_version(), step.to_version(), now)?;
            map.insert("schema_version".to_string(), json!(step.to_version()));
            info!(
                from = step.from_version(),
                to = step.to_version(),
                description = step.description(),
                "state migrated"
            );
            applied += 1;
        }
    }
}

fn schema_version(doc: &Value) -> &str {
    doc.get("schema_version")
        .and_then(Value::as_str)
        .unwrap_or(LEGACY_SCHEMA_VERSION)
}

fn record(map: &mut Map<String, Value>, from: &str, to: &str, now: Time) -> Result<()> {
    let entry = serde_json::to_value(MigrationRecord {
        from: from.to_string(),
        to: to.to_string(),
        applied_at: now,
    })?;
    let history = map
        .get_mut("metadata")
        .and_then(|m| m.get_mut("migration_history"))
        .and_then(Value::as_array_mut)
        .ok_or_else(|| StorageError::Migration("migration history missing".to_string()))?;
    history.push(entry);
    Ok(())
}
