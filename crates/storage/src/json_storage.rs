//! JSON file storage implementation.
//!
//! State lives in a single pretty-printed JSON file. Writes go to a temp
//! file in the same directory and are renamed over the original, so a crash
//! never leaves a half-written state. The previous file is copied into the
//! backup directory first; the newest backups are kept and used to recover
//! from a corrupt state file.

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde_json::Value;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::migration::Migrator;
use crate::state::TrackerState;
use crate::trait_::{Result, StateStore, StorageError};

/// Backups kept after each save.
pub const DEFAULT_KEEP_BACKUPS: usize = 5;

/// File-based JSON state store.
pub struct JsonStateStore {
    path: PathBuf,
    backup_dir: PathBuf,
    keep_backups: usize,
    migrator: Migrator,
}

impl JsonStateStore {
    /// Create a store for `path`, keeping backups in `backup_dir`.
    ///
    /// Directories are created on the first save.
    pub fn new(path: impl AsRef<Path>, backup_dir: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            backup_dir: backup_dir.as_ref().to_path_buf(),
            keep_backups: DEFAULT_KEEP_BACKUPS,
            migrator: Migrator::default(),
        }
    }

    /// State file location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Backup files, newest first.
    pub async fn backups(&self) -> Result<Vec<PathBuf>> {
        let prefix = self.backup_prefix();
        let mut rd = match fs::read_dir(&self.backup_dir).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut backups = Vec::new();
        while let Some(entry) = rd.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with(&prefix) && name.ends_with(".json") {
                backups.push(entry.path());
            }
        }
        // Names embed a sortable timestamp.
        backups.sort_by(|a, b| b.cmp(a));
        Ok(backups)
    }

    fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "state.json".to_string())
    }

    fn backup_prefix(&self) -> String {
        let stem = self
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "state".to_string());
        format!("{stem}_backup_")
    }

    fn temp_path(&self) -> PathBuf {
        self.path.with_file_name(format!("{}.tmp", self.file_name()))
    }

    /// Parse, migrate and deserialize a state document.
    fn decode(&self, text: &str) -> Result<TrackerState> {
        let mut doc: Value = serde_json::from_str(text)?;
        if !doc.is_object() {
            return Err(StorageError::Other("state is not a JSON object".to_string()));
        }
        if self.migrator.needs_migration(&doc) {
            self.migrator.migrate(&mut doc, Utc::now())?;
        }
        Ok(serde_json::from_value(doc)?)
    }

    /// Copy the current state file into the backup directory.
    async fn backup(&self) -> Result<PathBuf> {
        fs::create_dir_all(&self.backup_dir).await?;

        let stamp = Utc::now().format("%Y%m%d_%H%M%S_%6f");
        let prefix = self.backup_prefix();
        let mut target = self.backup_dir.join(format!("{prefix}{stamp}.json"));
        let mut n = 1;
        while fs::try_exists(&target).await? {
            target = self.backup_dir.join(format!("{prefix}{stamp}_{n}.json"));
            n += 1;
        }

        fs::copy(&self.path, &target).await?;
        debug!(backup = %target.display(), "state backed up");
        Ok(target)
    }

    /// Delete all but the newest `keep_backups` backups.
    async fn prune_backups(&self) -> Result<()> {
        for old in self.backups().await?.into_iter().skip(self.keep_backups) {
            if let Err(e) = fs::remove_file(&old).await {
                warn!(backup = %old.display(), error = %e, "failed to remove old backup");
            }
        }
        Ok(())
    }

    /// Load the newest backup that decodes cleanly.
    async fn recover_from_backup(&self) -> Result<Option<TrackerState>> {
        for backup in self.backups().await? {
            let Ok(text) = fs::read_to_string(&backup).await else {
                continue;
            };
            match self.decode(&text) {
                Ok(state) => {
                    info!(backup = %backup.display(), "state recovered from backup");
                    return Ok(Some(state));
                }
                Err(e) => debug!(backup = %backup.display(), error = %e, "backup unusable"),
            }
        }
        Ok(None)
    }
}

#[async_trait::async_trait]
impl StateStore for JsonStateStore {
    async fn load(&self) -> Result<TrackerState> {
        let text = match fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no state file, starting fresh");
                return Ok(TrackerState::default());
            }
            Err(e) => return Err(e.into()),
        };

        match self.decode(&text) {
            Ok(state) => Ok(state),
            // A newer schema is not corruption; refuse rather than overwrite it.
            Err(e @ StorageError::Migration(_)) => Err(e),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "state file corrupt, trying backups");
                if let Some(state) = self.recover_from_backup().await? {
                    return Ok(state);
                }
                warn!("no valid backup found, using default state");
                Ok(TrackerState::default())
            }
        }
    }

    async fn save(&self, state: &TrackerState) -> Result<()> {
        let json = serde_json::to_string_pretty(state)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        if fs::try_exists(&self.path).await? {
            if let Err(e) = self.backup().await {
                warn!(error = %e, "failed to back up state before saving");
            }
        }

        let temp = self.temp_path();
        if let Err(e) = write_synced(&temp, json.as_bytes()).await {
            let _ = fs::remove_file(&temp).await;
            return Err(e.into());
        }
        if let Err(e) = fs::rename(&temp, &self.path).await {
            let _ = fs::remove_file(&temp).await;
            return Err(e.into());
        }
        debug!(path = %self.path.display(), "state saved");

        self.prune_backups().await
    }

    async fn exists(&self) -> bool {
        fs::try_exists(&self.path).await.unwrap_or(false)
    }
}

async fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn store(dir: &tempfile::TempDir) -> JsonStateStore {
        JsonStateStore::new(dir.path().join("tracker_state.json"), dir.path().join("backups"))
    }

    fn state_with_total(total: u64) -> TrackerState {
        TrackerState {
            total_lessons_completed: total,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_missing_file_loads_default() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        assert!(!store.exists().await);
        assert_eq!(store.load().await.unwrap(), TrackerState::default());
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);

        let mut state = state_with_total(321);
        state.record_ratio(27.5, 14);
        state.roll_day(NaiveDate::from_ymd_opt(2025, 7, 1).unwrap(), 12);
        store.save(&state).await.unwrap();

        assert!(store.exists().await);
        assert!(!store.temp_path().exists());
        let loaded = store.load().await.unwrap();
        assert_eq!(loaded, state);
    }

    #[tokio::test]
    async fn test_save_creates_backup_of_previous() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);

        store.save(&state_with_total(1)).await.unwrap();
        assert!(store.backups().await.unwrap().is_empty());

        store.save(&state_with_total(2)).await.unwrap();
        let backups = store.backups().await.unwrap();
        assert_eq!(backups.len(), 1);

        let text = std::fs::read_to_string(&backups[0]).unwrap();
        let backed_up: TrackerState = serde_json::from_str(&text).unwrap();
        assert_eq!(backed_up.total_lessons_completed, 1);
    }

    #[tokio::test]
    async fn test_prunes_old_backups() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);

        for total in 0..8 {
            store.save(&state_with_total(total)).await.unwrap();
        }
        let backups = store.backups().await.unwrap();
        assert_eq!(backups.len(), DEFAULT_KEEP_BACKUPS);

        // Newest backup holds the state before the last save.
        let text = std::fs::read_to_string(&backups[0]).unwrap();
        let newest: TrackerState = serde_json::from_str(&text).unwrap();
        assert_eq!(newest.total_lessons_completed, 6);
    }

    #[tokio::test]
    async fn test_recovers_from_backup_on_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);

        store.save(&state_with_total(10)).await.unwrap();
        store.save(&state_with_total(20)).await.unwrap();
        std::fs::write(store.path(), "{ not json").unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.total_lessons_completed, 10);
    }

    #[tokio::test]
    async fn test_corruption_without_backup_loads_default() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        std::fs::write(store.path(), "[1, 2, 3]").unwrap();

        assert_eq!(store.load().await.unwrap(), TrackerState::default());
    }

    #[tokio::test]
    async fn test_legacy_file_is_migrated_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        std::fs::write(
            store.path(),
            r#"{"total_lessons_completed": 77, "daily_lessons_completed": 4, "processed_units": ["Food"]}"#,
        )
        .unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.schema_version, crate::state::CURRENT_SCHEMA_VERSION);
        assert_eq!(loaded.total_lessons_completed, 77);
        assert!(loaded.processed_units.contains("Food"));
        assert_eq!(loaded.metadata.migration_history.len(), 1);
    }

    #[tokio::test]
    async fn test_newer_schema_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        std::fs::write(store.path(), r#"{"schema_version": "7.0"}"#).unwrap();

        assert!(matches!(store.load().await, Err(StorageError::Migration(_))));
    }
}
