//! Snapshot persistence for a store: one MessagePack file per store, replaced atomically
//! on every commit.

use super::table::Table;
use crate::core::{Result, StoreError};
use im::OrdMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

pub const STORE_FORMAT_VERSION: u16 = 1;
pub const STORE_FILE_EXTENSION: &str = "store";

// ============================================================================
// Store Snapshot
// ============================================================================

/// Everything persisted for a store at one committed schema version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub format_version: u16,
    pub name: String,
    pub schema_version: u32,
    pub committed_at_unix_ms: i64,
    pub tables: OrdMap<String, Table>,
}

impl StoreSnapshot {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        rmp_serde::to_vec_named(self)
            .map_err(|e| StoreError::Codec(format!("Failed to serialize snapshot: {}", e)))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let snapshot: Self = rmp_serde::from_slice(bytes)
            .map_err(|e| StoreError::Codec(format!("Failed to deserialize snapshot: {}", e)))?;
        if snapshot.format_version != STORE_FORMAT_VERSION {
            return Err(StoreError::Codec(format!(
                "Unsupported store format version {}",
                snapshot.format_version
            )));
        }
        Ok(snapshot)
    }
}

// ============================================================================
// Durability Configuration
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DurabilityMode {
    /// Snapshot files are fsynced before the rename that publishes them.
    #[default]
    Sync,
    /// Snapshot files are written and renamed without an fsync.
    Async,
    /// Nothing touches disk; the store lives in memory only.
    None,
}

// ============================================================================
// Snapshot Manager
// ============================================================================

pub struct SnapshotManager {
    snapshot_path: PathBuf,
    durability_mode: DurabilityMode,
}

impl SnapshotManager {
    pub fn new<P: AsRef<Path>>(snapshot_path: P, durability_mode: DurabilityMode) -> Self {
        Self {
            snapshot_path: snapshot_path.as_ref().to_path_buf(),
            durability_mode,
        }
    }

    /// Builds the manager for store `name` inside `data_dir`.
    pub fn for_store<P: AsRef<Path>>(data_dir: P, name: &str, durability_mode: DurabilityMode) -> Self {
        let file_name = format!("{}.{}", name, STORE_FILE_EXTENSION);
        Self::new(data_dir.as_ref().join(file_name), durability_mode)
    }

    pub fn path(&self) -> &Path {
        &self.snapshot_path
    }

    pub fn durability_mode(&self) -> DurabilityMode {
        self.durability_mode
    }

    fn temp_path(&self) -> PathBuf {
        self.snapshot_path.with_extension(format!("{}.tmp", STORE_FILE_EXTENSION))
    }

    /// Writes the snapshot to a temporary file and renames it over the live file, so a
    /// reader only ever sees a complete previous or complete new snapshot.
    pub async fn save(&self, snapshot: &StoreSnapshot) -> Result<()> {
        if self.durability_mode == DurabilityMode::None {
            return Ok(());
        }
        if let Some(parent) = self.snapshot_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::Io(format!("Failed to create store directory: {}", e)))?;
        }

        let bytes = snapshot.to_bytes()?;
        let temp_path = self.temp_path();
        let mut file = fs::File::create(&temp_path)
            .await
            .map_err(|e| StoreError::Io(format!("Failed to create temp file: {}", e)))?;
        file.write_all(&bytes)
            .await
            .map_err(|e| StoreError::Io(format!("Failed to write snapshot: {}", e)))?;
        file.flush()
            .await
            .map_err(|e| StoreError::Io(format!("Failed to flush snapshot: {}", e)))?;
        if self.durability_mode == DurabilityMode::Sync {
            file.sync_all()
                .await
                .map_err(|e| StoreError::Io(format!("Failed to sync snapshot: {}", e)))?;
        }
        drop(file);

        fs::rename(&temp_path, &self.snapshot_path)
            .await
            .map_err(|e| StoreError::Io(format!("Failed to rename snapshot: {}", e)))?;
        Ok(())
    }

    pub async fn load(&self) -> Result<Option<StoreSnapshot>> {
        if self.durability_mode == DurabilityMode::None || !self.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&self.snapshot_path)
            .await
            .map_err(|e| StoreError::Io(format!("Failed to read snapshot: {}", e)))?;
        StoreSnapshot::from_bytes(&bytes).map(Some)
    }

    /// Reads the raw bytes of the committed snapshot, if any.
    pub async fn load_bytes(&self) -> Result<Option<Vec<u8>>> {
        if !self.exists() {
            return Ok(None);
        }
        fs::read(&self.snapshot_path)
            .await
            .map(Some)
            .map_err(|e| StoreError::Io(format!("Failed to read snapshot: {}", e)))
    }

    /// Removes a temp file left behind by a commit that never reached its rename.
    pub async fn discard_incomplete(&self) -> Result<bool> {
        let temp_path = self.temp_path();
        if !temp_path.exists() {
            return Ok(false);
        }
        fs::remove_file(&temp_path)
            .await
            .map_err(|e| StoreError::Io(format!("Failed to remove stale temp file: {}", e)))?;
        Ok(true)
    }

    pub fn exists(&self) -> bool {
        self.snapshot_path.exists()
    }

    pub async fn delete(&self) -> Result<()> {
        if self.exists() {
            fs::remove_file(&self.snapshot_path)
                .await
                .map_err(|e| StoreError::Io(format!("Failed to delete snapshot: {}", e)))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Record;
    use crate::storage::table::TableDef;
    use serde_json::json;
    use tempfile::TempDir;

    fn sample_snapshot() -> StoreSnapshot {
        let mut maps = Table::new(TableDef::new("maps", "id").with_index("owner"));
        maps.add(Record::from_json(json!({"id": "m1", "owner": "u1"})).unwrap())
            .unwrap();
        let mut tables = OrdMap::new();
        tables.insert("maps".to_string(), maps);
        StoreSnapshot {
            format_version: STORE_FORMAT_VERSION,
            name: "TestDB".to_string(),
            schema_version: 4,
            committed_at_unix_ms: 1_000,
            tables,
        }
    }

    #[tokio::test]
    async fn test_snapshot_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let manager = SnapshotManager::for_store(temp_dir.path(), "TestDB", DurabilityMode::Sync);
        let snapshot = sample_snapshot();
        manager.save(&snapshot).await.unwrap();
        assert!(manager.exists());
        let loaded = manager.load().await.unwrap().unwrap();
        assert_eq!(loaded, snapshot);
    }

    #[tokio::test]
    async fn test_in_memory_mode_never_writes() {
        let temp_dir = TempDir::new().unwrap();
        let manager = SnapshotManager::for_store(temp_dir.path(), "TestDB", DurabilityMode::None);
        manager.save(&sample_snapshot()).await.unwrap();
        assert!(!manager.exists());
        assert!(manager.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stale_temp_file_is_discarded() {
        let temp_dir = TempDir::new().unwrap();
        let manager = SnapshotManager::for_store(temp_dir.path(), "TestDB", DurabilityMode::Sync);
        tokio::fs::write(manager.temp_path(), b"partial").await.unwrap();
        assert!(manager.discard_incomplete().await.unwrap());
        assert!(!manager.discard_incomplete().await.unwrap());
    }
}
