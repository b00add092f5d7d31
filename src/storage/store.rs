use super::persistence::{DurabilityMode, STORE_FORMAT_VERSION, SnapshotManager, StoreSnapshot};
use super::table::{Table, TableView};
use crate::core::{Result, StoreError};
use crate::services::{Clock, SystemClock};
use crate::transaction::StepTransaction;
use im::OrdMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{Level, event};

/// The whole local database: a name, a committed schema version and its tables.
///
/// All writes go through a [`StepTransaction`] that is committed as one unit. Taking
/// `&mut self` for commits keeps a store single-writer; sharing one store file between
/// processes is the caller's problem.
pub struct Store {
    name: String,
    schema_version: u32,
    committed_at_unix_ms: i64,
    tables: OrdMap<String, Table>,
    persistence: SnapshotManager,
    clock: Arc<dyn Clock>,
}

impl Store {
    /// A fresh, empty store at version 0 that never touches disk.
    pub fn in_memory(name: impl Into<String>) -> Self {
        let name = name.into();
        let persistence = SnapshotManager::new(format!("{}.mem", name), DurabilityMode::None);
        Self::empty(name, persistence, Arc::new(SystemClock))
    }

    /// Opens the store `name` under `data_dir`, loading its last committed snapshot.
    /// A store that was never written starts empty at version 0.
    pub async fn open_at<P: AsRef<Path>>(
        data_dir: P,
        name: &str,
        durability_mode: DurabilityMode,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let persistence = SnapshotManager::for_store(data_dir, name, durability_mode);
        if persistence.discard_incomplete().await? {
            event!(Level::WARN, store = %name, "discarded incomplete commit from a previous run");
        }

        match persistence.load().await? {
            Some(snapshot) => {
                if snapshot.name != name {
                    return Err(StoreError::Codec(format!(
                        "Snapshot at {} belongs to store '{}', not '{}'",
                        persistence.path().display(),
                        snapshot.name,
                        name
                    )));
                }
                event!(
                    Level::DEBUG,
                    store = %name,
                    schema_version = snapshot.schema_version,
                    "loaded committed snapshot"
                );
                Ok(Self {
                    name: snapshot.name,
                    schema_version: snapshot.schema_version,
                    committed_at_unix_ms: snapshot.committed_at_unix_ms,
                    tables: snapshot.tables,
                    persistence,
                    clock,
                })
            }
            None => Ok(Self::empty(name.to_string(), persistence, clock)),
        }
    }

    fn empty(name: String, persistence: SnapshotManager, clock: Arc<dyn Clock>) -> Self {
        Self {
            name,
            schema_version: 0,
            committed_at_unix_ms: 0,
            tables: OrdMap::new(),
            persistence,
            clock,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema_version(&self) -> u32 {
        self.schema_version
    }

    pub fn committed_at_unix_ms(&self) -> i64 {
        self.committed_at_unix_ms
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    pub fn persistence(&self) -> &SnapshotManager {
        &self.persistence
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    pub fn table_names(&self) -> Vec<String> {
        self.tables.keys().cloned().collect()
    }

    /// Read access to a committed table.
    pub fn table(&self, name: &str) -> Result<TableView<'_>> {
        self.tables
            .get(name)
            .map(TableView::new)
            .ok_or_else(|| StoreError::TableNotFound(name.to_string()))
    }

    /// The committed state as a serializable snapshot.
    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            format_version: STORE_FORMAT_VERSION,
            name: self.name.clone(),
            schema_version: self.schema_version,
            committed_at_unix_ms: self.committed_at_unix_ms,
            tables: self.tables.clone(),
        }
    }

    /// Starts a transaction that will commit at `version`.
    pub(crate) fn begin(&self, version: u32) -> StepTransaction {
        StepTransaction::new(version, self.tables.clone())
    }

    /// Publishes a transaction: the snapshot file is replaced first, and only once that
    /// succeeded does the in-memory state move. A failed save leaves both untouched.
    pub(crate) async fn commit(&mut self, tx: StepTransaction) -> Result<()> {
        let version = tx.version();
        if version < self.schema_version {
            return Err(StoreError::OrderingViolation {
                from: self.schema_version,
                to: version,
                current: self.schema_version,
            });
        }

        let committed_at_unix_ms = self.clock.now_unix_ms();
        let snapshot = StoreSnapshot {
            format_version: STORE_FORMAT_VERSION,
            name: self.name.clone(),
            schema_version: version,
            committed_at_unix_ms,
            tables: tx.into_tables(),
        };
        self.persistence.save(&snapshot).await?;

        self.tables = snapshot.tables;
        self.schema_version = version;
        self.committed_at_unix_ms = committed_at_unix_ms;
        Ok(())
    }

    /// Runs `op` against a transaction at the current schema version and commits it.
    /// If `op` fails nothing is written.
    pub async fn write<F, T>(&mut self, op: F) -> Result<T>
    where
        F: FnOnce(&mut StepTransaction) -> Result<T>,
    {
        let mut tx = self.begin(self.schema_version);
        let value = op(&mut tx)?;
        self.commit(tx).await?;
        Ok(value)
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("name", &self.name)
            .field("schema_version", &self.schema_version)
            .field("tables", &self.table_names())
            .field("path", &self.persistence.path())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Record;
    use crate::services::FixedClock;
    use crate::storage::TableDef;
    use serde_json::json;
    use tempfile::tempdir;

    #[tokio::test]
    async fn write_commits_and_failed_write_discards() {
        let mut store = Store::in_memory("TestDB");
        store
            .write(|tx| tx.create_table(TableDef::new("maps", "id")))
            .await
            .unwrap();

        let result: Result<()> = store
            .write(|tx| {
                tx.table_mut("maps")?
                    .add(Record::from_json(json!({"id": "m1"}))?)?;
                Err(StoreError::Codec("abort".to_string()))
            })
            .await;
        assert!(result.is_err());
        assert!(store.table("maps").unwrap().is_empty());
    }

    #[tokio::test]
    async fn reopen_sees_committed_state() {
        let dir = tempdir().unwrap();
        let clock = Arc::new(FixedClock::new(42));
        {
            let mut store = Store::open_at(dir.path(), "TestDB", DurabilityMode::Sync, clock.clone())
                .await
                .unwrap();
            let mut tx = store.begin(1);
            tx.create_table(TableDef::new("user", "key")).unwrap();
            store.commit(tx).await.unwrap();
        }

        let store = Store::open_at(dir.path(), "TestDB", DurabilityMode::Sync, clock)
            .await
            .unwrap();
        assert_eq!(store.schema_version(), 1);
        assert_eq!(store.committed_at_unix_ms(), 42);
        assert!(store.has_table("user"));
    }
}
