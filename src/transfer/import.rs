use super::snapshot::ExportSnapshot;
use crate::core::{Record, Result, StoreError};
use crate::migration::steps::{MAPS, STATES, TOKENS};
use crate::storage::Store;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{Level, event};

/// Called after each imported table with `(table, records_done, records_total)`.
pub type ImportProgress = Arc<dyn Fn(&str, usize, usize) + Send + Sync>;

#[derive(Clone, Default)]
pub struct ImportOptions {
    /// Restricts the import to these tables. `None` imports every table in the snapshot.
    pub tables: Option<BTreeSet<String>>,
    pub progress: Option<ImportProgress>,
}

impl ImportOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn only_tables<I, S>(mut self, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tables = Some(tables.into_iter().map(Into::into).collect());
        self
    }

    pub fn on_progress(mut self, progress: ImportProgress) -> Self {
        self.progress = Some(progress);
        self
    }
}

impl std::fmt::Debug for ImportOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImportOptions")
            .field("tables", &self.tables)
            .field("has_progress", &self.progress.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableImport {
    pub imported: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportReport {
    pub tables: BTreeMap<String, TableImport>,
}

impl ImportReport {
    pub fn imported(&self) -> usize {
        self.tables.values().map(|table| table.imported).sum()
    }

    pub fn skipped(&self) -> usize {
        self.tables.values().map(|table| table.skipped).sum()
    }
}

/// Whether an incoming record has the fields its table is keyed and filtered by.
pub fn is_importable(table: &str, record: &Record) -> bool {
    match table {
        MAPS | TOKENS => record.contains("id") && record.contains("owner"),
        STATES => record.contains("mapId"),
        _ => true,
    }
}

/// Writes the records of `snapshot` into `store`, replacing records with the same key.
///
/// The snapshot must come from a store with the same name and schema version. Malformed
/// records are skipped and counted. All accepted records land in one atomic write.
pub async fn import(
    store: &mut Store,
    snapshot: &ExportSnapshot,
    options: ImportOptions,
) -> Result<ImportReport> {
    if snapshot.database_name != store.name() {
        return Err(StoreError::ImportNameMismatch {
            expected: store.name().to_string(),
            found: snapshot.database_name.clone(),
        });
    }
    if snapshot.schema_version != store.schema_version() {
        return Err(StoreError::ImportVersionMismatch {
            expected: store.schema_version(),
            found: snapshot.schema_version,
        });
    }

    let report = store
        .write(|tx| {
            let mut report = ImportReport::default();
            for incoming in &snapshot.tables {
                let wanted = options
                    .tables
                    .as_ref()
                    .is_none_or(|tables| tables.contains(&incoming.name));
                if !wanted {
                    continue;
                }
                let counts = report.tables.entry(incoming.name.clone()).or_default();
                let total = incoming.records.len();
                if !tx.has_table(&incoming.name) {
                    event!(
                        Level::WARN,
                        table = %incoming.name,
                        records = total,
                        "skipping records for a table this store does not have"
                    );
                    counts.skipped += total;
                    continue;
                }

                let table = tx.table_mut(&incoming.name)?;
                for record in &incoming.records {
                    let accepted = is_importable(&incoming.name, record)
                        && table.put(record.clone()).is_ok();
                    if accepted {
                        counts.imported += 1;
                    } else {
                        counts.skipped += 1;
                    }
                }
                if let Some(progress) = &options.progress {
                    progress(&incoming.name, total, total);
                }
            }
            Ok(report)
        })
        .await?;

    event!(
        Level::INFO,
        store = %store.name(),
        imported = report.imported(),
        skipped = report.skipped(),
        "import complete"
    );
    Ok(report)
}
