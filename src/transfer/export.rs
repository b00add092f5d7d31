use super::snapshot::{EXPORT_FORMAT_VERSION, ExportSnapshot, ExportTable};
use crate::core::{Record, Result};
use crate::migration::steps::{MAPS, STATES, TOKENS};
use crate::storage::Store;
use std::collections::BTreeSet;
use tracing::{Level, event};

/// Copies every record accepted by `filter(table, record)` into an export snapshot.
/// Tables with no accepted record are left out.
pub fn export<F>(store: &Store, filter: F) -> Result<ExportSnapshot>
where
    F: Fn(&str, &Record) -> bool,
{
    let mut tables = Vec::new();
    for name in store.table_names() {
        let mut records = Vec::new();
        store.table(&name)?.each(|_, record| {
            if filter(name.as_str(), record) {
                records.push(record.clone());
            }
        });
        if !records.is_empty() {
            tables.push(ExportTable { name, records });
        }
    }

    let snapshot = ExportSnapshot {
        format_version: EXPORT_FORMAT_VERSION,
        database_name: store.name().to_string(),
        schema_version: store.schema_version(),
        exported_at_unix_ms: store.clock().now_unix_ms(),
        tables,
    };
    event!(
        Level::INFO,
        store = %store.name(),
        records = snapshot.record_count(),
        "exported store"
    );
    Ok(snapshot)
}

/// The maps (with their session states) and tokens a user picked for export.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportSelection {
    pub maps: BTreeSet<String>,
    pub tokens: BTreeSet<String>,
}

impl ExportSelection {
    pub fn new<M, T>(maps: M, tokens: T) -> Self
    where
        M: IntoIterator,
        M::Item: Into<String>,
        T: IntoIterator,
        T::Item: Into<String>,
    {
        Self {
            maps: maps.into_iter().map(Into::into).collect(),
            tokens: tokens.into_iter().map(Into::into).collect(),
        }
    }

    /// Export filter: selected maps, their states, and selected tokens. Nothing else.
    pub fn includes(&self, table: &str, record: &Record) -> bool {
        let selected = |set: &BTreeSet<String>, field: &str| {
            record.key_text(field).is_some_and(|key| set.contains(&key))
        };
        match table {
            MAPS => selected(&self.maps, "id"),
            STATES => selected(&self.maps, "mapId"),
            TOKENS => selected(&self.tokens, "id"),
            _ => false,
        }
    }
}
