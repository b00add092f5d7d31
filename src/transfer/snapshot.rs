use crate::core::{Record, Result, StoreError};
use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const EXPORT_FORMAT_VERSION: u16 = 1;

/// Records of one table inside an export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportTable {
    pub name: String,
    pub records: Vec<Record>,
}

/// A portable copy of (part of) a store, tagged with the store name and schema version it
/// was taken from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportSnapshot {
    pub format_version: u16,
    pub database_name: String,
    pub schema_version: u32,
    pub exported_at_unix_ms: i64,
    pub tables: Vec<ExportTable>,
}

impl ExportSnapshot {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        rmp_serde::to_vec_named(self)
            .map_err(|e| StoreError::Codec(format!("Failed to encode export: {}", e)))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let snapshot: Self = rmp_serde::from_slice(bytes)
            .map_err(|e| StoreError::Codec(format!("Failed to decode export: {}", e)))?;
        check_format(snapshot.format_version)?;
        Ok(snapshot)
    }

    pub fn record_count(&self) -> usize {
        self.tables.iter().map(|table| table.records.len()).sum()
    }

    pub fn table(&self, name: &str) -> Option<&ExportTable> {
        self.tables.iter().find(|table| table.name == name)
    }
}

fn check_format(format_version: u16) -> Result<()> {
    if format_version != EXPORT_FORMAT_VERSION {
        return Err(StoreError::Codec(format!(
            "Unsupported export format version {}",
            format_version
        )));
    }
    Ok(())
}

/// What an export contains, without its records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportHeader {
    pub database_name: String,
    pub schema_version: u32,
    pub exported_at_unix_ms: i64,
    pub table_counts: BTreeMap<String, usize>,
}

#[derive(Deserialize)]
struct HeaderTable {
    name: String,
    records: Vec<IgnoredAny>,
}

#[derive(Deserialize)]
struct HeaderView {
    format_version: u16,
    database_name: String,
    schema_version: u32,
    exported_at_unix_ms: i64,
    tables: Vec<HeaderTable>,
}

/// Reads the header of an encoded export. Records are skipped, not decoded.
pub fn peek_header(bytes: &[u8]) -> Result<ExportHeader> {
    let view: HeaderView = rmp_serde::from_slice(bytes)
        .map_err(|e| StoreError::Codec(format!("Failed to read export header: {}", e)))?;
    check_format(view.format_version)?;
    Ok(ExportHeader {
        database_name: view.database_name,
        schema_version: view.schema_version,
        exported_at_unix_ms: view.exported_at_unix_ms,
        table_counts: view
            .tables
            .into_iter()
            .map(|table| (table.name, table.records.len()))
            .collect(),
    })
}

/// Encodes a record list for handing to another thread or process.
pub fn pack_records(records: &[Record]) -> Result<Vec<u8>> {
    rmp_serde::to_vec_named(records)
        .map_err(|e| StoreError::Codec(format!("Failed to pack records: {}", e)))
}

pub fn unpack_records(bytes: &[u8]) -> Result<Vec<Record>> {
    rmp_serde::from_slice(bytes)
        .map_err(|e| StoreError::Codec(format!("Failed to unpack records: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> ExportSnapshot {
        ExportSnapshot {
            format_version: EXPORT_FORMAT_VERSION,
            database_name: "TabletopStore".to_string(),
            schema_version: 29,
            exported_at_unix_ms: 99,
            tables: vec![
                ExportTable {
                    name: "maps".to_string(),
                    records: vec![
                        Record::new().with("id", "m1").with("file", vec![1u8, 2, 3]),
                        Record::new().with("id", "m2"),
                    ],
                },
                ExportTable {
                    name: "tokens".to_string(),
                    records: vec![Record::new().with("id", "t1")],
                },
            ],
        }
    }

    #[test]
    fn header_counts_records_without_decoding_them() {
        let bytes = snapshot().to_bytes().unwrap();
        let header = peek_header(&bytes).unwrap();
        assert_eq!(header.database_name, "TabletopStore");
        assert_eq!(header.schema_version, 29);
        assert_eq!(header.table_counts["maps"], 2);
        assert_eq!(header.table_counts["tokens"], 1);

        let decoded = ExportSnapshot::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, snapshot());
        assert_eq!(decoded.record_count(), 3);
    }

    #[test]
    fn rejects_unknown_format_and_garbage() {
        let mut future = snapshot();
        future.format_version = 9;
        let bytes = future.to_bytes().unwrap();
        assert!(matches!(ExportSnapshot::from_bytes(&bytes), Err(StoreError::Codec(_))));
        assert!(peek_header(&[0xc1, 0x00]).is_err());
    }

    #[test]
    fn packed_records_keep_binary_payloads() {
        let records = snapshot().tables.remove(0).records;
        let packed = pack_records(&records).unwrap();
        let unpacked = unpack_records(&packed).unwrap();
        assert_eq!(unpacked[0].get("file").and_then(|v| v.as_bytes()), Some(&[1u8, 2, 3][..]));
    }
}
