//! Bulk movement of records in and out of a store.

pub mod export;
pub mod import;
pub mod snapshot;

pub use export::{ExportSelection, export};
pub use import::{ImportOptions, ImportProgress, ImportReport, TableImport, import, is_importable};
pub use snapshot::{
    EXPORT_FORMAT_VERSION, ExportHeader, ExportSnapshot, ExportTable, pack_records, peek_header,
    unpack_records,
};
