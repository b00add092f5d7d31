// ============================================================================
// Tabletop Store Library
// ============================================================================

pub mod core;
pub mod facade;
pub mod migration;
pub mod model;
pub mod services;
pub mod storage;
pub mod transaction;
pub mod transfer;

// Re-export main types for convenience
pub use core::{Record, Result, StoreError, Value};
pub use facade::{Location, StoreOptions, open_store, open_store_with_report};
pub use migration::{
    LATEST_VERSION, MigrationConfig, MigrationRegistry, MigrationServices, MigrationStep,
    Migrator, STABLE_VERSION, StepPolicy, UpgradeReport, default_registry,
};
pub use storage::{DurabilityMode, Store, TableDef, TableView};
pub use transaction::StepTransaction;
pub use transfer::{ExportSnapshot, ImportOptions, ImportReport, export, import, peek_header};
