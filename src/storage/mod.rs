pub mod persistence;
pub mod store;
pub mod table;

pub use persistence::{DurabilityMode, SnapshotManager, StoreSnapshot};
pub use store::Store;
pub use table::{FILE_FIELDS, Table, TableDef, TableView};
