//! Entry points for consumers: options describing a store and `open_store`.

pub mod open;
pub mod options;

pub use open::{open_store, open_store_with_report};
pub use options::{DEFAULT_STORE_NAME, Location, StoreOptions};
