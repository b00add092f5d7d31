//! Typed views of records at the current schema version.
//!
//! Stored records stay untyped so that every historical shape can be represented; these
//! views are for consumers that only deal with fully upgraded stores.

mod fields;

pub mod asset;
pub mod map;
pub mod state;
pub mod token;

pub use asset::{AssetRecord, UserEntry};
pub use map::{Grid, GridInset, MapRecord, Measurement, Point};
pub use state::{MapSessionState, TokenSessionEntry};
pub use token::{Outline, TokenTemplate};
