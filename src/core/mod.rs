pub mod error;
pub mod record;
pub mod value;

pub use error::{Result, StoreError};
pub use record::Record;
pub use value::Value;
