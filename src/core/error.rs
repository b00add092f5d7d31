use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Ordering violation: cannot upgrade from {from} to {to} (store is at version {current})")]
    OrderingViolation { from: u32, to: u32, current: u32 },

    #[error("Unknown version {requested} (latest registered step is {latest})")]
    UnknownVersion { requested: u32, latest: u32 },

    #[error("Migration step {version} failed: {reason}")]
    StepTransformFailure { version: u32, reason: String },

    #[error("Step {version} could not enhance record '{key}': {reason}")]
    RecordEnhancementFailure {
        version: u32,
        key: String,
        reason: String,
    },

    #[error("Unable to import database, name mismatch (expected '{expected}', found '{found}')")]
    ImportNameMismatch { expected: String, found: String },

    #[error("Unable to import database, schema version mismatch (expected {expected}, found {found})")]
    ImportVersionMismatch { expected: u32, found: u32 },

    #[error("Table '{0}' already exists")]
    TableExists(String),

    #[error("Table '{0}' not found")]
    TableNotFound(String),

    #[error("Record '{key}' not found in table '{table}'")]
    RecordNotFound { table: String, key: String },

    #[error("Record '{key}' already exists in table '{table}'")]
    DuplicateKey { table: String, key: String },

    #[error("Record has no usable key field '{field}' for table '{table}'")]
    MissingKey { table: String, field: String },

    #[error("Field '{field}' is not indexed on table '{table}'")]
    UnindexedField { table: String, field: String },

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Local identity record is missing from the user table")]
    MissingLocalIdentity,

    #[error("Invalid migration registry: {0}")]
    InvalidRegistry(String),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Lock error: {0}")]
    LockError(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl StoreError {
    /// Wraps any error raised inside a step's transform so it carries the step version.
    ///
    /// Errors that already name a step pass through unchanged.
    pub fn in_step(self, version: u32) -> Self {
        match self {
            err @ Self::StepTransformFailure { .. } => err,
            Self::RecordEnhancementFailure { version, key, reason } => {
                Self::StepTransformFailure {
                    version,
                    reason: format!("record '{}': {}", key, reason),
                }
            }
            other => Self::StepTransformFailure {
                version,
                reason: other.to_string(),
            },
        }
    }
}

impl<T> From<std::sync::PoisonError<T>> for StoreError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_step_wraps_infrastructure_errors() {
        let err = StoreError::TableNotFound("maps".to_string()).in_step(7);
        match err {
            StoreError::StepTransformFailure { version, reason } => {
                assert_eq!(version, 7);
                assert!(reason.contains("maps"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn in_step_keeps_existing_step_failures() {
        let err = StoreError::StepTransformFailure {
            version: 3,
            reason: "boom".to_string(),
        }
        .in_step(9);
        assert!(matches!(err, StoreError::StepTransformFailure { version: 3, .. }));
    }
}
