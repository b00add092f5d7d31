use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

const SHORT_ID_LEN: usize = 10;

/// Generates record identifiers.
pub trait IdGenerator: Send + Sync {
    /// A globally unique id, used for new asset records.
    fn new_id(&self) -> String;

    /// A compact id for ids embedded inside records, such as shape ids.
    fn new_short_id(&self) -> String {
        self.new_id().replace('-', "").chars().take(SHORT_ID_LEN).collect()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn new_id(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

/// Deterministic ids (`<prefix>-1`, `<prefix>-2`, ...). Two runs that request ids in the
/// same order produce the same ids.
#[derive(Debug)]
pub struct SequentialIds {
    prefix: String,
    next: AtomicU64,
}

impl SequentialIds {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(1),
        }
    }
}

impl IdGenerator for SequentialIds {
    fn new_id(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::SeqCst);
        format!("{}-{}", self.prefix, n)
    }

    fn new_short_id(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::SeqCst);
        format!("s{}", n)
    }
}
