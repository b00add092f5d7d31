use chrono::Utc;
use std::sync::atomic::{AtomicI64, Ordering};

/// Source of wall-clock time for provenance fields such as `lastModified`.
pub trait Clock: Send + Sync {
    fn now_unix_ms(&self) -> i64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_unix_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// A clock frozen at a settable instant.
#[derive(Debug, Default)]
pub struct FixedClock {
    now: AtomicI64,
}

impl FixedClock {
    pub fn new(now_unix_ms: i64) -> Self {
        Self {
            now: AtomicI64::new(now_unix_ms),
        }
    }

    pub fn set(&self, now_unix_ms: i64) {
        self.now.store(now_unix_ms, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now_unix_ms(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}
