use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tuning for the bounded asynchronous sub-work a step may perform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Upper bound for measuring one image, in milliseconds.
    pub probe_timeout_ms: u64,
    /// Upper bound for synthesizing one preview, in milliseconds.
    pub preview_timeout_ms: u64,
    /// How many per-record operations a step may run at once.
    pub max_concurrency: usize,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            probe_timeout_ms: 60_000,
            preview_timeout_ms: 10 * 60_000,
            max_concurrency: 4,
        }
    }
}

impl MigrationConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn preview_timeout(mut self, timeout: Duration) -> Self {
        self.preview_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max;
        self
    }

    pub fn probe_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms.max(1))
    }

    pub fn preview_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.preview_timeout_ms.max(1))
    }

    /// Concurrency actually used; zero is treated as one.
    pub fn effective_concurrency(&self) -> usize {
        self.max_concurrency.max(1)
    }
}
