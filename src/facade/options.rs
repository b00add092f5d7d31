use crate::migration::{MigrationConfig, MigrationRegistry, MigrationServices};
use crate::services::{Clock, IdGenerator, ImageProbe, PreviewSynthesizer};
use crate::storage::DurabilityMode;
use std::path::PathBuf;
use std::sync::Arc;

pub const DEFAULT_STORE_NAME: &str = "TabletopStore";

/// Where a store keeps its committed snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    /// Nothing is written; the store lives as long as the process.
    InMemory,
    /// `<dir>/<name>.store`
    Directory(PathBuf),
}

/// How to open a store and how far to upgrade it.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub name: String,
    pub location: Location,
    pub durability: DurabilityMode,
    /// Version to upgrade to. `None` means the registry's stable version.
    pub target_version: Option<u32>,
    pub migration: MigrationConfig,
    pub services: MigrationServices,
    pub registry: Option<Arc<MigrationRegistry>>,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            name: DEFAULT_STORE_NAME.to_string(),
            location: Location::InMemory,
            durability: DurabilityMode::Sync,
            target_version: None,
            migration: MigrationConfig::default(),
            services: MigrationServices::default(),
            registry: None,
        }
    }
}

impl StoreOptions {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn in_memory(mut self) -> Self {
        self.location = Location::InMemory;
        self
    }

    pub fn directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.location = Location::Directory(dir.into());
        self
    }

    pub fn durability(mut self, mode: DurabilityMode) -> Self {
        self.durability = mode;
        self
    }

    pub fn target_version(mut self, version: u32) -> Self {
        self.target_version = Some(version);
        self
    }

    pub fn migration_config(mut self, config: MigrationConfig) -> Self {
        self.migration = config;
        self
    }

    pub fn services(mut self, services: MigrationServices) -> Self {
        self.services = services;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.services = self.services.with_clock(clock);
        self
    }

    pub fn ids(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.services = self.services.with_ids(ids);
        self
    }

    pub fn probe(mut self, probe: Arc<dyn ImageProbe>) -> Self {
        self.services = self.services.with_probe(probe);
        self
    }

    pub fn synthesizer(mut self, synthesizer: Arc<dyn PreviewSynthesizer>) -> Self {
        self.services = self.services.with_synthesizer(synthesizer);
        self
    }

    pub fn registry(mut self, registry: Arc<MigrationRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }
}
