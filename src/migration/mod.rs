//! Versioned upgrades: step definitions, the registry that orders them, and the executor
//! that applies them to a store one committed step at a time.

pub mod config;
pub mod context;
pub mod executor;
pub mod registry;
pub mod step;
pub mod steps;

pub use config::MigrationConfig;
pub use context::{MigrationServices, StepContext, USER_ID_KEY, USER_TABLE};
pub use executor::{Migrator, StepReport, UpgradeReport};
pub use registry::{MigrationRegistry, MigrationRegistryBuilder};
pub use step::{MigrationStep, SchemaDelta, StepPolicy, StepTransform};
pub use steps::{LATEST_VERSION, STABLE_VERSION, default_registry, ownership::gc};
