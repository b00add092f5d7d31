use super::options::{Location, StoreOptions};
use crate::core::Result;
use crate::migration::{Migrator, UpgradeReport, steps};
use crate::storage::Store;
use tracing::{Level, event};

/// Opens a store and upgrades it to the requested version.
pub async fn open_store(options: StoreOptions) -> Result<Store> {
    open_store_with_report(options).await.map(|(store, _)| store)
}

/// Like [`open_store`], also returning what the upgrade did.
///
/// A store already past the target version is returned unchanged.
pub async fn open_store_with_report(options: StoreOptions) -> Result<(Store, UpgradeReport)> {
    let registry = match options.registry {
        Some(registry) => registry,
        None => steps::shared_default_registry()?,
    };
    let target = options
        .target_version
        .unwrap_or_else(|| registry.stable_version());

    let clock = options.services.clock.clone();
    let mut store = match &options.location {
        Location::InMemory => Store::in_memory(options.name.as_str()).with_clock(clock),
        Location::Directory(dir) => {
            Store::open_at(dir, &options.name, options.durability, clock).await?
        }
    };

    let migrator = Migrator::new(registry)
        .with_config(options.migration)
        .with_services(options.services);

    let current = store.schema_version();
    if current > target {
        event!(
            Level::INFO,
            store = %store.name(),
            schema_version = current,
            target = target,
            "store is ahead of the requested version, leaving it untouched"
        );
        let report = UpgradeReport {
            store: store.name().to_string(),
            from: current,
            to: current,
            steps: Vec::new(),
        };
        return Ok((store, report));
    }

    let report = migrator.upgrade(&mut store, current, target).await?;
    Ok((store, report))
}
