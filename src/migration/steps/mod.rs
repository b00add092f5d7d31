//! The concrete upgrade history of the tabletop store.
//!
//! Every step is written against the exact record shapes left by the step before it.

pub mod assets;
pub mod layout;
pub mod legacy;
pub mod ownership;
pub mod previews;
pub mod tokens;

use super::registry::MigrationRegistry;
use crate::core::{Record, Result, StoreError, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

pub const MAPS: &str = "maps";
pub const STATES: &str = "states";
pub const TOKENS: &str = "tokens";
pub const ASSETS: &str = "assets";

/// Version new stores are upgraded to unless the caller asks for more.
pub const STABLE_VERSION: u32 = 29;
/// Highest version in the default registry.
pub const LATEST_VERSION: u32 = 31;

/// Builds the full registry of steps `1..=31`.
pub fn default_registry() -> Result<MigrationRegistry> {
    let mut builder = MigrationRegistry::builder();
    for step in legacy::steps_1_to_12()
        .into_iter()
        .chain([layout::step_13(), legacy::step_14(), previews::step_15()])
        .chain([legacy::step_16(), layout::step_17(), layout::step_18()])
        .chain([previews::step_19(), previews::step_20(), legacy::step_21()])
        .chain([layout::step_22()])
        .chain(assets::steps_23_to_27())
        .chain(tokens::steps_28_to_29())
        .chain(ownership::steps_30_to_31())
    {
        builder.add_step(step)?;
    }
    builder.stable_version(STABLE_VERSION).build()
}

/// The default registry, shared.
pub fn shared_default_registry() -> Result<Arc<MigrationRegistry>> {
    default_registry().map(Arc::new)
}

pub(crate) fn shape_error(what: impl std::fmt::Display) -> StoreError {
    StoreError::TypeMismatch(what.to_string())
}

/// Visits every token entry of a session state.
pub(crate) fn for_each_token_entry<F>(state: &mut Record, mut visit: F) -> Result<()>
where
    F: FnMut(&mut BTreeMap<String, Value>) -> Result<()>,
{
    let Some(tokens) = state.get_map_mut("tokens") else {
        return Ok(());
    };
    for (id, entry) in tokens.iter_mut() {
        let entry = entry
            .as_map_mut()
            .ok_or_else(|| shape_error(format!("token entry '{}' is not a map", id)))?;
        visit(entry)?;
    }
    Ok(())
}
