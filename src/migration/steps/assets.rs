//! Moves embedded binary payloads out of maps and tokens into a shared `assets` table.
//!
//! Steps 23 and 24 copy payloads out and tag each asset with where it came from. Step 25
//! points the owners at the new assets, step 26 drops the tags, and step 27 regroups the
//! per-resolution references.

use super::{ASSETS, MAPS, TOKENS, shape_error};
use crate::core::{Record, Result, Value};
use crate::migration::context::StepContext;
use crate::migration::step::MigrationStep;
use crate::storage::TableDef;
use crate::transaction::StepTransaction;
use std::collections::BTreeMap;

pub const ORIGIN_ID: &str = "originId";
pub const ORIGIN_KIND: &str = "originKind";
pub const ORIGIN_SLOT: &str = "originSlot";
/// Fields that only exist on assets between extraction and cleanup.
pub const LINKAGE_FIELDS: [&str; 3] = [ORIGIN_ID, ORIGIN_KIND, ORIGIN_SLOT];

pub const RESOLUTION_NAMES: [&str; 4] = ["low", "medium", "high", "ultra"];

/// Which slot of which owner an extracted asset came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OriginKind {
    Map,
    MapResolution,
    MapThumbnail,
    Token,
    TokenThumbnail,
}

impl OriginKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Map => "map",
            Self::MapResolution => "mapResolution",
            Self::MapThumbnail => "mapThumbnail",
            Self::Token => "token",
            Self::TokenThumbnail => "tokenThumbnail",
        }
    }

    pub fn parse(kind: &str) -> Option<Self> {
        match kind {
            "map" => Some(Self::Map),
            "mapResolution" => Some(Self::MapResolution),
            "mapThumbnail" => Some(Self::MapThumbnail),
            "token" => Some(Self::Token),
            "tokenThumbnail" => Some(Self::TokenThumbnail),
            _ => None,
        }
    }

    fn owner_table(self) -> &'static str {
        match self {
            Self::Map | Self::MapResolution | Self::MapThumbnail => MAPS,
            Self::Token | Self::TokenThumbnail => TOKENS,
        }
    }
}

pub fn steps_23_to_27() -> Vec<MigrationStep> {
    vec![
        MigrationStep::new(23, "extract map payloads into assets")
            .create_table(TableDef::new(ASSETS, "id").with_index("owner"))
            .with_transform(extract_map_assets),
        MigrationStep::new(24, "extract token payloads into assets")
            .with_transform(extract_token_assets),
        MigrationStep::new(25, "point maps and tokens at their assets")
            .with_transform(rewire_owners),
        MigrationStep::new(26, "drop asset extraction linkage").with_transform(strip_linkage),
        MigrationStep::new(27, "group map resolution assets").with_transform(regroup_resolutions),
    ]
}

/// Builds one asset from a `{file, width, height}` slot. Returns `None` for an empty slot.
fn asset_from_slot(
    ctx: &StepContext,
    owner: &Record,
    owner_id: &str,
    kind: OriginKind,
    slot: Option<&str>,
    source: &BTreeMap<String, Value>,
) -> Option<Record> {
    let file = source.get("file").filter(|file| !file.is_null())?;
    let field = |name: &str| source.get(name).cloned().unwrap_or_default();

    let mut asset = Record::new()
        .with("id", ctx.new_id())
        .with("file", file.clone())
        .with("width", field("width"))
        .with("height", field("height"))
        .with("mime", "")
        .with("owner", owner.get("owner").cloned().unwrap_or_default())
        .with(ORIGIN_ID, owner_id)
        .with(ORIGIN_KIND, kind.as_str());
    if let Some(slot) = slot {
        asset.set(ORIGIN_SLOT, slot);
    }
    Some(asset)
}

/// The record's own `file`/`width`/`height` as a slot.
fn own_slot(record: &Record) -> BTreeMap<String, Value> {
    ["file", "width", "height"]
        .into_iter()
        .filter_map(|name| record.get(name).map(|value| (name.to_string(), value.clone())))
        .collect()
}

fn nested_slot<'r>(record: &'r Record, field: &str) -> Option<&'r BTreeMap<String, Value>> {
    record.get(field).and_then(Value::as_map)
}

fn extract_map_assets(tx: &mut StepTransaction, ctx: &StepContext) -> Result<()> {
    let mut extracted = Vec::new();
    for (id, map) in tx.table(MAPS)?.iter() {
        extracted.extend(asset_from_slot(ctx, map, id, OriginKind::Map, None, &own_slot(map)));
        if let Some(resolutions) = nested_slot(map, "resolutions") {
            for (name, resolution) in resolutions {
                let slot = resolution
                    .as_map()
                    .ok_or_else(|| shape_error(format!("map '{}' resolution '{}' is not a map", id, name)))?;
                extracted.extend(asset_from_slot(
                    ctx,
                    map,
                    id,
                    OriginKind::MapResolution,
                    Some(name),
                    slot,
                ));
            }
        }
        if let Some(thumbnail) = nested_slot(map, "thumbnail") {
            extracted.extend(asset_from_slot(ctx, map, id, OriginKind::MapThumbnail, None, thumbnail));
        }
    }
    tx.table_mut(ASSETS)?.bulk_add(extracted)?;
    Ok(())
}

fn extract_token_assets(tx: &mut StepTransaction, ctx: &StepContext) -> Result<()> {
    let mut extracted = Vec::new();
    for (id, token) in tx.table(TOKENS)?.iter() {
        extracted.extend(asset_from_slot(ctx, token, id, OriginKind::Token, None, &own_slot(token)));
        if let Some(thumbnail) = nested_slot(token, "thumbnail") {
            extracted.extend(asset_from_slot(
                ctx,
                token,
                id,
                OriginKind::TokenThumbnail,
                None,
                thumbnail,
            ));
        }
    }
    tx.table_mut(ASSETS)?.bulk_add(extracted)?;
    Ok(())
}

fn rewire_owners(tx: &mut StepTransaction, ctx: &StepContext) -> Result<()> {
    let assets: Vec<Record> = tx.records(ASSETS)?;
    for asset in assets {
        let asset_id = asset
            .get_str("id")
            .ok_or_else(|| shape_error("asset has no id"))?
            .to_string();
        let kind_text = asset.get_str(ORIGIN_KIND).unwrap_or_default();
        let kind = OriginKind::parse(kind_text).ok_or_else(|| {
            shape_error(format!("asset '{}' has unknown origin kind '{}'", asset_id, kind_text))
        })?;
        let owner_id = asset
            .get_str(ORIGIN_ID)
            .ok_or_else(|| shape_error(format!("asset '{}' has no origin id", asset_id)))?;
        let slot = asset.get_str(ORIGIN_SLOT);

        let table = kind.owner_table();
        let found = tx.table_mut(table)?.modify_one(owner_id, |owner| {
            match kind {
                OriginKind::Map | OriginKind::Token => {
                    owner.set("file", asset_id.as_str());
                }
                OriginKind::MapThumbnail | OriginKind::TokenThumbnail => {
                    owner.set("thumbnail", asset_id.as_str());
                }
                OriginKind::MapResolution => {
                    let slot = slot.ok_or_else(|| {
                        shape_error(format!("resolution asset '{}' has no slot", asset_id))
                    })?;
                    owner.remove("resolutions");
                    owner.set(slot, asset_id.as_str());
                }
            }
            Ok(())
        })?;
        if !found {
            ctx.note_referential_gap(table, owner_id, &asset_id);
        }
    }
    Ok(())
}

fn strip_linkage(tx: &mut StepTransaction, _ctx: &StepContext) -> Result<()> {
    tx.table_mut(ASSETS)?.modify_all(|_, asset| {
        for field in LINKAGE_FIELDS {
            asset.remove(field);
        }
        Ok(())
    })?;
    Ok(())
}

fn regroup_resolutions(tx: &mut StepTransaction, _ctx: &StepContext) -> Result<()> {
    tx.table_mut(MAPS)?.modify_all(|_, map| {
        let mut resolutions = BTreeMap::new();
        for name in RESOLUTION_NAMES {
            if let Some(asset_id) = map.remove(name) {
                resolutions.insert(name.to_string(), asset_id);
            }
        }
        map.set("resolutions", resolutions);
        map.remove("lastUsed");
        Ok(())
    })?;
    Ok(())
}
