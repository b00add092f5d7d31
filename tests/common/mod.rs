#![allow(dead_code)]

use image::{DynamicImage, ImageFormat, RgbaImage};
use serde_json::json;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use tabletop_store::migration::{MigrationServices, USER_ID_KEY, USER_TABLE};
use tabletop_store::services::{FixedClock, RasterMedia, SequentialIds};
use tabletop_store::{
    DurabilityMode, Migrator, Record, Result, StepTransaction, Store, StoreOptions, Value,
    default_registry, open_store,
};

pub const STORE: &str = "TabletopStore";
pub const LOCAL_USER: &str = "me";
pub const NOW: i64 = 1_700_000_000_000;

pub fn png(width: u32, height: u32) -> Vec<u8> {
    let mut bytes = Vec::new();
    DynamicImage::ImageRgba8(RgbaImage::new(width, height))
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

/// Deterministic collaborators with real image decoding.
pub fn services() -> MigrationServices {
    let media = Arc::new(RasterMedia::new());
    MigrationServices::default()
        .with_clock(Arc::new(FixedClock::new(NOW)))
        .with_ids(Arc::new(SequentialIds::new("asset")))
        .with_probe(media.clone())
        .with_synthesizer(media)
}

pub fn options(dir: &Path) -> StoreOptions {
    StoreOptions::new(STORE)
        .directory(dir)
        .durability(DurabilityMode::Sync)
        .services(services())
}

pub fn migrator(services: MigrationServices) -> Migrator {
    Migrator::new(Arc::new(default_registry().unwrap())).with_services(services)
}

/// A map as first written, before any upgrade.
pub fn legacy_map(id: &str, owner: &str, file: Value, width: i64, height: i64) -> Record {
    Record::from_json(json!({
        "id": id,
        "name": format!("Map {}", id),
        "owner": owner,
        "width": width,
        "height": height,
        "gridX": 10,
        "gridY": 10,
        "gridType": "grid",
        "created": 1,
        "lastModified": 2
    }))
    .unwrap()
    .with("file", file)
}

pub fn legacy_token(id: &str, owner: &str, file: Vec<u8>, is_vehicle: bool) -> Record {
    Record::from_json(json!({
        "id": id,
        "name": format!("Token {}", id),
        "owner": owner,
        "isVehicle": is_vehicle,
        "created": 1,
        "lastModified": 3
    }))
    .unwrap()
    .with("file", file)
}

/// A session state with one token entry per `(entry id, token id)` pair and a small fog
/// history.
pub fn legacy_state(map_id: &str, entries: &[(&str, &str)]) -> Record {
    let tokens: serde_json::Map<String, serde_json::Value> = entries
        .iter()
        .map(|(entry, token)| {
            (
                entry.to_string(),
                json!({"id": entry, "tokenId": token, "x": 0.5, "y": 0.5, "size": 1}),
            )
        })
        .collect();
    Record::from_json(json!({
        "mapId": map_id,
        "tokens": tokens,
        "mapDrawActions": [
            {"type": "add", "shapes": [{"id": "d1", "data": {"points": [0, 0, 1, 1]}}]}
        ],
        "mapDrawActionIndex": 0,
        "fogDrawActions": [
            {"type": "add", "shapes": [
                {"id": "f1", "visible": true, "data": {"points": [0, 0, 1, 1]}},
                {"id": "f2", "visible": true, "data": {"points": [2, 2, 3, 3]}}
            ]},
            {"type": "edit", "shapes": [{"id": "f2", "visible": false, "data": {"points": []}}]}
        ],
        "fogDrawActionIndex": 1,
        "editFlags": ["drawing", "tokens"]
    }))
    .unwrap()
}

pub fn identity(user_id: &str) -> Record {
    Record::new().with("key", USER_ID_KEY).with("value", user_id)
}

/// Puts `records` into `table` inside a write.
pub fn insert(tx: &mut StepTransaction, table: &str, records: Vec<Record>) -> Result<()> {
    tx.table_mut(table)?.bulk_add(records)?;
    Ok(())
}

/// Opens a store under `dir` at version 1 and seeds it with the local identity plus
/// whatever `seed` writes.
pub async fn seeded_store<F>(dir: &Path, seed: F) -> Store
where
    F: FnOnce(&mut StepTransaction) -> Result<()>,
{
    let mut store = open_store(options(dir).target_version(1)).await.unwrap();
    store
        .write(|tx| {
            insert(tx, USER_TABLE, vec![identity(LOCAL_USER)])?;
            seed(tx)
        })
        .await
        .unwrap();
    store
}

/// Same as [`seeded_store`] but in memory.
pub async fn seeded_memory_store<F>(seed: F) -> Store
where
    F: FnOnce(&mut StepTransaction) -> Result<()>,
{
    let mut store = open_store(StoreOptions::new(STORE).in_memory().target_version(1))
        .await
        .unwrap();
    store
        .write(|tx| {
            insert(tx, USER_TABLE, vec![identity(LOCAL_USER)])?;
            seed(tx)
        })
        .await
        .unwrap();
    store
}

/// Asserts that no map or token embeds binary content and no asset carries linkage.
pub fn assert_assets_extracted(store: &Store) {
    for table in ["maps", "tokens"] {
        for record in store.table(table).unwrap().records() {
            assert!(!record.contains_bytes(), "{} record still embeds bytes: {:?}", table, record);
        }
    }
    for asset in store.table("assets").unwrap().records() {
        for field in ["originId", "originKind", "originSlot"] {
            assert!(!asset.contains(field), "asset kept {}: {:?}", field, asset.get("id"));
        }
    }
}

/// A seeded store under `dir` upgraded from version 1 to `to` with [`services`].
pub async fn upgraded_store<F>(dir: &Path, to: u32, seed: F) -> Store
where
    F: FnOnce(&mut StepTransaction) -> Result<()>,
{
    let mut store = seeded_store(dir, seed).await;
    migrator(services()).upgrade(&mut store, 1, to).await.unwrap();
    store
}

/// One owned map with a state and two tokens, one of them owned by someone else.
pub fn sample_seed(tx: &mut StepTransaction) -> Result<()> {
    insert(
        tx,
        "maps",
        vec![legacy_map("m1", LOCAL_USER, Value::Bytes(png(120, 80)), 120, 80)],
    )?;
    insert(
        tx,
        "tokens",
        vec![
            legacy_token("t1", LOCAL_USER, png(64, 64), false),
            legacy_token("t2", "someone-else", png(32, 16), true),
        ],
    )?;
    insert(
        tx,
        "states",
        vec![legacy_state("m1", &[("e1", "t1"), ("e2", "__default-Axes")])],
    )
}
