use super::{MAPS, TOKENS, shape_error};
use crate::core::{Record, Result, Value};
use crate::migration::context::StepContext;
use crate::migration::step::MigrationStep;
use crate::services::Preview;
use crate::transaction::StepTransaction;
use futures::future::BoxFuture;
use std::collections::BTreeMap;

pub fn step_15() -> MigrationStep {
    MigrationStep::new(15, "measure token images")
        .with_async_transform(measure_tokens)
        .best_effort()
}

pub fn step_19() -> MigrationStep {
    MigrationStep::new(19, "add map thumbnails and grid measurement")
        .with_async_transform(map_thumbnails)
        .best_effort()
}

pub fn step_20() -> MigrationStep {
    MigrationStep::new(20, "add token thumbnails")
        .with_async_transform(token_thumbnails)
        .best_effort()
}

fn thumbnail_value(preview: Preview) -> Value {
    let mut thumbnail = BTreeMap::new();
    thumbnail.insert("file".to_string(), Value::Bytes(preview.file));
    thumbnail.insert("width".to_string(), Value::from(preview.width));
    thumbnail.insert("height".to_string(), Value::from(preview.height));
    Value::Map(thumbnail)
}

/// Best source for a preview: the low resolution copy when one exists, else the original.
fn preview_source(record: &Record) -> Option<&[u8]> {
    record
        .get_path(&["resolutions", "low", "file"])
        .and_then(Value::as_bytes)
        .or_else(|| record.get("file").and_then(Value::as_bytes))
}

fn measure_tokens<'a>(
    tx: &'a mut StepTransaction,
    ctx: &'a StepContext,
) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        let mut items = Vec::new();
        for (key, token) in tx.table(TOKENS)?.iter() {
            match token.get("file").and_then(Value::as_bytes) {
                Some(bytes) => items.push((key.clone(), bytes.to_vec())),
                None => ctx.enhancement_failed(
                    "measure",
                    key.clone(),
                    shape_error("token has no image payload"),
                )?,
            }
        }

        let sizes = ctx.measure_all(items).await?;
        let tokens = tx.table_mut(TOKENS)?;
        for (key, size) in sizes {
            tokens.modify_one(&key, |token| {
                token.set("width", size.width);
                token.set("height", size.height);
                Ok(())
            })?;
        }
        Ok(())
    })
}

/// Collects preview sources for the records of `table` owned by the local user. An empty
/// table needs no local identity.
fn owned_preview_sources(
    tx: &StepTransaction,
    ctx: &StepContext,
    table: &str,
) -> Result<Vec<(String, Vec<u8>)>> {
    let records = tx.table(table)?;
    if records.is_empty() {
        return Ok(Vec::new());
    }
    let user_id = ctx.local_user_id(tx)?;
    let mut items = Vec::new();
    for (key, record) in records.iter() {
        if record.get_str("owner") != Some(user_id.as_str()) {
            continue;
        }
        match preview_source(record) {
            Some(bytes) => items.push((key.clone(), bytes.to_vec())),
            None => ctx.enhancement_failed(
                "preview",
                key.clone(),
                shape_error("record has no image payload"),
            )?,
        }
    }
    Ok(items)
}

fn map_thumbnails<'a>(
    tx: &'a mut StepTransaction,
    ctx: &'a StepContext,
) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        let items = owned_preview_sources(tx, ctx, MAPS)?;
        let mut previews = ctx.preview_all(items).await?;

        tx.table_mut(MAPS)?.modify_all(|key, map| {
            if let Some(preview) = previews.remove(key) {
                map.set("thumbnail", thumbnail_value(preview));
            }
            let grid = map
                .get_map_mut("grid")
                .ok_or_else(|| shape_error(format!("map '{}' has no grid", key)))?;
            let mut measurement = BTreeMap::new();
            measurement.insert("type".to_string(), Value::from("chebyshev"));
            measurement.insert("scale".to_string(), Value::from("5ft"));
            grid.insert("measurement".to_string(), Value::Map(measurement));
            Ok(())
        })?;
        Ok(())
    })
}

fn token_thumbnails<'a>(
    tx: &'a mut StepTransaction,
    ctx: &'a StepContext,
) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        let items = owned_preview_sources(tx, ctx, TOKENS)?;
        let previews = ctx.preview_all(items).await?;

        let tokens = tx.table_mut(TOKENS)?;
        for (key, preview) in previews {
            tokens.modify_one(&key, |token| {
                token.set("thumbnail", thumbnail_value(preview));
                Ok(())
            })?;
        }
        Ok(())
    })
}
