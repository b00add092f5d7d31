use super::{MAPS, STATES, TOKENS, for_each_token_entry, shape_error};
use crate::core::{Record, Result, Value};
use crate::migration::context::{StepContext, USER_TABLE};
use crate::migration::step::MigrationStep;
use crate::storage::TableDef;
use crate::transaction::StepTransaction;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

pub fn steps_1_to_12() -> Vec<MigrationStep> {
    vec![
        MigrationStep::new(1, "create maps, states, tokens and user tables")
            .create_table(TableDef::new(MAPS, "id").with_index("owner"))
            .create_table(TableDef::new(STATES, "mapId"))
            .create_table(TableDef::new(TOKENS, "id").with_index("owner"))
            .create_table(TableDef::new(USER_TABLE, "key")),
        MigrationStep::new(2, "store map files as raw bytes").with_transform(map_files_to_bytes),
        MigrationStep::new(3, "remap retired default token ids")
            .with_transform(remap_default_token_ids),
        MigrationStep::new(4, "add map grid visibility").with_transform(|tx, _ctx| {
            set_on_all(tx, MAPS, "showGrid", false)
        }),
        MigrationStep::new(5, "add holes to fog shapes").with_transform(add_fog_holes),
        MigrationStep::new(6, "add map resolutions").with_transform(|tx, _ctx| {
            tx.table_mut(MAPS)?.modify_all(|_, map| {
                map.set("resolutions", Value::empty_map());
                map.set("quality", "original");
                Ok(())
            })?;
            Ok(())
        }),
        MigrationStep::new(7, "fix rogue default token spelling").with_transform(fix_rogue_spelling),
        MigrationStep::new(8, "add map snap to grid").with_transform(|tx, _ctx| {
            set_on_all(tx, MAPS, "snapToGrid", true)
        }),
        MigrationStep::new(9, "add lock, visibility and modification time to token entries")
            .with_transform(add_token_entry_flags),
        MigrationStep::new(10, "replace token vehicle flag with category")
            .with_transform(token_category_from_vehicle_flag),
        MigrationStep::new(11, "track map last use").with_transform(|tx, _ctx| {
            copy_field_on_all(tx, MAPS, "lastModified", "lastUsed")
        }),
        MigrationStep::new(12, "track token last use").with_transform(|tx, _ctx| {
            copy_field_on_all(tx, TOKENS, "lastModified", "lastUsed")
        }),
    ]
}

pub fn step_14() -> MigrationStep {
    MigrationStep::new(14, "add token grouping").with_transform(|tx, _ctx| {
        set_on_all(tx, TOKENS, "group", "")
    })
}

pub fn step_16() -> MigrationStep {
    MigrationStep::new(16, "add notes to states").with_transform(add_notes)
}

/// Schema-only upgrade kept so version numbers line up with existing stores.
pub fn step_21() -> MigrationStep {
    MigrationStep::new(21, "observation hook upgrade")
}

fn set_on_all(
    tx: &mut StepTransaction,
    table: &str,
    field: &str,
    value: impl Into<Value> + Clone,
) -> Result<()> {
    tx.table_mut(table)?.modify_all(|_, record| {
        record.set(field, value.clone());
        Ok(())
    })?;
    Ok(())
}

fn copy_field_on_all(tx: &mut StepTransaction, table: &str, from: &str, to: &str) -> Result<()> {
    tx.table_mut(table)?.modify_all(|_, record| {
        if let Some(value) = record.get(from).cloned() {
            record.set(to, value);
        }
        Ok(())
    })?;
    Ok(())
}

/// Decodes the legacy representations of a binary payload.
pub(crate) fn payload_bytes(value: &Value) -> Result<Vec<u8>> {
    match value {
        Value::Bytes(bytes) => Ok(bytes.clone()),
        Value::List(items) => items
            .iter()
            .map(|item| {
                item.as_i64()
                    .and_then(|byte| u8::try_from(byte).ok())
                    .ok_or_else(|| shape_error(format!("invalid byte {} in file payload", item)))
            })
            .collect(),
        Value::Text(encoded) => STANDARD
            .decode(encoded.as_bytes())
            .map_err(|err| shape_error(format!("file payload is not base64: {}", err))),
        other => Err(shape_error(format!(
            "file payload must be binary, found {}",
            other.type_name()
        ))),
    }
}

fn map_files_to_bytes(tx: &mut StepTransaction, _ctx: &StepContext) -> Result<()> {
    tx.table_mut(MAPS)?.modify_all(|key, map| {
        if let Some(file) = map.get("file") {
            let bytes = payload_bytes(file)
                .map_err(|err| shape_error(format!("map '{}': {}", key, err)))?;
            map.set("file", Value::Bytes(bytes));
        }
        Ok(())
    })?;
    Ok(())
}

/// Successor of a retired default token, or `None` for custom token ids.
pub(crate) fn successor_default_token(id: &str) -> Option<&'static str> {
    let name = id.strip_prefix("__default-")?;
    Some(match name {
        "Axes" => "__default-Barbarian",
        "Bird" | "Leaf" => "__default-Druid",
        "Book" => "__default-Wizard",
        "Crown" | "Money" => "__default-Humanoid",
        "Dragon" => "__default-Dragon",
        "Eye" => "__default-Warlock",
        "Fist" => "__default-Monk",
        "Horse" => "__default-Fey",
        "Lion" => "__default-Monstrosity",
        "Moon" | "Sun" => "__default-Cleric",
        "Potion" | "Triangle" => "__default-Sorcerer",
        "Shield" => "__default-Paladin",
        "Skull" => "__default-Undead",
        "Snake" => "__default-Beast",
        "Swords" => "__default-Fighter",
        "Tree" => "__default-Plant",
        _ => "__default-Fighter",
    })
}

fn remap_default_token_ids(tx: &mut StepTransaction, _ctx: &StepContext) -> Result<()> {
    tx.table_mut(STATES)?.modify_all(|_, state| {
        for_each_token_entry(state, |entry| {
            // Custom token ids are kept; only retired defaults are remapped.
            let successor = entry
                .get("tokenId")
                .and_then(Value::as_str)
                .and_then(successor_default_token);
            if let Some(successor) = successor {
                entry.insert("tokenId".to_string(), Value::from(successor));
            }
            entry.insert("lastEditedBy".to_string(), Value::from(""));
            entry.insert("rotation".to_string(), Value::Integer(0));
            Ok(())
        })
    })?;
    Ok(())
}

fn add_fog_holes(tx: &mut StepTransaction, _ctx: &StepContext) -> Result<()> {
    tx.table_mut(STATES)?.modify_all(|_, state| {
        let Some(actions) = state.get_list_mut("fogDrawActions") else {
            return Ok(());
        };
        for action in actions.iter_mut() {
            let kind = action.get("type").and_then(Value::as_str);
            if !matches!(kind, Some("add") | Some("edit")) {
                continue;
            }
            let Some(shapes) = action
                .as_map_mut()
                .and_then(|action| action.get_mut("shapes"))
                .and_then(Value::as_list_mut)
            else {
                continue;
            };
            for shape in shapes.iter_mut() {
                let shape = shape
                    .as_map_mut()
                    .ok_or_else(|| shape_error("fog shape is not a map"))?;
                let data = shape
                    .entry("data".to_string())
                    .or_insert_with(Value::empty_map);
                let data = data
                    .as_map_mut()
                    .ok_or_else(|| shape_error("fog shape data is not a map"))?;
                data.insert("holes".to_string(), Value::List(Vec::new()));
            }
        }
        Ok(())
    })?;
    Ok(())
}

fn fix_rogue_spelling(tx: &mut StepTransaction, _ctx: &StepContext) -> Result<()> {
    tx.table_mut(STATES)?.modify_all(|_, state| {
        for_each_token_entry(state, |entry| {
            if entry.get("tokenId").and_then(Value::as_str) == Some("__default-Rouge") {
                entry.insert("tokenId".to_string(), Value::from("__default-Rogue"));
            }
            Ok(())
        })
    })?;
    Ok(())
}

fn add_token_entry_flags(tx: &mut StepTransaction, ctx: &StepContext) -> Result<()> {
    let now = ctx.now_unix_ms();
    tx.table_mut(STATES)?.modify_all(|_, state| {
        for_each_token_entry(state, |entry| {
            let editor = entry.remove("lastEditedBy").unwrap_or_else(|| Value::from(""));
            entry.insert("lastModifiedBy".to_string(), editor);
            entry.insert("lastModified".to_string(), Value::Integer(now));
            entry.insert("locked".to_string(), Value::Boolean(false));
            entry.insert("visible".to_string(), Value::Boolean(true));
            Ok(())
        })
    })?;
    Ok(())
}

fn token_category_from_vehicle_flag(tx: &mut StepTransaction, _ctx: &StepContext) -> Result<()> {
    tx.table_mut(TOKENS)?.modify_all(|_, token| {
        let is_vehicle = token.remove("isVehicle").is_some_and(|flag| flag.as_bool());
        token.set("category", if is_vehicle { "vehicle" } else { "character" });
        Ok(())
    })?;
    Ok(())
}

fn add_notes(tx: &mut StepTransaction, _ctx: &StepContext) -> Result<()> {
    tx.table_mut(STATES)?.modify_all(|_, state: &mut Record| {
        state.set("notes", Value::empty_map());
        match state.get_list_mut("editFlags") {
            Some(flags) => flags.push(Value::from("notes")),
            None => {
                state.set("editFlags", vec![Value::from("notes")]);
            }
        }
        Ok(())
    })?;
    Ok(())
}
