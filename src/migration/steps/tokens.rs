use super::{STATES, TOKENS, for_each_token_entry};
use crate::core::{Result, Value};
use crate::migration::context::StepContext;
use crate::migration::step::MigrationStep;
use crate::storage::Table;
use crate::transaction::StepTransaction;
use std::collections::BTreeMap;

const DEFAULT_TOKEN_PREFIX: &str = "__default";
const DEFAULT_TOKEN_EDGE: i64 = 256;

pub fn steps_28_to_29() -> Vec<MigrationStep> {
    vec![
        MigrationStep::new(28, "move token category to defaults and add outline")
            .with_transform(token_defaults_and_outline),
        MigrationStep::new(29, "back-fill token entries from their templates")
            .with_transform(backfill_token_entries),
    ]
}

/// Joins the words of `text` in lower camel case. Words break at anything that is not a
/// letter or digit and where a lower-case letter is followed by an upper-case one.
pub fn camel_case(text: &str) -> String {
    let mut words: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut previous_lower = false;
    for ch in text.chars() {
        if !ch.is_alphanumeric() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            previous_lower = false;
            continue;
        }
        if ch.is_uppercase() && previous_lower && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        previous_lower = ch.is_lowercase() || ch.is_ascii_digit();
        current.push(ch);
    }
    if !current.is_empty() {
        words.push(current);
    }

    let mut camel = String::with_capacity(text.len());
    for (index, word) in words.iter().enumerate() {
        let lower = word.to_lowercase();
        if index == 0 {
            camel.push_str(&lower);
            continue;
        }
        let mut chars = lower.chars();
        if let Some(first) = chars.next() {
            camel.extend(first.to_uppercase());
            camel.push_str(chars.as_str());
        }
    }
    camel
}

fn token_defaults_and_outline(tx: &mut StepTransaction, _ctx: &StepContext) -> Result<()> {
    tx.table_mut(TOKENS)?.modify_all(|_, token| {
        let category = token.remove("category").unwrap_or_default();
        token.set("defaultCategory", category);
        token.set("defaultLabel", "");
        let square = token.get("width") == token.get("height");
        token.set("outline", if square { "circle" } else { "rect" });
        token.remove("lastUsed");
        Ok(())
    })?;
    Ok(())
}

fn set_size(entry: &mut BTreeMap<String, Value>, width: Value, height: Value) {
    entry.insert("width".to_string(), width);
    entry.insert("height".to_string(), height);
}

/// Fills a session token entry from the token template it was placed from.
pub(crate) fn backfill_entry(entry: &mut BTreeMap<String, Value>, templates: &Table) {
    let token_id = entry
        .get("tokenId")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let mut set = |field: &str, value: Value| {
        entry.insert(field.to_string(), value);
    };

    if let Some(name) = token_id.strip_prefix(DEFAULT_TOKEN_PREFIX) {
        set("category", Value::from("character"));
        set("type", Value::from("default"));
        set("key", Value::from(camel_case(name.get(1..).unwrap_or_default())));
        set("outline", Value::from("circle"));
        set_size(
            entry,
            Value::Integer(DEFAULT_TOKEN_EDGE),
            Value::Integer(DEFAULT_TOKEN_EDGE),
        );
        return;
    }

    match templates.get(&token_id) {
        Some(template) => {
            let copy = |field: &str| template.get(field).cloned().unwrap_or_default();
            set("category", copy("defaultCategory"));
            set("file", copy("file"));
            set("type", Value::from("file"));
            set("outline", copy("outline"));
            set_size(entry, copy("width"), copy("height"));
        }
        None => {
            set("category", Value::from("character"));
            set("type", Value::from("file"));
            set("file", Value::from(""));
            set("outline", Value::from("rect"));
            set_size(
                entry,
                Value::Integer(DEFAULT_TOKEN_EDGE),
                Value::Integer(DEFAULT_TOKEN_EDGE),
            );
        }
    }
}

fn backfill_token_entries(tx: &mut StepTransaction, _ctx: &StepContext) -> Result<()> {
    let templates = tx.table(TOKENS)?.clone();
    tx.table_mut(STATES)?.modify_all(|_, state| {
        for_each_token_entry(state, |entry| {
            backfill_entry(entry, &templates);
            Ok(())
        })
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Record;
    use crate::storage::TableDef;

    #[test]
    fn camel_case_handles_separators_and_case_changes() {
        assert_eq!(camel_case("Barbarian"), "barbarian");
        assert_eq!(camel_case("Dire-Wolf"), "direWolf");
        assert_eq!(camel_case("giant_spider king"), "giantSpiderKing");
        assert_eq!(camel_case("ownedToken"), "ownedToken");
        assert_eq!(camel_case(""), "");
    }

    fn entry(token_id: &str) -> BTreeMap<String, Value> {
        let mut entry = BTreeMap::new();
        entry.insert("tokenId".to_string(), Value::from(token_id));
        entry
    }

    fn templates() -> Table {
        let mut table = Table::new(TableDef::new(TOKENS, "id"));
        table
            .add(
                Record::new()
                    .with("id", "tpl")
                    .with("defaultCategory", "vehicle")
                    .with("file", "asset-9")
                    .with("outline", "rect")
                    .with("width", 64i64)
                    .with("height", 32i64),
            )
            .unwrap();
        table
    }

    #[test]
    fn default_token_entries_get_fixed_values() {
        let mut e = entry("__default-Dire-Wolf");
        backfill_entry(&mut e, &templates());
        assert_eq!(e["key"], Value::from("direWolf"));
        assert_eq!(e["type"], Value::from("default"));
        assert_eq!(e["outline"], Value::from("circle"));
        assert_eq!(e["width"], Value::Integer(256));
    }

    #[test]
    fn template_fields_are_copied() {
        let mut e = entry("tpl");
        backfill_entry(&mut e, &templates());
        assert_eq!(e["category"], Value::from("vehicle"));
        assert_eq!(e["file"], Value::from("asset-9"));
        assert_eq!(e["type"], Value::from("file"));
        assert_eq!(e["height"], Value::Integer(32));
    }

    #[test]
    fn deleted_template_falls_back_to_rect_defaults() {
        let mut e = entry("gone");
        backfill_entry(&mut e, &templates());
        assert_eq!(e["category"], Value::from("character"));
        assert_eq!(e["file"], Value::from(""));
        assert_eq!(e["outline"], Value::from("rect"));
        assert_eq!(e["width"], Value::Integer(256));
        assert_eq!(e["height"], Value::Integer(256));
    }
}
