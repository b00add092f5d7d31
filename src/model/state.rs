use super::fields::Fields;
use super::token::{Outline, outline};
use crate::core::{Record, Result, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A token placed on a map during a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenSessionEntry {
    pub token_id: String,
    pub category: String,
    pub kind: String,
    pub key: Option<String>,
    pub file: Option<String>,
    pub outline: Option<Outline>,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub rotation: f64,
    pub locked: bool,
    pub visible: bool,
    pub last_modified_by: String,
    pub last_modified: Option<i64>,
}

impl TokenSessionEntry {
    fn from_map(entry: &BTreeMap<String, Value>) -> Result<Self> {
        let entry = Fields::of_map("state.tokens", entry);
        Ok(Self {
            token_id: entry.text("tokenId")?,
            category: entry.text_or_default("category")?,
            kind: entry.text_or_default("type")?,
            key: entry.opt_text("key")?,
            file: entry.opt_text("file")?,
            outline: outline(&entry)?,
            width: entry.opt_number("width")?,
            height: entry.opt_number("height")?,
            rotation: entry.opt_number("rotation")?.unwrap_or(0.0),
            locked: entry.flag("locked"),
            visible: entry.flag("visible"),
            last_modified_by: entry.text_or_default("lastModifiedBy")?,
            last_modified: entry.opt_integer("lastModified")?,
        })
    }

    pub fn is_default(&self) -> bool {
        self.kind == "default"
    }
}

/// Session state of one map: placed tokens, drawings, fog and notes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapSessionState {
    pub map_id: String,
    pub tokens: BTreeMap<String, TokenSessionEntry>,
    pub draw_shape_ids: Vec<String>,
    pub fog_shape_ids: Vec<String>,
    pub note_ids: Vec<String>,
    pub edit_flags: Vec<String>,
}

impl MapSessionState {
    pub fn from_record(record: &Record) -> Result<Self> {
        let state = Fields::of("state", record);
        let keys = |field: &str| -> Result<Vec<String>> {
            Ok(state
                .opt_map(field)?
                .map(|map| map.keys().cloned().collect())
                .unwrap_or_default())
        };

        let mut tokens = BTreeMap::new();
        if let Some(entries) = state.opt_map("tokens")? {
            for (id, entry) in entries {
                let entry = entry.as_map().ok_or_else(|| {
                    crate::core::StoreError::TypeMismatch(format!(
                        "state.tokens.{}: expected map, found {}",
                        id,
                        entry.type_name()
                    ))
                })?;
                tokens.insert(id.clone(), TokenSessionEntry::from_map(entry)?);
            }
        }

        Ok(Self {
            map_id: state.text("mapId")?,
            tokens,
            draw_shape_ids: keys("drawShapes")?,
            fog_shape_ids: keys("fogShapes")?,
            note_ids: keys("notes")?,
            edit_flags: state.text_list("editFlags")?,
        })
    }
}
