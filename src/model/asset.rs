use super::fields::Fields;
use crate::core::{Record, Result};
use serde::{Deserialize, Serialize};

/// Binary content shared by maps and tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetRecord {
    pub id: String,
    pub file: Vec<u8>,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub mime: String,
    pub owner: String,
}

impl AssetRecord {
    pub fn from_record(record: &Record) -> Result<Self> {
        let asset = Fields::of("asset", record);
        Ok(Self {
            id: asset.text("id")?,
            file: asset.bytes("file")?,
            width: asset.opt_number("width")?,
            height: asset.opt_number("height")?,
            mime: asset.text_or_default("mime")?,
            owner: asset.text_or_default("owner")?,
        })
    }
}

/// An entry of the `user` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserEntry {
    pub key: String,
    pub value: String,
}

impl UserEntry {
    pub fn from_record(record: &Record) -> Result<Self> {
        let entry = Fields::of("user", record);
        Ok(Self {
            key: entry.text("key")?,
            value: entry.text_or_default("value")?,
        })
    }
}
