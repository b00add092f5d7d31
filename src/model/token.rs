use super::fields::Fields;
use crate::core::{Record, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outline {
    Circle,
    Rect,
}

impl Outline {
    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "circle" => Some(Self::Circle),
            "rect" => Some(Self::Rect),
            _ => None,
        }
    }
}

pub(crate) fn outline(fields: &Fields<'_>) -> Result<Option<Outline>> {
    Ok(fields.opt_text("outline")?.as_deref().and_then(Outline::parse))
}

/// A reusable token image, referenced by session entries through `tokenId`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenTemplate {
    pub id: String,
    pub name: String,
    pub owner: String,
    pub file: String,
    pub thumbnail: Option<String>,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub default_category: String,
    pub default_label: String,
    pub outline: Option<Outline>,
    pub group: String,
}

impl TokenTemplate {
    pub fn from_record(record: &Record) -> Result<Self> {
        let token = Fields::of("token", record);
        Ok(Self {
            id: token.text("id")?,
            name: token.text_or_default("name")?,
            owner: token.text_or_default("owner")?,
            file: token.text_or_default("file")?,
            thumbnail: token.opt_text("thumbnail")?,
            width: token.opt_number("width")?,
            height: token.opt_number("height")?,
            default_category: token.text_or_default("defaultCategory")?,
            default_label: token.text_or_default("defaultLabel")?,
            outline: outline(&token)?,
            group: token.text_or_default("group")?,
        })
    }
}
