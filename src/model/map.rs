use super::fields::Fields;
use crate::core::{Record, Result, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    fn from_value(kind: &'static str, value: &BTreeMap<String, Value>) -> Result<Self> {
        let fields = Fields::of_map(kind, value);
        Ok(Self {
            x: fields.number("x")?,
            y: fields.number("y")?,
        })
    }
}

/// Fraction of the map covered by the grid, from the top-left to the bottom-right corner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridInset {
    pub top_left: Point,
    pub bottom_right: Point,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Measurement {
    pub kind: String,
    pub scale: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grid {
    pub size_x: f64,
    pub size_y: f64,
    pub inset: GridInset,
    pub kind: String,
    pub measurement: Option<Measurement>,
}

impl Grid {
    fn from_value(value: &BTreeMap<String, Value>) -> Result<Self> {
        let grid = Fields::of_map("grid", value);
        let size = Fields::of_map("grid.size", grid.map("size")?);
        let inset = Fields::of_map("grid.inset", grid.map("inset")?);
        let measurement = grid
            .opt_map("measurement")?
            .map(|measurement| {
                let measurement = Fields::of_map("grid.measurement", measurement);
                Ok::<_, crate::core::StoreError>(Measurement {
                    kind: measurement.text("type")?,
                    scale: measurement.text("scale")?,
                })
            })
            .transpose()?;

        Ok(Self {
            size_x: size.number("x")?,
            size_y: size.number("y")?,
            inset: GridInset {
                top_left: Point::from_value("grid.inset.topLeft", inset.map("topLeft")?)?,
                bottom_right: Point::from_value(
                    "grid.inset.bottomRight",
                    inset.map("bottomRight")?,
                )?,
            },
            kind: grid.text("type")?,
            measurement,
        })
    }
}

/// A map at the current schema: binary content lives in `assets`, referenced by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapRecord {
    pub id: String,
    pub name: String,
    pub owner: String,
    pub file: String,
    pub thumbnail: Option<String>,
    pub resolutions: BTreeMap<String, String>,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub grid: Grid,
    pub group: String,
    pub show_grid: bool,
    pub snap_to_grid: bool,
    pub quality: String,
    pub last_modified: Option<i64>,
}

impl MapRecord {
    pub fn from_record(record: &Record) -> Result<Self> {
        let map = Fields::of("map", record);
        let mut resolutions = BTreeMap::new();
        if let Some(entries) = map.opt_map("resolutions")? {
            let entries = Fields::of_map("map.resolutions", entries);
            for name in ["low", "medium", "high", "ultra"] {
                if let Some(asset_id) = entries.opt_text(name)? {
                    resolutions.insert(name.to_string(), asset_id);
                }
            }
        }

        Ok(Self {
            id: map.text("id")?,
            name: map.text_or_default("name")?,
            owner: map.text_or_default("owner")?,
            file: map.text_or_default("file")?,
            thumbnail: map.opt_text("thumbnail")?,
            resolutions,
            width: map.opt_number("width")?,
            height: map.opt_number("height")?,
            grid: Grid::from_value(map.map("grid")?)?,
            group: map.text_or_default("group")?,
            show_grid: map.flag("showGrid"),
            snap_to_grid: map.flag("snapToGrid"),
            quality: map.text_or_default("quality")?,
            last_modified: map.opt_integer("lastModified")?,
        })
    }

    /// Every asset id this map references.
    pub fn asset_ids(&self) -> Vec<&str> {
        std::iter::once(self.file.as_str())
            .chain(self.thumbnail.as_deref())
            .chain(self.resolutions.values().map(String::as_str))
            .filter(|id| !id.is_empty())
            .collect()
    }
}
