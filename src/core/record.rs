use super::{Result, StoreError, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single stored record: an ordered mapping from field name to value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: BTreeMap<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a record from a JSON object. Non-object JSON is rejected.
    pub fn from_json(json: serde_json::Value) -> Result<Self> {
        match Value::from_json(json) {
            Value::Map(fields) => Ok(Self { fields }),
            other => Err(StoreError::TypeMismatch(format!(
                "Record must be built from a JSON object, got {}",
                other.type_name()
            ))),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.fields
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }

    /// Fluent setter, handy when building records by hand.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn get_mut(&mut self, field: &str) -> Option<&mut Value> {
        self.fields.get_mut(field)
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(Value::as_str)
    }

    pub fn get_i64(&self, field: &str) -> Option<i64> {
        self.get(field).and_then(Value::as_i64)
    }

    pub fn get_f64(&self, field: &str) -> Option<f64> {
        self.get(field).and_then(Value::as_f64)
    }

    /// Follows a path of nested map fields, e.g. `["resolutions", "low", "file"]`.
    pub fn get_path(&self, path: &[&str]) -> Option<&Value> {
        let (first, rest) = path.split_first()?;
        let mut current = self.get(first)?;
        for segment in rest {
            current = current.get(segment)?;
        }
        Some(current)
    }

    /// Mutable access to a nested map field; `None` when absent or not a map.
    pub fn get_map_mut(&mut self, field: &str) -> Option<&mut BTreeMap<String, Value>> {
        self.fields.get_mut(field).and_then(Value::as_map_mut)
    }

    /// Mutable access to a list field; `None` when absent or not a list.
    pub fn get_list_mut(&mut self, field: &str) -> Option<&mut Vec<Value>> {
        self.fields.get_mut(field).and_then(Value::as_list_mut)
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(field.into(), value.into())
    }

    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.fields.remove(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Merges every field of `patch` into this record, overwriting existing values.
    pub fn apply_patch(&mut self, patch: Record) {
        self.fields.extend(patch.fields);
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Renders a field as a record key. Keys may be stored as text or integers.
    pub fn key_text(&self, field: &str) -> Option<String> {
        match self.get(field)? {
            Value::Text(s) => Some(s.clone()),
            Value::Integer(i) => Some(i.to_string()),
            _ => None,
        }
    }

    /// True when any field holds embedded binary content.
    pub fn contains_bytes(&self) -> bool {
        self.fields.values().any(Value::contains_bytes)
    }

    pub fn as_map(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }

    pub fn into_fields(self) -> BTreeMap<String, Value> {
        self.fields
    }
}

impl From<BTreeMap<String, Value>> for Record {
    fn from(fields: BTreeMap<String, Value>) -> Self {
        Self { fields }
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        Value::Map(record.fields)
    }
}
