use crate::core::{Record, Result, StoreError, Value};
use std::collections::BTreeMap;

/// Typed reads over a record, naming the record in every error.
pub(crate) struct Fields<'a> {
    kind: &'static str,
    fields: &'a BTreeMap<String, Value>,
}

impl<'a> Fields<'a> {
    pub(crate) fn of(kind: &'static str, record: &'a Record) -> Self {
        Self {
            kind,
            fields: record.as_map(),
        }
    }

    pub(crate) fn of_map(kind: &'static str, fields: &'a BTreeMap<String, Value>) -> Self {
        Self { kind, fields }
    }

    fn mismatch(&self, field: &str, expected: &str) -> StoreError {
        let found = self.fields.get(field).map(Value::type_name).unwrap_or("nothing");
        StoreError::TypeMismatch(format!(
            "{}.{}: expected {}, found {}",
            self.kind, field, expected, found
        ))
    }

    pub(crate) fn value(&self, field: &str) -> Option<&'a Value> {
        self.fields.get(field).filter(|value| !value.is_null())
    }

    pub(crate) fn text(&self, field: &str) -> Result<String> {
        self.opt_text(field)?
            .ok_or_else(|| self.mismatch(field, "text"))
    }

    pub(crate) fn opt_text(&self, field: &str) -> Result<Option<String>> {
        match self.value(field) {
            None => Ok(None),
            Some(Value::Text(text)) => Ok(Some(text.clone())),
            Some(_) => Err(self.mismatch(field, "text")),
        }
    }

    pub(crate) fn text_or_default(&self, field: &str) -> Result<String> {
        Ok(self.opt_text(field)?.unwrap_or_default())
    }

    pub(crate) fn number(&self, field: &str) -> Result<f64> {
        self.value(field)
            .and_then(Value::as_f64)
            .ok_or_else(|| self.mismatch(field, "number"))
    }

    pub(crate) fn opt_number(&self, field: &str) -> Result<Option<f64>> {
        match self.value(field) {
            None => Ok(None),
            Some(value) => value
                .as_f64()
                .map(Some)
                .ok_or_else(|| self.mismatch(field, "number")),
        }
    }

    pub(crate) fn opt_integer(&self, field: &str) -> Result<Option<i64>> {
        match self.value(field) {
            None => Ok(None),
            Some(value) => value
                .as_i64()
                .map(Some)
                .ok_or_else(|| self.mismatch(field, "integer")),
        }
    }

    pub(crate) fn flag(&self, field: &str) -> bool {
        self.value(field).is_some_and(Value::as_bool)
    }

    pub(crate) fn bytes(&self, field: &str) -> Result<Vec<u8>> {
        self.value(field)
            .and_then(Value::as_bytes)
            .map(<[u8]>::to_vec)
            .ok_or_else(|| self.mismatch(field, "bytes"))
    }

    pub(crate) fn map(&self, field: &str) -> Result<&'a BTreeMap<String, Value>> {
        self.value(field)
            .and_then(Value::as_map)
            .ok_or_else(|| self.mismatch(field, "map"))
    }

    pub(crate) fn opt_map(&self, field: &str) -> Result<Option<&'a BTreeMap<String, Value>>> {
        match self.value(field) {
            None => Ok(None),
            Some(Value::Map(map)) => Ok(Some(map)),
            Some(_) => Err(self.mismatch(field, "map")),
        }
    }

    pub(crate) fn text_list(&self, field: &str) -> Result<Vec<String>> {
        match self.value(field) {
            None => Ok(Vec::new()),
            Some(Value::List(items)) => items
                .iter()
                .map(|item| {
                    item.as_str()
                        .map(str::to_string)
                        .ok_or_else(|| self.mismatch(field, "list of text"))
                })
                .collect(),
            Some(_) => Err(self.mismatch(field, "list")),
        }
    }
}
