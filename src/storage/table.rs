use crate::core::{Record, Result, StoreError, Value};
use im::OrdMap;
use serde::{Deserialize, Serialize};

/// Fields holding binary content that bulk loads may leave out.
pub const FILE_FIELDS: [&str; 2] = ["file", "resolutions"];

/// Declares a table: its name, the field records are keyed by, and queryable indexes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDef {
    pub name: String,
    pub key_path: String,
    pub indexes: Vec<String>,
}

impl TableDef {
    pub fn new(name: impl Into<String>, key_path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key_path: key_path.into(),
            indexes: Vec::new(),
        }
    }

    pub fn with_index(mut self, field: impl Into<String>) -> Self {
        let field = field.into();
        if !self.indexes.contains(&field) {
            self.indexes.push(field);
        }
        self
    }

    /// Whether `field` can be used in a `where_*` query.
    pub fn is_queryable(&self, field: &str) -> bool {
        self.key_path == field || self.indexes.iter().any(|index| index == field)
    }
}

/// A keyed collection of records.
///
/// Records live in a persistent ordered map, so cloning a table for a step transaction
/// shares structure with the committed copy and iteration order is stable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    def: TableDef,
    records: OrdMap<String, Record>,
}

impl Table {
    pub fn new(def: TableDef) -> Self {
        Self {
            def,
            records: OrdMap::new(),
        }
    }

    pub fn def(&self) -> &TableDef {
        &self.def
    }

    pub fn name(&self) -> &str {
        &self.def.name
    }

    pub fn add_index(&mut self, field: &str) {
        if !self.def.indexes.iter().any(|index| index == field) {
            self.def.indexes.push(field.to_string());
        }
    }

    /// Extracts the key of `record` according to this table's key path.
    pub fn key_for(&self, record: &Record) -> Result<String> {
        record
            .key_text(&self.def.key_path)
            .ok_or_else(|| StoreError::MissingKey {
                table: self.def.name.clone(),
                field: self.def.key_path.clone(),
            })
    }

    pub fn get(&self, key: &str) -> Option<&Record> {
        self.records.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.records.contains_key(key)
    }

    /// Inserts a new record; fails if the key is already taken.
    pub fn add(&mut self, record: Record) -> Result<String> {
        let key = self.key_for(&record)?;
        if self.records.contains_key(&key) {
            return Err(StoreError::DuplicateKey {
                table: self.def.name.clone(),
                key,
            });
        }
        self.records.insert(key.clone(), record);
        Ok(key)
    }

    /// Adds every record, failing on the first duplicate. Returns the keys in input order.
    pub fn bulk_add(&mut self, records: impl IntoIterator<Item = Record>) -> Result<Vec<String>> {
        records.into_iter().map(|record| self.add(record)).collect()
    }

    /// Inserts or replaces a record, returning the previous one.
    pub fn put(&mut self, record: Record) -> Result<Option<Record>> {
        let key = self.key_for(&record)?;
        Ok(self.records.insert(key, record))
    }

    /// Merges `patch` into the record at `key`. Returns `false` when no such record exists.
    pub fn update(&mut self, key: &str, patch: Record) -> bool {
        match self.records.get_mut(key) {
            Some(record) => {
                record.apply_patch(patch);
                true
            }
            None => false,
        }
    }

    /// Mutates the record at `key` in place. Returns `false` when no such record exists.
    pub fn modify_one<F>(&mut self, key: &str, f: F) -> Result<bool>
    where
        F: FnOnce(&mut Record) -> Result<()>,
    {
        match self.records.get_mut(key) {
            Some(record) => {
                f(record)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Mutates every record in key order. Returns the number of records visited.
    pub fn modify_all<F>(&mut self, mut f: F) -> Result<usize>
    where
        F: FnMut(&str, &mut Record) -> Result<()>,
    {
        let keys: Vec<String> = self.records.keys().cloned().collect();
        for key in &keys {
            if let Some(record) = self.records.get_mut(key) {
                f(key.as_str(), record)?;
            }
        }
        Ok(keys.len())
    }

    pub fn delete(&mut self, key: &str) -> bool {
        self.records.remove(key).is_some()
    }

    /// Deletes every record whose `field` differs from `value` (absent counts as different).
    pub fn delete_where_not_eq(&mut self, field: &str, value: &Value) -> Result<usize> {
        self.ensure_queryable(field)?;
        let doomed: Vec<String> = self
            .records
            .iter()
            .filter(|(key, record)| !self.field_matches(key, record, field, value))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &doomed {
            self.records.remove(key);
        }
        Ok(doomed.len())
    }

    /// Returns the records whose `field` equals `value`, in key order.
    pub fn where_eq(&self, field: &str, value: &Value) -> Result<Vec<&Record>> {
        self.ensure_queryable(field)?;
        Ok(self
            .records
            .iter()
            .filter(|(key, record)| self.field_matches(key, record, field, value))
            .map(|(_, record)| record)
            .collect())
    }

    pub fn each<F>(&self, mut visitor: F)
    where
        F: FnMut(&str, &Record),
    {
        for (key, record) in self.records.iter() {
            visitor(key.as_str(), record);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Record)> {
        self.records.iter()
    }

    pub fn keys(&self) -> Vec<String> {
        self.records.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn ensure_queryable(&self, field: &str) -> Result<()> {
        if self.def.is_queryable(field) {
            Ok(())
        } else {
            Err(StoreError::UnindexedField {
                table: self.def.name.clone(),
                field: field.to_string(),
            })
        }
    }

    fn field_matches(&self, key: &str, record: &Record, field: &str, value: &Value) -> bool {
        if field == self.def.key_path {
            return value.as_str() == Some(key) || record.get(field) == Some(value);
        }
        record.get(field) == Some(value)
    }
}

/// Read-only access to a committed table.
#[derive(Debug, Clone, Copy)]
pub struct TableView<'a> {
    table: &'a Table,
}

impl<'a> TableView<'a> {
    pub(crate) fn new(table: &'a Table) -> Self {
        Self { table }
    }

    pub fn name(&self) -> &'a str {
        self.table.name()
    }

    pub fn def(&self) -> &'a TableDef {
        self.table.def()
    }

    pub fn get(&self, key: &str) -> Option<&'a Record> {
        self.table.get(key)
    }

    /// Visits every record in key order.
    pub fn each<F>(&self, mut visitor: F)
    where
        F: FnMut(&str, &Record),
    {
        for (key, record) in self.table.iter() {
            visitor(key.as_str(), record);
        }
    }

    pub fn where_eq(&self, field: &str, value: &Value) -> Result<Vec<&'a Record>> {
        self.table.where_eq(field, value)
    }

    pub fn records(&self) -> Vec<&'a Record> {
        self.table.iter().map(|(_, record)| record).collect()
    }

    pub fn keys(&self) -> Vec<String> {
        self.table.keys()
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Loads the whole table. With `exclude_files`, binary slots are left out so large
    /// tables can be listed cheaply.
    pub fn load(&self, exclude_files: bool) -> Vec<Record> {
        self.table
            .iter()
            .map(|(_, record)| {
                let mut record = record.clone();
                if exclude_files {
                    for field in FILE_FIELDS {
                        record.remove(field);
                    }
                }
                record
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn maps_table() -> Table {
        Table::new(TableDef::new("maps", "id").with_index("owner"))
    }

    fn map(id: &str, owner: &str) -> Record {
        Record::from_json(json!({"id": id, "owner": owner, "name": id})).unwrap()
    }

    #[test]
    fn add_rejects_duplicates_and_missing_keys() {
        let mut table = maps_table();
        table.add(map("a", "me")).unwrap();
        assert!(matches!(
            table.add(map("a", "me")),
            Err(StoreError::DuplicateKey { .. })
        ));
        assert!(matches!(
            table.add(Record::new().with("owner", "me")),
            Err(StoreError::MissingKey { .. })
        ));
    }

    #[test]
    fn update_merges_and_reports_missing() {
        let mut table = maps_table();
        table.add(map("a", "me")).unwrap();
        assert!(table.update("a", Record::new().with("name", "renamed")));
        assert_eq!(table.get("a").unwrap().get_str("name"), Some("renamed"));
        assert!(!table.update("b", Record::new().with("name", "x")));
    }

    #[test]
    fn queries_require_an_index() {
        let mut table = maps_table();
        table.add(map("a", "me")).unwrap();
        table.add(map("b", "you")).unwrap();
        assert_eq!(table.where_eq("owner", &"me".into()).unwrap().len(), 1);
        assert!(matches!(
            table.where_eq("name", &"a".into()),
            Err(StoreError::UnindexedField { .. })
        ));
        assert_eq!(table.delete_where_not_eq("owner", &"me".into()).unwrap(), 1);
        assert_eq!(table.keys(), vec!["a".to_string()]);
    }

    #[test]
    fn load_can_exclude_file_fields() {
        let mut table = maps_table();
        table
            .add(map("a", "me").with("file", Value::Bytes(vec![1, 2])))
            .unwrap();
        let view = TableView::new(&table);
        assert!(view.load(false)[0].contains("file"));
        assert!(!view.load(true)[0].contains("file"));
    }
}
