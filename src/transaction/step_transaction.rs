use crate::core::{Record, Result, StoreError};
use crate::storage::{Table, TableDef};
use im::OrdMap;

/// The unit of atomicity for a migration step or a consumer write.
///
/// A transaction starts from a structural-sharing copy of the committed tables. Nothing
/// it does is visible to the store until the owner commits it; dropping it discards every
/// change.
#[derive(Debug, Clone)]
pub struct StepTransaction {
    version: u32,
    tables: OrdMap<String, Table>,
}

impl StepTransaction {
    pub(crate) fn new(version: u32, tables: OrdMap<String, Table>) -> Self {
        Self { version, tables }
    }

    /// The schema version this transaction will commit at.
    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    pub fn table_names(&self) -> Vec<String> {
        self.tables.keys().cloned().collect()
    }

    pub fn create_table(&mut self, def: TableDef) -> Result<()> {
        if self.tables.contains_key(&def.name) {
            return Err(StoreError::TableExists(def.name));
        }
        self.tables.insert(def.name.clone(), Table::new(def));
        Ok(())
    }

    pub fn add_index(&mut self, table: &str, field: &str) -> Result<()> {
        self.table_mut(table)?.add_index(field);
        Ok(())
    }

    pub fn table(&self, name: &str) -> Result<&Table> {
        self.tables
            .get(name)
            .ok_or_else(|| StoreError::TableNotFound(name.to_string()))
    }

    pub fn table_mut(&mut self, name: &str) -> Result<&mut Table> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| StoreError::TableNotFound(name.to_string()))
    }

    /// Fetches a clone of one record, for transforms that read one table while writing
    /// another.
    pub fn get(&self, table: &str, key: &str) -> Result<Option<Record>> {
        Ok(self.table(table)?.get(key).cloned())
    }

    /// Snapshot of every record of a table, in key order.
    pub fn records(&self, table: &str) -> Result<Vec<Record>> {
        Ok(self
            .table(table)?
            .iter()
            .map(|(_, record)| record.clone())
            .collect())
    }

    pub(crate) fn into_tables(self) -> OrdMap<String, Table> {
        self.tables
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn changes_stay_private_to_the_transaction() {
        let mut committed = OrdMap::new();
        let mut maps = Table::new(TableDef::new("maps", "id"));
        maps.add(Record::from_json(json!({"id": "m1", "name": "cave"})).unwrap())
            .unwrap();
        committed.insert("maps".to_string(), maps);

        let mut tx = StepTransaction::new(2, committed.clone());
        tx.table_mut("maps")
            .unwrap()
            .update("m1", Record::new().with("name", "forest"));
        tx.create_table(TableDef::new("assets", "id")).unwrap();

        assert_eq!(
            committed.get("maps").unwrap().get("m1").unwrap().get_str("name"),
            Some("cave")
        );
        assert!(!committed.contains_key("assets"));

        let tables = tx.into_tables();
        assert_eq!(
            tables.get("maps").unwrap().get("m1").unwrap().get_str("name"),
            Some("forest")
        );
    }

    #[test]
    fn create_table_rejects_existing_names() {
        let mut tx = StepTransaction::new(1, OrdMap::new());
        tx.create_table(TableDef::new("maps", "id")).unwrap();
        assert!(matches!(
            tx.create_table(TableDef::new("maps", "id")),
            Err(StoreError::TableExists(_))
        ));
    }
}
