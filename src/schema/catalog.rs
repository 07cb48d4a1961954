//! # Catalog Module
//!
//! The catalog owns every table definition and every referential
//! constraint, assigns table ids and constraint ids, and answers the two
//! lookups the cascade walker lives on: "which constraints reference
//! table T" and "which constraints are owned by table T".

use crate::schema::{ForeignKeyDef, TableDef};
use eyre::{bail, Result};
use hashbrown::HashMap;

#[derive(Debug, Default)]
pub struct Catalog {
    tables: Vec<TableDef>,
    by_name: HashMap<String, u64>,
    foreign_keys: Vec<ForeignKeyDef>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_table(&mut self, mut table: TableDef) -> Result<u64> {
        let key = table.name().to_ascii_lowercase();
        if self.by_name.contains_key(&key) {
            bail!("table '{}' already exists", table.name());
        }
        let id = self.tables.len() as u64;
        table.assign_id(id);
        self.by_name.insert(key, id);
        self.tables.push(table);
        Ok(id)
    }

    pub fn table(&self, id: u64) -> Result<&TableDef> {
        match self.tables.get(id as usize) {
            Some(t) => Ok(t),
            None => bail!("internal error: unknown table id {}", id),
        }
    }

    pub fn resolve_table(&self, name: &str) -> Result<&TableDef> {
        match self.by_name.get(&name.to_ascii_lowercase()) {
            Some(&id) => Ok(&self.tables[id as usize]),
            None => bail!("table '{}' does not exist", name),
        }
    }

    pub fn tables(&self) -> &[TableDef] {
        &self.tables
    }

    pub fn add_foreign_key(&mut self, fk: ForeignKeyDef) -> Result<usize> {
        let child = self.table(fk.child_table())?;
        let parent = self.table(fk.parent_table())?;
        if fk.child_columns().len() != fk.parent_columns().len() {
            bail!(
                "foreign key '{}' column count mismatch between '{}' and '{}'",
                fk.name(),
                child.name(),
                parent.name()
            );
        }
        let id = self.foreign_keys.len();
        self.foreign_keys.push(fk);
        Ok(id)
    }

    pub fn foreign_key(&self, id: usize) -> &ForeignKeyDef {
        &self.foreign_keys[id]
    }

    pub fn foreign_keys(&self) -> &[ForeignKeyDef] {
        &self.foreign_keys
    }

    /// Constraints whose referenced (parent) side is `table_id`, with
    /// their constraint ids. These are the constraints a DELETE or a
    /// key UPDATE on that table must walk.
    pub fn referencing(&self, table_id: u64) -> impl Iterator<Item = (usize, &ForeignKeyDef)> {
        self.foreign_keys
            .iter()
            .enumerate()
            .filter(move |(_, fk)| fk.parent_table() == table_id)
    }

    /// Constraints whose child (referencing) side is `table_id`.
    pub fn owned_by(&self, table_id: u64) -> impl Iterator<Item = (usize, &ForeignKeyDef)> {
        self.foreign_keys
            .iter()
            .enumerate()
            .filter(move |(_, fk)| fk.child_table() == table_id)
    }
}
