//! Pending row-sets: the per-execution accumulation of proposed row
//! images built while walking a cascade. Nothing here touches storage;
//! the apply phase consumes the finished set.

use crate::schema::TableDef;
use crate::storage::RowId;
use crate::types::Value;
use eyre::{bail, Result};
use hashbrown::HashMap;
use std::cmp::Ordering;

/// One proposed mutation. `new` is `None` for a delete; `set_mask`
/// records which columns a proposal actually assigned, so two partial
/// proposals can merge column-wise.
#[derive(Debug)]
pub struct PendingRow {
    pub old: Vec<Value>,
    pub new: Option<Vec<Value>>,
    pub set_mask: Vec<bool>,
    pub delete: bool,
}

/// Per-table collection of pending mutations, in first-touch order.
#[derive(Debug, Default)]
pub struct PendingRowSet {
    order: Vec<RowId>,
    rows: HashMap<RowId, PendingRow>,
}

impl PendingRowSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, row: RowId) -> bool {
        self.rows.contains_key(&row)
    }

    pub fn is_delete(&self, row: RowId) -> bool {
        self.rows.get(&row).is_some_and(|p| p.delete)
    }

    pub fn get(&self, row: RowId) -> Option<&PendingRow> {
        self.rows.get(&row)
    }

    pub fn get_mut(&mut self, row: RowId) -> Option<&mut PendingRow> {
        self.rows.get_mut(&row)
    }

    pub fn row_ids(&self) -> Vec<RowId> {
        self.order.clone()
    }

    pub fn iter(&self) -> impl Iterator<Item = (RowId, &PendingRow)> {
        self.order.iter().map(move |rid| (*rid, &self.rows[rid]))
    }

    /// A delete supersedes any update already proposed for the row.
    pub fn queue_delete(&mut self, row: RowId, old: Vec<Value>) {
        match self.rows.get_mut(&row) {
            Some(pending) => {
                pending.delete = true;
                pending.new = None;
            }
            None => {
                let width = old.len();
                self.order.push(row);
                self.rows.insert(
                    row,
                    PendingRow {
                        old,
                        new: None,
                        set_mask: vec![false; width],
                        delete: true,
                    },
                );
            }
        }
    }

    /// Queue a proposed new image for `columns` of the row. A second
    /// proposal for the same row merges column-wise; proposals that
    /// disagree on a column both set fail the statement. Proposals
    /// against a row already pending deletion are dropped.
    pub fn queue_update(
        &mut self,
        table: &TableDef,
        row: RowId,
        old: Vec<Value>,
        new: Vec<Value>,
        columns: &[usize],
    ) -> Result<()> {
        match self.rows.get_mut(&row) {
            Some(pending) => {
                if pending.delete {
                    return Ok(());
                }
                let image = match pending.new.as_mut() {
                    Some(image) => image,
                    None => bail!("internal error: pending update without a row image"),
                };
                for &c in columns {
                    if pending.set_mask[c] {
                        if image[c].key_cmp(&new[c]) != Ordering::Equal {
                            bail!(
                                "triggered data change violation: conflicting assignments \
                                 to column '{}' of table '{}'",
                                table.columns()[c].name(),
                                table.name()
                            );
                        }
                    } else {
                        image[c] = new[c].clone();
                        pending.set_mask[c] = true;
                    }
                }
            }
            None => {
                let mut set_mask = vec![false; old.len()];
                for &c in columns {
                    set_mask[c] = true;
                }
                self.order.push(row);
                self.rows.insert(
                    row,
                    PendingRow {
                        old,
                        new: Some(new),
                        set_mask,
                        delete: false,
                    },
                );
            }
        }
        Ok(())
    }
}

/// All pending row-sets of one statement execution, keyed by table in
/// first-touch order. The statement's own table applies last.
#[derive(Debug, Default)]
pub struct MutationSet {
    tables: Vec<(u64, PendingRowSet)>,
}

impl MutationSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(&self, table_id: u64) -> Option<&PendingRowSet> {
        self.tables
            .iter()
            .find(|(id, _)| *id == table_id)
            .map(|(_, set)| set)
    }

    pub fn table_mut(&mut self, table_id: u64) -> &mut PendingRowSet {
        if let Some(i) = self.tables.iter().position(|(id, _)| *id == table_id) {
            return &mut self.tables[i].1;
        }
        let i = self.tables.len();
        self.tables.push((table_id, PendingRowSet::new()));
        &mut self.tables[i].1
    }

    pub fn iter(&self) -> impl Iterator<Item = &(u64, PendingRowSet)> {
        self.tables.iter()
    }

    pub fn table_ids(&self) -> Vec<u64> {
        self.tables.iter().map(|(id, _)| *id).collect()
    }
}
