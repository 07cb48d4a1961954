//! # In-Memory Table Module
//!
//! `MemTable` keeps the row heap in a `BTreeMap` ordered by row id (the
//! physical-position analogue) and one ordered map per secondary index.
//! Probes materialize their candidate set into a `Cursor`, so a
//! statement that mutates rows mid-iteration still sees the snapshot it
//! opened. DELETE relies on this.
//!
//! ## Index key ordering
//!
//! Keys order by `Value::key_cmp`, which sorts NULL lowest. Range probes
//! therefore skip the leading NULL run; equality probes with a NULL key
//! open empty, since NULL never matches an index condition.

use crate::schema::{IndexDef, TableDef};
use crate::types::Value;
use eyre::{bail, Result};
use hashbrown::HashMap;
use smallvec::SmallVec;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use crate::expr::CmpOp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowId(pub u64);

/// External row-visibility predicate, consulted on every row fetch.
/// MVCC or deleted-row filtering plugs in here; this core holds no
/// locks and no version state of its own.
pub trait Visibility {
    fn is_visible(&self, row: RowId) -> bool;
}

#[derive(Debug, Default)]
pub struct AllVisible;

impl Visibility for AllVisible {
    fn is_visible(&self, _row: RowId) -> bool {
        true
    }
}

/// Composite index key with a total order over values.
#[derive(Debug, Clone)]
pub struct IndexKey(pub SmallVec<[Value; 2]>);

impl IndexKey {
    fn cmp_values(&self, other: &IndexKey) -> Ordering {
        for (a, b) in self.0.iter().zip(other.0.iter()) {
            match a.key_cmp(b) {
                Ordering::Equal => continue,
                other => return other,
            }
        }
        self.0.len().cmp(&other.0.len())
    }

    fn starts_with(&self, prefix: &[Value]) -> Option<Ordering> {
        for (a, b) in self.0.iter().zip(prefix.iter()) {
            match a.key_cmp(b) {
                Ordering::Equal => continue,
                other => return Some(other),
            }
        }
        None
    }
}

impl PartialEq for IndexKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp_values(other) == Ordering::Equal
    }
}

impl Eq for IndexKey {}

impl PartialOrd for IndexKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp_values(other))
    }
}

impl Ord for IndexKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.cmp_values(other)
    }
}

/// A materialized scan or probe result, fetched row by row.
#[derive(Debug, Default)]
pub struct Cursor {
    rows: Vec<(RowId, Vec<Value>)>,
    pos: usize,
}

impl Cursor {
    pub fn empty() -> Self {
        Self::default()
    }

    fn from_rows(rows: Vec<(RowId, Vec<Value>)>) -> Self {
        Self { rows, pos: 0 }
    }

    pub fn next(&mut self) -> Option<(RowId, Vec<Value>)> {
        if self.pos < self.rows.len() {
            let item = std::mem::replace(&mut self.rows[self.pos], (RowId(0), Vec::new()));
            self.pos += 1;
            Some(item)
        } else {
            None
        }
    }
}

#[derive(Debug)]
pub struct MemTable {
    table_id: u64,
    next_row_id: u64,
    rows: BTreeMap<RowId, Vec<Value>>,
    index_defs: Vec<IndexDef>,
    indexes: Vec<BTreeMap<IndexKey, BTreeSet<RowId>>>,
    identity_state: HashMap<usize, i64>,
}

impl MemTable {
    pub fn new(table: &TableDef) -> Self {
        let index_defs: Vec<IndexDef> = table.indexes().to_vec();
        let indexes = index_defs.iter().map(|_| BTreeMap::new()).collect();
        Self {
            table_id: table.id(),
            next_row_id: 1,
            rows: BTreeMap::new(),
            index_defs,
            indexes,
            identity_state: HashMap::new(),
        }
    }

    pub fn table_id(&self) -> u64 {
        self.table_id
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn get(&self, row: RowId) -> Option<&[Value]> {
        self.rows.get(&row).map(|r| r.as_slice())
    }

    /// Next value of a column's identity generator.
    pub fn next_identity(&mut self, column: usize) -> i64 {
        let counter = self.identity_state.entry(column).or_insert(0);
        *counter += 1;
        *counter
    }

    fn build_key(&self, index: usize, row: &[Value]) -> IndexKey {
        let cols = self.index_defs[index].columns();
        IndexKey(cols.iter().map(|&c| row[c].clone()).collect())
    }

    pub fn insert(&mut self, values: Vec<Value>) -> RowId {
        let id = RowId(self.next_row_id);
        self.next_row_id += 1;
        for i in 0..self.index_defs.len() {
            let key = self.build_key(i, &values);
            self.indexes[i].entry(key).or_default().insert(id);
        }
        self.rows.insert(id, values);
        id
    }

    pub fn delete(&mut self, row: RowId) -> Option<Vec<Value>> {
        let values = self.rows.remove(&row)?;
        for i in 0..self.index_defs.len() {
            let key = self.build_key(i, &values);
            if let Some(ids) = self.indexes[i].get_mut(&key) {
                ids.remove(&row);
                if ids.is_empty() {
                    self.indexes[i].remove(&key);
                }
            }
        }
        Some(values)
    }

    pub fn update(&mut self, row: RowId, new_values: Vec<Value>) -> Result<()> {
        let old = match self.rows.get(&row) {
            Some(v) => v.clone(),
            None => bail!("internal error: update of missing row {:?}", row),
        };
        for i in 0..self.index_defs.len() {
            let old_key = self.build_key(i, &old);
            let new_key = self.build_key(i, &new_values);
            if old_key != new_key {
                if let Some(ids) = self.indexes[i].get_mut(&old_key) {
                    ids.remove(&row);
                    if ids.is_empty() {
                        self.indexes[i].remove(&old_key);
                    }
                }
                self.indexes[i].entry(new_key).or_default().insert(row);
            }
        }
        self.rows.insert(row, new_values);
        Ok(())
    }

    /// Full scan in row-id order.
    pub fn scan(&self) -> Cursor {
        Cursor::from_rows(
            self.rows
                .iter()
                .map(|(id, row)| (*id, row.clone()))
                .collect(),
        )
    }

    /// Composite equality probe on a leading prefix of the index's
    /// columns. A NULL key value matches nothing.
    pub fn probe_equal(&self, index: usize, keys: &[Value]) -> Cursor {
        if keys.iter().any(Value::is_null) {
            return Cursor::empty();
        }
        let mut out = Vec::new();
        self.collect_equal(index, keys, &mut out);
        Cursor::from_rows(out)
    }

    /// One equality probe per listed value, concatenated in list order.
    pub fn probe_in(&self, index: usize, values: &[Value]) -> Cursor {
        let mut out = Vec::new();
        for v in values {
            if v.is_null() {
                continue;
            }
            self.collect_equal(index, std::slice::from_ref(v), &mut out);
        }
        Cursor::from_rows(out)
    }

    fn collect_equal(&self, index: usize, keys: &[Value], out: &mut Vec<(RowId, Vec<Value>)>) {
        for (key, ids) in &self.indexes[index] {
            match key.starts_with(keys) {
                Some(Ordering::Less) => continue,
                Some(Ordering::Greater) => break,
                Some(Ordering::Equal) | None => {}
            }
            for id in ids {
                if let Some(row) = self.rows.get(id) {
                    out.push((*id, row.clone()));
                }
            }
        }
    }

    /// Directional range probe on the index's first column, ascending.
    /// Leading NULL keys are always excluded; `start` is the lower
    /// bound, if any. Upper bounds are the caller's end condition,
    /// re-tested per fetched row.
    pub fn probe_range(&self, index: usize, start: Option<(CmpOp, &Value)>) -> Cursor {
        let mut out = Vec::new();
        for (key, ids) in &self.indexes[index] {
            let first = match key.0.first() {
                Some(v) => v,
                None => continue,
            };
            if first.is_null() {
                continue;
            }
            if let Some((op, bound)) = start {
                match first.key_cmp(bound) {
                    Ordering::Less => continue,
                    Ordering::Equal if op == CmpOp::Gt => continue,
                    _ => {}
                }
            }
            for id in ids {
                if let Some(row) = self.rows.get(id) {
                    out.push((*id, row.clone()));
                }
            }
        }
        Cursor::from_rows(out)
    }
}

/// All in-memory tables of the engine, keyed by table id.
#[derive(Debug, Default)]
pub struct Store {
    tables: HashMap<u64, MemTable>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_table(&mut self, table: &TableDef) {
        self.tables.insert(table.id(), MemTable::new(table));
    }

    pub fn table(&self, id: u64) -> Result<&MemTable> {
        match self.tables.get(&id) {
            Some(t) => Ok(t),
            None => bail!("internal error: no storage for table id {}", id),
        }
    }

    pub fn table_mut(&mut self, id: u64) -> Result<&mut MemTable> {
        match self.tables.get_mut(&id) {
            Some(t) => Ok(t),
            None => bail!("internal error: no storage for table id {}", id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnDef, TableDef};
    use crate::types::DataType;

    fn indexed_table() -> MemTable {
        let mut def = TableDef::new(
            "t",
            vec![
                ColumnDef::new("id", DataType::Int8),
                ColumnDef::new("grp", DataType::Int8),
                ColumnDef::new("name", DataType::Text),
            ],
        )
        .with_index(IndexDef::new("idx_grp_name", vec![1, 2], false));
        def.assign_id(0);
        let mut t = MemTable::new(&def);
        t.insert(vec![Value::Int(1), Value::Int(10), Value::Text("a".into())]);
        t.insert(vec![Value::Int(2), Value::Int(10), Value::Text("b".into())]);
        t.insert(vec![Value::Int(3), Value::Int(20), Value::Text("a".into())]);
        t.insert(vec![Value::Int(4), Value::Null, Value::Text("z".into())]);
        t
    }

    fn drain(mut cursor: Cursor) -> Vec<i64> {
        let mut out = Vec::new();
        while let Some((_, row)) = cursor.next() {
            match &row[0] {
                Value::Int(i) => out.push(*i),
                other => panic!("unexpected id {:?}", other),
            }
        }
        out
    }

    #[test]
    fn equality_probe_on_prefix() {
        let t = indexed_table();
        let mut hits = drain(t.probe_equal(0, &[Value::Int(10)]));
        hits.sort_unstable();
        assert_eq!(hits, vec![1, 2]);

        let hits = drain(t.probe_equal(0, &[Value::Int(10), Value::Text("b".into())]));
        assert_eq!(hits, vec![2]);
    }

    #[test]
    fn null_probe_key_matches_nothing() {
        let t = indexed_table();
        assert!(drain(t.probe_equal(0, &[Value::Null])).is_empty());
    }

    #[test]
    fn range_probe_skips_nulls() {
        let t = indexed_table();
        let hits = drain(t.probe_range(0, None));
        assert_eq!(hits.len(), 3, "NULL group key must not appear");

        let hits = drain(t.probe_range(0, Some((CmpOp::Gt, &Value::Int(10)))));
        assert_eq!(hits, vec![3]);

        let hits = drain(t.probe_range(0, Some((CmpOp::Ge, &Value::Int(10)))));
        assert_eq!(hits.len(), 3);
    }

    #[test]
    fn update_maintains_indexes() {
        let mut t = indexed_table();
        t.update(
            RowId(1),
            vec![Value::Int(1), Value::Int(20), Value::Text("a".into())],
        )
        .unwrap();
        let mut hits = drain(t.probe_equal(0, &[Value::Int(20)]));
        hits.sort_unstable();
        assert_eq!(hits, vec![1, 3]);
        assert_eq!(drain(t.probe_equal(0, &[Value::Int(10)])), vec![2]);
    }

    #[test]
    fn delete_removes_index_entries() {
        let mut t = indexed_table();
        assert!(t.delete(RowId(2)).is_some());
        assert_eq!(drain(t.probe_equal(0, &[Value::Int(10)])), vec![1]);
        assert!(t.delete(RowId(2)).is_none());
    }
}
