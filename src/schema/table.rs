//! # Table Definition Module
//!
//! Core schema definition types for tables, columns and indexes. These
//! describe the structure of database objects; they carry no row data.
//!
//! ## Overview
//!
//! - **Tables**: named collections of columns with an optional primary key
//!   and any number of secondary indexes
//! - **Columns**: typed fields with nullability, a declared default, and
//!   an optional identity generator
//! - **Indexes**: ordered multi-column B-tree-equivalent access paths
//!
//! Index and key columns are referenced by position, not name; name
//! resolution happens once when a definition is built.
//!
//! ## Example
//!
//! ```rust,ignore
//! use cascara::schema::{ColumnDef, IndexDef, TableDef};
//! use cascara::types::DataType;
//!
//! let table = TableDef::new("users", vec![
//!     ColumnDef::new("id", DataType::Int8).not_null().identity(),
//!     ColumnDef::new("email", DataType::Text).not_null(),
//!     ColumnDef::new("plan", DataType::Text).with_default("free"),
//! ])
//! .with_primary_key(vec![0])
//! .with_index(IndexDef::new("idx_users_email", vec![1], true));
//! ```
//!
//! ## Thread Safety
//!
//! Definitions are immutable after construction and `Clone`. The catalog
//! wraps them in locks for concurrent access; compiled statements share
//! them read-only across sessions.

use crate::types::{DataType, Value};

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    name: String,
    data_type: DataType,
    nullable: bool,
    default_value: Option<Value>,
    identity: bool,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: true,
            default_value: None,
            identity: false,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default_value = Some(default.into());
        self
    }

    pub fn identity(mut self) -> Self {
        self.identity = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn default_value(&self) -> Option<&Value> {
        self.default_value.as_ref()
    }

    pub fn is_identity(&self) -> bool {
        self.identity
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexDef {
    name: String,
    columns: Vec<usize>,
    is_unique: bool,
}

impl IndexDef {
    pub fn new(name: impl Into<String>, columns: Vec<usize>, is_unique: bool) -> Self {
        Self {
            name: name.into(),
            columns,
            is_unique,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[usize] {
        &self.columns
    }

    pub fn is_unique(&self) -> bool {
        self.is_unique
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableDef {
    id: u64,
    name: String,
    columns: Vec<ColumnDef>,
    primary_key: Option<Vec<usize>>,
    indexes: Vec<IndexDef>,
}

impl TableDef {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnDef>) -> Self {
        Self {
            id: 0,
            name: name.into(),
            columns,
            primary_key: None,
            indexes: Vec::new(),
        }
    }

    pub fn with_primary_key(mut self, columns: Vec<usize>) -> Self {
        self.primary_key = Some(columns);
        self
    }

    pub fn with_index(mut self, index: IndexDef) -> Self {
        self.indexes.push(index);
        self
    }

    pub(crate) fn assign_id(&mut self, id: u64) {
        self.id = id;
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn primary_key(&self) -> Option<&[usize]> {
        self.primary_key.as_deref()
    }

    pub fn indexes(&self) -> &[IndexDef] {
        &self.indexes
    }

    pub fn get_column(&self, idx: usize) -> Option<&ColumnDef> {
        self.columns.get(idx)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name().eq_ignore_ascii_case(name))
    }
}
