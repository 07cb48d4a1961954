//! # Access Planning Module
//!
//! Compile-time binding of a statement's FROM clause. Each table
//! reference becomes a [`RangeVariable`]: its join kind, its chosen
//! access path, and the predicates left over as residual conditions.
//! The resolver in [`resolver`] performs the classification; the
//! executor consumes the result without re-planning.
//!
//! A bound plan is immutable after compilation and may be shared
//! read-only across concurrent executions of the same prepared
//! statement. All per-execution state lives in the iterators.

mod index_selection;
pub mod resolver;

pub use resolver::compile;

use crate::expr::{CmpOp, Expr};
use crate::schema::Catalog;
use crate::types::Value;
use eyre::Result;
use std::fmt::Write as _;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
}

impl JoinType {
    pub fn is_outer(&self) -> bool {
        !matches!(self, JoinType::Inner)
    }

    /// True when this table null-extends itself on a missed match
    /// during the primary pass.
    pub fn null_extends_self(&self) -> bool {
        matches!(self, JoinType::Left | JoinType::Full)
    }

    /// True when unmatched rows of this table are recovered by a
    /// second pass over the table after the primary pass completes.
    pub fn needs_second_pass(&self) -> bool {
        matches!(self, JoinType::Right | JoinType::Full)
    }

    fn describe(&self) -> &'static str {
        match self {
            JoinType::Inner => "inner",
            JoinType::Left => "left outer",
            JoinType::Right => "right outer",
            JoinType::Full => "full outer",
        }
    }
}

/// One FROM-clause table reference as handed to the resolver, in
/// declaration order. The join condition of the first declaration must
/// be empty; its join type must be `Inner`.
#[derive(Debug, Clone)]
pub struct RangeDecl {
    pub table: u64,
    pub alias: Option<String>,
    pub join_type: JoinType,
    pub on: Option<Expr>,
}

impl RangeDecl {
    pub fn table(table: u64) -> Self {
        Self {
            table,
            alias: None,
            join_type: JoinType::Inner,
            on: None,
        }
    }

    pub fn joined(table: u64, join_type: JoinType, on: Option<Expr>) -> Self {
        Self {
            table,
            alias: None,
            join_type,
            on,
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }
}

/// The scan strategy bound to one condition set.
#[derive(Debug, Clone, Default)]
pub enum AccessPath {
    #[default]
    FullScan,
    /// Composite probe on the leading columns of an index. Key
    /// expressions may reference earlier range variables and are
    /// evaluated each time the iterator opens.
    IndexEquality { index: usize, keys: Vec<Expr> },
    /// Ascending scan of an index from an optional lower bound. Upper
    /// bounds live in the owning set's end condition.
    IndexRange {
        index: usize,
        start: Option<(CmpOp, Expr)>,
    },
    /// One equality probe per listed constant, in key order.
    InProbe { index: usize, values: Vec<Value> },
}

/// Conditions bound to one access path of a range variable.
///
/// The end condition is re-tested on every fetched row; a false result
/// terminates the scan. The join residual skips a failing row without
/// canceling a pending null-extended outer row; the where residual
/// also cancels it.
#[derive(Debug, Clone, Default)]
pub struct ConditionSet {
    pub access: AccessPath,
    pub end_condition: Option<Expr>,
    pub join_residual: Option<Expr>,
    pub where_residual: Option<Expr>,
}

/// The compiled binding of one table reference. Immutable after
/// compilation; multiple condition sets exist only to serve OR-driven
/// alternative access paths and must select disjoint rows.
#[derive(Debug)]
pub struct RangeVariable {
    position: usize,
    table: u64,
    alias: Option<String>,
    join_type: JoinType,
    condition_sets: Vec<ConditionSet>,
}

impl RangeVariable {
    pub fn new(
        position: usize,
        table: u64,
        alias: Option<String>,
        join_type: JoinType,
        condition_sets: Vec<ConditionSet>,
    ) -> Self {
        Self {
            position,
            table,
            alias,
            join_type,
            condition_sets,
        }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn table(&self) -> u64 {
        self.table
    }

    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    pub fn join_type(&self) -> JoinType {
        self.join_type
    }

    pub fn condition_sets(&self) -> &[ConditionSet] {
        &self.condition_sets
    }
}

#[derive(Debug)]
pub struct BoundPlan {
    ranges: Vec<RangeVariable>,
}

impl BoundPlan {
    pub(crate) fn new(ranges: Vec<RangeVariable>) -> Self {
        Self { ranges }
    }

    pub fn ranges(&self) -> &[RangeVariable] {
        &self.ranges
    }

    pub fn range(&self, position: usize) -> &RangeVariable {
        &self.ranges[position]
    }

    /// Human-readable access path text, one line per range variable.
    /// Diagnostic only; the format is not stable.
    pub fn describe(&self, catalog: &Catalog) -> Result<String> {
        let mut out = String::new();
        for rv in &self.ranges {
            let table = catalog.table(rv.table)?;
            let _ = write!(out, "range {}: table '{}'", rv.position, table.name());
            if let Some(alias) = rv.alias() {
                let _ = write!(out, " as '{}'", alias);
            }
            let _ = write!(out, " ({} join)", rv.join_type.describe());
            for set in &rv.condition_sets {
                let _ = match &set.access {
                    AccessPath::FullScan => write!(out, "\n  full scan"),
                    AccessPath::IndexEquality { index, keys } => write!(
                        out,
                        "\n  equality probe on index '{}' ({} of {} columns)",
                        table.indexes()[*index].name(),
                        keys.len(),
                        table.indexes()[*index].columns().len()
                    ),
                    AccessPath::IndexRange { index, start } => write!(
                        out,
                        "\n  range scan on index '{}' ({})",
                        table.indexes()[*index].name(),
                        match start {
                            Some((op, e)) => format!("start {} {}", op, e),
                            None => "not null".to_string(),
                        }
                    ),
                    AccessPath::InProbe { index, values } => write!(
                        out,
                        "\n  enumerated probe on index '{}' ({} values)",
                        table.indexes()[*index].name(),
                        values.len()
                    ),
                };
                if let Some(e) = &set.end_condition {
                    let _ = write!(out, "\n  end condition: {}", e);
                }
                if let Some(e) = &set.join_residual {
                    let _ = write!(out, "\n  join residual: {}", e);
                }
                if let Some(e) = &set.where_residual {
                    let _ = write!(out, "\n  where residual: {}", e);
                }
            }
            out.push('\n');
        }
        Ok(out)
    }
}
