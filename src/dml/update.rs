//! # UPDATE Statement Module
//!
//! Materialize-then-apply execution:
//!
//! 1. Drive the bound plan and collect every candidate row with the
//!    full joined row it was found in.
//! 2. Evaluate the SET list against each old row to build the new
//!    image; re-test an updatable view's check condition against it.
//! 3. Walk the referential cascade for each key change.
//! 4. Apply the accumulated mutation set, dependents first.
//!
//! Any failure before step 4 leaves every table untouched.

use crate::dml::cascade::{self, CascadeContext};
use crate::dml::rowset::MutationSet;
use crate::dml::trigger::{TriggerEvent, TriggerRegistry};
use crate::dml::{apply_mutations, collect_candidates, fire_after_statement};
use crate::expr::eval::{self, EvalScope};
use crate::expr::Expr;
use crate::plan::BoundPlan;
use crate::schema::{Catalog, TableDef};
use crate::session::Session;
use crate::storage::{MemTable, Store};
use crate::types::Value;
use eyre::{bail, Result};
use smallvec::SmallVec;
use std::cmp::Ordering;

/// One SET-list entry. Multi-column assignments pair a column list
/// with a row-valued expression; a sub-query source arrives as a row
/// of parameters bound by the statement layer.
#[derive(Debug, Clone)]
pub struct Assignment {
    pub columns: SmallVec<[usize; 2]>,
    pub value: Expr,
}

impl Assignment {
    pub fn set(column: usize, value: Expr) -> Self {
        Self {
            columns: SmallVec::from_slice(&[column]),
            value,
        }
    }

    pub fn set_row(columns: Vec<usize>, value: Expr) -> Self {
        Self {
            columns: SmallVec::from_vec(columns),
            value,
        }
    }
}

pub(crate) struct NewImage {
    pub row: Vec<Value>,
    pub set_columns: Vec<usize>,
    pub changed: Vec<usize>,
}

pub(crate) fn default_or_identity(table: &TableDef, storage: &mut MemTable, column: usize) -> Value {
    let col = &table.columns()[column];
    if col.is_identity() {
        Value::Int(storage.next_identity(column))
    } else {
        col.default_value().cloned().unwrap_or(Value::Null)
    }
}

/// Evaluate the SET list against the old row. The DEFAULT marker
/// restores the column default or regenerates an identity value, never
/// a literal NULL by accident.
pub(crate) fn new_row_image(
    table: &TableDef,
    storage: &mut MemTable,
    old: &[Value],
    assignments: &[Assignment],
    outer: &[Option<&[Value]>],
    params: &[Value],
) -> Result<NewImage> {
    let mut row = old.to_vec();
    let mut set_columns = Vec::new();
    let scope = EvalScope::new(outer, None, params);

    for assignment in assignments {
        match (&assignment.value, assignment.columns.len()) {
            (Expr::Default, 1) => {
                let c = assignment.columns[0];
                row[c] = default_or_identity(table, storage, c);
            }
            (Expr::Row(items), n) if items.len() == n => {
                for (item, &c) in items.iter().zip(&assignment.columns) {
                    row[c] = match item {
                        Expr::Default => default_or_identity(table, storage, c),
                        other => eval::eval(other, &scope)?,
                    };
                }
            }
            (expr, 1) => {
                row[assignment.columns[0]] = eval::eval(expr, &scope)?;
            }
            _ => bail!(
                "internal error: SET list arity mismatch on table '{}'",
                table.name()
            ),
        }
        set_columns.extend(assignment.columns.iter().copied());
    }

    let changed = set_columns
        .iter()
        .copied()
        .filter(|&c| old[c].key_cmp(&row[c]) != Ordering::Equal)
        .collect();
    Ok(NewImage {
        row,
        set_columns,
        changed,
    })
}

pub struct UpdateStatement {
    pub table: u64,
    pub plan: BoundPlan,
    /// Position of the target table's range variable in the plan.
    pub target_range: usize,
    pub assignments: Vec<Assignment>,
    /// Check condition of an updatable view, re-tested against every
    /// prospective new row before any mutation.
    pub check_condition: Option<Expr>,
}

impl UpdateStatement {
    pub fn execute(
        &self,
        catalog: &Catalog,
        store: &mut Store,
        triggers: &TriggerRegistry,
        session: &Session,
    ) -> Result<usize> {
        let table = catalog.table(self.table)?;
        let candidates = collect_candidates(&self.plan, self.target_range, catalog, store, session)?;

        let mut pending = MutationSet::new();
        let mut images = Vec::with_capacity(candidates.len());
        for (row_id, rows) in &candidates {
            let outer: Vec<Option<&[Value]>> = rows.iter().map(|r| r.as_deref()).collect();
            let old = match &rows[self.target_range] {
                Some(row) => row.clone(),
                None => bail!("internal error: update candidate without a target row"),
            };
            let image = new_row_image(
                table,
                store.table_mut(self.table)?,
                &old,
                &self.assignments,
                &outer,
                session.params(),
            )?;

            if let Some(check) = &self.check_condition {
                let mut check_rows = outer.clone();
                check_rows[self.target_range] = Some(&image.row);
                let scope = EvalScope::new(&check_rows, None, session.params());
                if !eval::test(check, &scope)? {
                    bail!("CHECK OPTION violated for '{}'", table.name());
                }
            }
            cascade::check_child_references(catalog, store, table, &image.row, Some(&image.changed))?;

            pending.table_mut(self.table).queue_update(
                table,
                *row_id,
                old.clone(),
                image.row.clone(),
                &image.set_columns,
            )?;
            images.push((*row_id, old, image));
        }
        // Distinct target rows: a join plan can surface the same row in
        // several candidates, and cascades may add entries of their own
        // to this table's set.
        let updated = pending.table(self.table).map_or(0, |set| set.len());

        {
            let store_ref: &Store = store;
            let mut ctx = CascadeContext::new(catalog, store_ref, &mut pending);
            for (row_id, old, image) in &images {
                cascade::cascade_update(&mut ctx, self.table, *row_id, old, &image.row, &image.changed)?;
            }
        }

        let applied = apply_mutations(store, catalog, triggers, pending, self.table)?;
        fire_after_statement(triggers, table, TriggerEvent::Update, &applied, self.table)?;
        Ok(updated)
    }
}
