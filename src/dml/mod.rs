//! # DML Module
//!
//! Statement execution over bound plans. Mutating statements share one
//! discipline: materialize candidates, compute the complete mutation
//! set including every referential cascade, then apply. A statement
//! that fails during compute leaves all tables untouched; failure
//! during apply relies on the surrounding transaction's rollback.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │ 1. Iterate the plan, materialize candidate rows        │
//! ├────────────────────────────────────────────────────────┤
//! │ 2. Compute new images, validate check conditions       │
//! ├────────────────────────────────────────────────────────┤
//! │ 3. Walk referential cascades into pending row-sets     │
//! ├────────────────────────────────────────────────────────┤
//! │ 4. Apply: dependent tables first, own table last,      │
//! │    BEFORE row triggers inline, AFTER triggers once     │
//! └────────────────────────────────────────────────────────┘
//! ```

pub mod cascade;
mod delete;
mod merge;
mod rowset;
mod trigger;
mod update;

pub use delete::DeleteStatement;
pub use merge::MergeStatement;
pub use rowset::{MutationSet, PendingRow, PendingRowSet};
pub use trigger::{AfterStatementFn, BeforeRowFn, RowChange, TriggerEvent, TriggerRegistry};
pub use update::{Assignment, UpdateStatement};

use crate::exec::{JoinedRowIterator, RangeIterator};
use crate::expr::Expr;
use crate::plan::BoundPlan;
use crate::schema::{Catalog, TableDef};
use crate::session::Session;
use crate::storage::{RowId, Store};
use crate::types::Value;
use eyre::Result;

/// A row-returning statement: the bound plan plus output expressions.
/// An empty output list yields every column of the composed row.
pub struct QueryStatement {
    pub plan: BoundPlan,
    pub outputs: Vec<Expr>,
}

pub enum Statement {
    Query(QueryStatement),
    Update(UpdateStatement),
    Delete(DeleteStatement),
    Merge(MergeStatement),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExecuteResult {
    RowCount(usize),
    Rows(Vec<Vec<Value>>),
}

impl ExecuteResult {
    pub fn row_count(&self) -> usize {
        match self {
            ExecuteResult::RowCount(n) => *n,
            ExecuteResult::Rows(rows) => rows.len(),
        }
    }
}

/// Fresh per-execution iterators for every range variable of a plan.
pub(crate) fn build_iterators<'a>(
    plan: &'a BoundPlan,
    catalog: &'a Catalog,
    store: &'a Store,
    session: &'a Session,
) -> Result<JoinedRowIterator<'a>> {
    let mut iters = Vec::with_capacity(plan.ranges().len());
    for rv in plan.ranges() {
        iters.push(RangeIterator::new(
            rv,
            catalog.table(rv.table())?,
            store.table(rv.table())?,
            session.visibility(),
            session.params(),
            session.interrupted(),
        ));
    }
    Ok(JoinedRowIterator::new(
        iters,
        session.params(),
        session.interrupted(),
    ))
}

/// Drive the plan to completion and snapshot every joined row whose
/// target range variable holds a real row. Mutating statements work
/// from this snapshot, never from a live scan.
pub(crate) fn collect_candidates(
    plan: &BoundPlan,
    target_range: usize,
    catalog: &Catalog,
    store: &Store,
    session: &Session,
) -> Result<Vec<(RowId, Vec<Option<Vec<Value>>>)>> {
    let mut joined = build_iterators(plan, catalog, store, session)?;
    let mut out = Vec::new();
    while joined.advance()? {
        let Some((Some(row_id), _)) = joined.current(target_range) else {
            continue;
        };
        let rows = (0..joined.width())
            .map(|i| joined.current(i).map(|(_, row)| row.to_vec()))
            .collect();
        out.push((row_id, rows));
    }
    Ok(out)
}

/// Apply a computed mutation set: dependent tables in first-touch
/// order, the statement's own table last. BEFORE row triggers may
/// rewrite an update's new values; the returned set reflects what was
/// actually written.
pub(crate) fn apply_mutations(
    store: &mut Store,
    catalog: &Catalog,
    triggers: &TriggerRegistry,
    mut pending: MutationSet,
    own_table: u64,
) -> Result<MutationSet> {
    let order = pending.table_ids();
    for &table_id in order
        .iter()
        .filter(|&&t| t != own_table)
        .chain(order.iter().filter(|&&t| t == own_table))
    {
        apply_table(store, catalog, triggers, &mut pending, table_id)?;
    }
    Ok(pending)
}

fn apply_table(
    store: &mut Store,
    catalog: &Catalog,
    triggers: &TriggerRegistry,
    pending: &mut MutationSet,
    table_id: u64,
) -> Result<()> {
    let table = catalog.table(table_id)?;
    let set = pending.table_mut(table_id);
    for row_id in set.row_ids() {
        let (delete, old, new) = match set.get(row_id) {
            Some(p) => (p.delete, p.old.clone(), p.new.clone()),
            None => continue,
        };
        if delete {
            triggers.fire_before_row(table, TriggerEvent::Delete, Some(&old), None)?;
            store.table_mut(table_id)?.delete(row_id);
        } else if let Some(mut new) = new {
            triggers.fire_before_row(table, TriggerEvent::Update, Some(&old), Some(&mut new))?;
            store.table_mut(table_id)?.update(row_id, new.clone())?;
            if let Some(p) = set.get_mut(row_id) {
                p.new = Some(new);
            }
        }
    }
    Ok(())
}

/// AFTER statement triggers fire once, against the accumulated
/// row-set of the statement's own table.
pub(crate) fn fire_after_statement(
    triggers: &TriggerRegistry,
    table: &TableDef,
    event: TriggerEvent,
    applied: &MutationSet,
    own_table: u64,
) -> Result<()> {
    let changes: Vec<RowChange> = applied
        .table(own_table)
        .map(|set| {
            set.iter()
                .map(|(row_id, p)| RowChange {
                    row_id,
                    old: p.old.clone(),
                    new: p.new.clone(),
                })
                .collect()
        })
        .unwrap_or_default();
    triggers.fire_after_statement(table, event, &changes)
}
