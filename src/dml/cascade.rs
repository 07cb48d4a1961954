//! # Referential Cascade Module
//!
//! Walks the foreign-key graph from each changed or deleted row and
//! accumulates the full set of dependent mutations before anything is
//! applied.
//!
//! ```text
//! DELETE row ──▶ for each constraint referencing its table:
//!   RESTRICT / NO ACTION  fail if any referencing row exists
//!   CASCADE               queue delete, recurse into the child row
//!   SET NULL / DEFAULT    rewrite FK columns, walk the rewrite as an
//!                         update, queue it
//! ```
//!
//! Cycle safety uses two guards. Cascaded deletes stop at rows already
//! pending deletion, which lets a self-referencing CASCADE chain run
//! to its full transitive closure. Update-shaped walks (CASCADE update,
//! SET NULL, SET DEFAULT) thread a visited-constraint path: a
//! constraint already on the active recursion branch is skipped, but
//! may be revisited via a disjoint branch later in the same statement.
//!
//! The two walks recurse into each other: a SET NULL delete starts a
//! nested update walk on the rewritten child row. The path is passed
//! by reference through both, never held in global state.

use crate::dml::rowset::MutationSet;
use crate::schema::{Catalog, ForeignKeyDef, ReferentialAction, TableDef};
use crate::storage::{RowId, Store};
use crate::types::Value;
use eyre::{bail, Result};
use std::cmp::Ordering;

pub struct CascadeContext<'a> {
    catalog: &'a Catalog,
    store: &'a Store,
    pending: &'a mut MutationSet,
    path: Vec<usize>,
}

impl<'a> CascadeContext<'a> {
    pub fn new(catalog: &'a Catalog, store: &'a Store, pending: &'a mut MutationSet) -> Self {
        Self {
            catalog,
            store,
            pending,
            path: Vec::new(),
        }
    }
}

fn key_of(row: &[Value], columns: &[usize]) -> Vec<Value> {
    columns.iter().map(|&c| row[c].clone()).collect()
}

fn keys_equal(a: &[Value], b: &[Value]) -> bool {
    a.iter().zip(b).all(|(x, y)| x.key_cmp(y) == Ordering::Equal)
}

/// Rows of the constraint's child table whose FK columns equal `key`.
/// Probes an index whose leading columns match the FK column list when
/// one exists, otherwise scans.
fn referencing_rows(
    store: &Store,
    catalog: &Catalog,
    fk: &ForeignKeyDef,
    key: &[Value],
) -> Result<Vec<(RowId, Vec<Value>)>> {
    let child = catalog.table(fk.child_table())?;
    let storage = store.table(fk.child_table())?;
    let fk_columns = fk.child_columns();

    let index = child.indexes().iter().position(|idx| {
        idx.columns().len() >= fk_columns.len() && idx.columns()[..fk_columns.len()] == *fk_columns
    });

    let mut out = Vec::new();
    let mut cursor = match index {
        Some(index) => storage.probe_equal(index, key),
        None => storage.scan(),
    };
    while let Some((rid, row)) = cursor.next() {
        let row_key = key_of(&row, fk_columns);
        if row_key.iter().any(Value::is_null) {
            continue;
        }
        if keys_equal(&row_key, key) {
            out.push((rid, row));
        }
    }
    Ok(out)
}

fn restrict_violation(catalog: &Catalog, fk: &ForeignKeyDef) -> Result<()> {
    bail!(
        "FOREIGN KEY constraint violated: row in '{}' is still referenced by '{}' (constraint '{}')",
        catalog.table(fk.parent_table())?.name(),
        catalog.table(fk.child_table())?.name(),
        fk.name()
    )
}

/// Propagate the deletion of `row` to every table referencing
/// `table_id`. The row itself must already be pending deletion in the
/// mutation set before this is called.
pub fn cascade_delete(
    ctx: &mut CascadeContext<'_>,
    table_id: u64,
    row_id: RowId,
    row: &[Value],
) -> Result<()> {
    let catalog = ctx.catalog;
    let store = ctx.store;
    for (constraint_id, fk) in catalog.referencing(table_id) {
        let key = key_of(row, fk.parent_columns());
        // A NULL key is referenced by nothing.
        if key.iter().any(Value::is_null) {
            continue;
        }
        match fk.delete_action() {
            ReferentialAction::NoAction | ReferentialAction::Restrict => {
                for (child_id, _) in referencing_rows(store, catalog, fk, &key)? {
                    if fk.is_self_referencing() && child_id == row_id {
                        continue;
                    }
                    restrict_violation(catalog, fk)?;
                }
            }
            ReferentialAction::Cascade => {
                for (child_id, child_row) in referencing_rows(store, catalog, fk, &key)? {
                    if fk.is_self_referencing() && child_id == row_id {
                        continue;
                    }
                    let set = ctx.pending.table_mut(fk.child_table());
                    if set.is_delete(child_id) {
                        continue;
                    }
                    set.queue_delete(child_id, child_row.clone());
                    cascade_delete(ctx, fk.child_table(), child_id, &child_row)?;
                }
            }
            ReferentialAction::SetNull | ReferentialAction::SetDefault => {
                if ctx.path.contains(&constraint_id) {
                    continue;
                }
                ctx.path.push(constraint_id);
                let result = set_columns_for_delete(ctx, fk, row_id, &key);
                ctx.path.pop();
                result?;
            }
        }
    }
    Ok(())
}

fn set_columns_for_delete(
    ctx: &mut CascadeContext<'_>,
    fk: &ForeignKeyDef,
    deleted_row: RowId,
    key: &[Value],
) -> Result<()> {
    let catalog = ctx.catalog;
    let child = catalog.table(fk.child_table())?;
    for (child_id, child_row) in referencing_rows(ctx.store, catalog, fk, key)? {
        if fk.is_self_referencing() && child_id == deleted_row {
            continue;
        }
        if ctx
            .pending
            .table(fk.child_table())
            .is_some_and(|set| set.is_delete(child_id))
        {
            continue;
        }
        let mut new_row = child_row.clone();
        let mut changed = Vec::new();
        for &c in fk.child_columns() {
            let value = replacement_value(child, c, fk.delete_action());
            if new_row[c].key_cmp(&value) != Ordering::Equal {
                changed.push(c);
            }
            new_row[c] = value;
        }
        cascade_update(ctx, fk.child_table(), child_id, &child_row, &new_row, &changed)?;
        ctx.pending.table_mut(fk.child_table()).queue_update(
            child,
            child_id,
            child_row,
            new_row,
            fk.child_columns(),
        )?;
    }
    Ok(())
}

fn replacement_value(table: &TableDef, column: usize, action: ReferentialAction) -> Value {
    match action {
        ReferentialAction::SetDefault => table.columns()[column]
            .default_value()
            .cloned()
            .unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

/// Propagate a key change on `table_id` to every referencing table.
/// `changed` lists the columns whose stored value actually changes.
pub fn cascade_update(
    ctx: &mut CascadeContext<'_>,
    table_id: u64,
    row_id: RowId,
    old: &[Value],
    new: &[Value],
    changed: &[usize],
) -> Result<()> {
    if changed.is_empty() {
        return Ok(());
    }
    let catalog = ctx.catalog;
    let store = ctx.store;
    for (constraint_id, fk) in catalog.referencing(table_id) {
        if !fk.parent_columns().iter().any(|c| changed.contains(c)) {
            continue;
        }
        let old_key = key_of(old, fk.parent_columns());
        if old_key.iter().any(Value::is_null) {
            continue;
        }
        let new_key = key_of(new, fk.parent_columns());
        if keys_equal(&old_key, &new_key) {
            continue;
        }
        match fk.update_action() {
            ReferentialAction::NoAction | ReferentialAction::Restrict => {
                for (child_id, _) in referencing_rows(store, catalog, fk, &old_key)? {
                    if fk.is_self_referencing() && child_id == row_id {
                        continue;
                    }
                    restrict_violation(catalog, fk)?;
                }
            }
            action => {
                if ctx.path.contains(&constraint_id) {
                    continue;
                }
                ctx.path.push(constraint_id);
                let result = propagate_key_change(ctx, fk, row_id, &old_key, &new_key, action);
                ctx.path.pop();
                result?;
            }
        }
    }
    Ok(())
}

fn propagate_key_change(
    ctx: &mut CascadeContext<'_>,
    fk: &ForeignKeyDef,
    updated_row: RowId,
    old_key: &[Value],
    new_key: &[Value],
    action: ReferentialAction,
) -> Result<()> {
    let catalog = ctx.catalog;
    let child = catalog.table(fk.child_table())?;
    for (child_id, child_row) in referencing_rows(ctx.store, catalog, fk, old_key)? {
        if fk.is_self_referencing() && child_id == updated_row {
            continue;
        }
        if ctx
            .pending
            .table(fk.child_table())
            .is_some_and(|set| set.is_delete(child_id))
        {
            continue;
        }
        let mut new_row = child_row.clone();
        let mut changed = Vec::new();
        for (i, &c) in fk.child_columns().iter().enumerate() {
            let value = match action {
                ReferentialAction::Cascade => new_key[i].clone(),
                _ => replacement_value(child, c, action),
            };
            if new_row[c].key_cmp(&value) != Ordering::Equal {
                changed.push(c);
            }
            new_row[c] = value;
        }
        cascade_update(ctx, fk.child_table(), child_id, &child_row, &new_row, &changed)?;
        ctx.pending.table_mut(fk.child_table()).queue_update(
            child,
            child_id,
            child_row,
            new_row,
            fk.child_columns(),
        )?;
    }
    Ok(())
}

/// Child-side validation for a new or rewritten row: every non-NULL
/// foreign key it carries must point at an existing parent row.
/// `changed` limits the check to constraints whose FK columns were
/// touched; `None` checks them all.
pub(crate) fn check_child_references(
    catalog: &Catalog,
    store: &Store,
    table: &TableDef,
    row: &[Value],
    changed: Option<&[usize]>,
) -> Result<()> {
    for (_, fk) in catalog.owned_by(table.id()) {
        if let Some(changed) = changed {
            if !fk.child_columns().iter().any(|c| changed.contains(c)) {
                continue;
            }
        }
        let key = key_of(row, fk.child_columns());
        if key.iter().any(Value::is_null) {
            continue;
        }
        if !parent_exists(store, catalog, fk, &key)? {
            bail!(
                "FOREIGN KEY constraint violated: value in '{}' has no matching row in '{}' \
                 (constraint '{}')",
                table.name(),
                catalog.table(fk.parent_table())?.name(),
                fk.name()
            );
        }
    }
    Ok(())
}

fn parent_exists(
    store: &Store,
    catalog: &Catalog,
    fk: &ForeignKeyDef,
    key: &[Value],
) -> Result<bool> {
    let parent = catalog.table(fk.parent_table())?;
    let storage = store.table(fk.parent_table())?;
    let parent_columns = fk.parent_columns();

    let index = parent.indexes().iter().position(|idx| {
        idx.columns().len() >= parent_columns.len()
            && idx.columns()[..parent_columns.len()] == *parent_columns
    });
    let mut cursor = match index {
        Some(index) => storage.probe_equal(index, key),
        None => storage.scan(),
    };
    while let Some((_, row)) = cursor.next() {
        if keys_equal(&key_of(&row, parent_columns), key) {
            return Ok(true);
        }
    }
    Ok(false)
}
