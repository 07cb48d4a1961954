//! # MERGE Statement Module
//!
//! Drives a source × target join by hand: the target iterator resets
//! for each source row, and a source row whose target iterator never
//! advances takes the insert path. The affected-row count is the
//! number of distinct updated rows plus the number of inserted rows;
//! a source row is never counted twice.

use crate::dml::cascade::{self, CascadeContext};
use crate::dml::rowset::MutationSet;
use crate::dml::trigger::{RowChange, TriggerEvent, TriggerRegistry};
use crate::dml::update::{default_or_identity, new_row_image, Assignment};
use crate::dml::{apply_mutations, fire_after_statement};
use crate::exec::RangeIterator;
use crate::expr::eval::{self, EvalScope};
use crate::expr::Expr;
use crate::plan::BoundPlan;
use crate::schema::Catalog;
use crate::session::Session;
use crate::storage::{RowId, Store};
use crate::types::Value;
use eyre::{bail, Result};

pub struct MergeStatement {
    pub target: u64,
    /// Range 0 is the source, range 1 the target, joined on the MERGE
    /// search condition.
    pub plan: BoundPlan,
    /// WHEN MATCHED update; empty when the clause is absent.
    pub assignments: Vec<Assignment>,
    /// WHEN NOT MATCHED insert, one expression per target column.
    pub insert_values: Option<Vec<Expr>>,
}

impl MergeStatement {
    pub fn execute(
        &self,
        catalog: &Catalog,
        store: &mut Store,
        triggers: &TriggerRegistry,
        session: &Session,
    ) -> Result<usize> {
        let table = catalog.table(self.target)?;

        let mut matched: Vec<(RowId, Vec<Value>, Vec<Value>)> = Vec::new();
        let mut unmatched: Vec<Vec<Value>> = Vec::new();
        {
            let store_ref: &Store = store;
            let source_rv = self.plan.range(0);
            let target_rv = self.plan.range(1);
            let mut source = RangeIterator::new(
                source_rv,
                catalog.table(source_rv.table())?,
                store_ref.table(source_rv.table())?,
                session.visibility(),
                session.params(),
                session.interrupted(),
            );
            let mut target = RangeIterator::new(
                target_rv,
                table,
                store_ref.table(self.target)?,
                session.visibility(),
                session.params(),
                session.interrupted(),
            );

            while source.advance(&[])? {
                let source_row = match source.current_values() {
                    Some(row) => row.to_vec(),
                    None => bail!("internal error: source iterator lost its row"),
                };
                target.reset();
                let outer: [Option<&[Value]>; 1] = [Some(&source_row)];
                let mut found = false;
                while target.advance(&outer)? {
                    let Some((Some(row_id), row)) = target.current() else {
                        continue;
                    };
                    found = true;
                    matched.push((row_id, row.to_vec(), source_row.clone()));
                }
                if !found {
                    unmatched.push(source_row);
                }
            }
        }

        let mut pending = MutationSet::new();
        let mut images = Vec::new();
        if !self.assignments.is_empty() {
            for (row_id, old, source_row) in &matched {
                let outer: [Option<&[Value]>; 2] =
                    [Some(source_row.as_slice()), Some(old.as_slice())];
                let image = new_row_image(
                    table,
                    store.table_mut(self.target)?,
                    old,
                    &self.assignments,
                    &outer,
                    session.params(),
                )?;
                cascade::check_child_references(
                    catalog,
                    store,
                    table,
                    &image.row,
                    Some(&image.changed),
                )?;
                pending.table_mut(self.target).queue_update(
                    table,
                    *row_id,
                    old.clone(),
                    image.row.clone(),
                    &image.set_columns,
                )?;
                images.push((*row_id, old.clone(), image));
            }
        }
        // Distinct updated rows, counted before cascades add their own
        // entries to the target table's set.
        let updated = pending.table(self.target).map_or(0, |set| set.len());

        {
            let store_ref: &Store = store;
            let mut ctx = CascadeContext::new(catalog, store_ref, &mut pending);
            for (row_id, old, image) in &images {
                cascade::cascade_update(&mut ctx, self.target, *row_id, old, &image.row, &image.changed)?;
            }
        }

        let applied = apply_mutations(store, catalog, triggers, pending, self.target)?;
        fire_after_statement(triggers, table, TriggerEvent::Update, &applied, self.target)?;

        let mut inserted = 0;
        if let Some(insert_exprs) = &self.insert_values {
            if insert_exprs.len() != table.column_count() {
                bail!(
                    "internal error: MERGE insert list arity mismatch on table '{}'",
                    table.name()
                );
            }
            let mut insert_changes = Vec::new();
            for source_row in &unmatched {
                let outer: [Option<&[Value]>; 1] = [Some(source_row.as_slice())];
                let mut row = Vec::with_capacity(insert_exprs.len());
                for (c, expr) in insert_exprs.iter().enumerate() {
                    let value = match expr {
                        Expr::Default => default_or_identity(table, store.table_mut(self.target)?, c),
                        other => {
                            let scope = EvalScope::new(&outer, None, session.params());
                            eval::eval(other, &scope)?
                        }
                    };
                    row.push(value);
                }
                cascade::check_child_references(catalog, store, table, &row, None)?;
                triggers.fire_before_row(table, TriggerEvent::Insert, None, Some(&mut row))?;
                let row_id = store.table_mut(self.target)?.insert(row.clone());
                insert_changes.push(RowChange {
                    row_id,
                    old: Vec::new(),
                    new: Some(row),
                });
                inserted += 1;
            }
            triggers.fire_after_statement(table, TriggerEvent::Insert, &insert_changes)?;
        }

        Ok(updated + inserted)
    }
}
