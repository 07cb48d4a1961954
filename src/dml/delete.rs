//! # DELETE Statement Module
//!
//! The candidate row set is materialized completely before any row is
//! removed, so the predicate sees a snapshot unaffected by deletions
//! it causes. Every candidate is queued as pending before the cascade
//! walk starts; the walk's stop-at-pending-deletes guard depends on
//! that ordering.

use crate::dml::cascade::{self, CascadeContext};
use crate::dml::rowset::MutationSet;
use crate::dml::trigger::{TriggerEvent, TriggerRegistry};
use crate::dml::{apply_mutations, collect_candidates, fire_after_statement};
use crate::plan::BoundPlan;
use crate::schema::Catalog;
use crate::session::Session;
use crate::storage::Store;
use eyre::{bail, Result};

pub struct DeleteStatement {
    pub table: u64,
    pub plan: BoundPlan,
    pub target_range: usize,
}

impl DeleteStatement {
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
        let mut rows = Vec::with_capacity(candidates.len());
        for (row_id, joined) in candidates {
            let old = match joined.into_iter().nth(self.target_range).flatten() {
                Some(row) => row,
                None => bail!("internal error: delete candidate without a target row"),
            };
            pending.table_mut(self.table).queue_delete(row_id, old.clone());
            rows.push((row_id, old));
        }
        // Distinct target rows; a join plan can surface the same row in
        // several candidates.
        let deleted = pending.table(self.table).map_or(0, |set| set.len());

        {
            let store_ref: &Store = store;
            let mut ctx = CascadeContext::new(catalog, store_ref, &mut pending);
            for (row_id, old) in &rows {
                cascade::cascade_delete(&mut ctx, self.table, *row_id, old)?;
            }
        }

        let applied = apply_mutations(store, catalog, triggers, pending, self.table)?;
        fire_after_statement(triggers, table, TriggerEvent::Delete, &applied, self.table)?;
        Ok(deleted)
    }
}
