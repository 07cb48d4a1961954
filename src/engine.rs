//! # Engine Module
//!
//! The public entry point tying catalog, storage, and triggers
//! together behind read-write locks. Statement compilation takes a
//! catalog read lock; queries take a store read lock; mutating
//! statements hold the store write lock across their whole
//! compute-then-apply sequence so a cascade never observes its own
//! partial writes.

use crate::dml::{
    self, AfterStatementFn, BeforeRowFn, ExecuteResult, Statement, TriggerEvent, TriggerRegistry,
};
use crate::expr::eval::{self, EvalScope};
use crate::expr::Expr;
use crate::plan::{resolver, BoundPlan, RangeDecl};
use crate::schema::{Catalog, ForeignKeyDef, TableDef};
use crate::session::Session;
use crate::storage::{RowId, Store};
use crate::types::Value;
use eyre::{bail, Result};
use parking_lot::RwLock;

#[derive(Default)]
pub struct Engine {
    catalog: RwLock<Catalog>,
    store: RwLock<Store>,
    triggers: RwLock<TriggerRegistry>,
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_table(&self, def: TableDef) -> Result<u64> {
        let mut catalog = self.catalog.write();
        let id = catalog.add_table(def)?;
        self.store.write().create_table(catalog.table(id)?);
        Ok(id)
    }

    pub fn add_foreign_key(&self, fk: ForeignKeyDef) -> Result<usize> {
        self.catalog.write().add_foreign_key(fk)
    }

    pub fn table_id(&self, name: &str) -> Result<u64> {
        Ok(self.catalog.read().resolve_table(name)?.id())
    }

    /// Direct row insertion. NULL values on identity columns draw the
    /// next generated value; child-side foreign keys are validated and
    /// BEFORE INSERT row triggers may rewrite the values.
    pub fn insert(&self, table_id: u64, mut values: Vec<Value>) -> Result<RowId> {
        let catalog = self.catalog.read();
        let triggers = self.triggers.read();
        let mut store = self.store.write();
        let table = catalog.table(table_id)?;
        if values.len() != table.column_count() {
            bail!(
                "table '{}' expects {} columns, got {}",
                table.name(),
                table.column_count(),
                values.len()
            );
        }
        for (i, column) in table.columns().iter().enumerate() {
            if column.is_identity() && values[i].is_null() {
                values[i] = Value::Int(store.table_mut(table_id)?.next_identity(i));
            }
        }
        dml::cascade::check_child_references(&catalog, &store, table, &values, None)?;
        triggers.fire_before_row(table, TriggerEvent::Insert, None, Some(&mut values))?;
        Ok(store.table_mut(table_id)?.insert(values))
    }

    /// Compile a FROM clause and WHERE tree into a bound plan. The
    /// plan is immutable and may be shared across sessions.
    pub fn compile(&self, decls: Vec<RangeDecl>, where_clause: Option<Expr>) -> Result<BoundPlan> {
        resolver::compile(&self.catalog.read(), decls, where_clause)
    }

    pub fn describe(&self, plan: &BoundPlan) -> Result<String> {
        plan.describe(&self.catalog.read())
    }

    pub fn execute(&self, statement: &Statement, session: &Session) -> Result<ExecuteResult> {
        match statement {
            Statement::Query(query) => {
                let catalog = self.catalog.read();
                let store = self.store.read();
                let mut joined = dml::build_iterators(&query.plan, &catalog, &store, session)?;
                let mut rows = Vec::new();
                while joined.advance()? {
                    if query.outputs.is_empty() {
                        rows.push(joined.output_row());
                        continue;
                    }
                    let scope_rows = joined.scope_rows();
                    let scope = EvalScope::new(&scope_rows, None, session.params());
                    let row = query
                        .outputs
                        .iter()
                        .map(|e| eval::eval(e, &scope))
                        .collect::<Result<Vec<Value>>>()?;
                    rows.push(row);
                }
                Ok(ExecuteResult::Rows(rows))
            }
            Statement::Update(update) => {
                let catalog = self.catalog.read();
                let triggers = self.triggers.read();
                let mut store = self.store.write();
                update
                    .execute(&catalog, &mut store, &triggers, session)
                    .map(ExecuteResult::RowCount)
            }
            Statement::Delete(delete) => {
                let catalog = self.catalog.read();
                let triggers = self.triggers.read();
                let mut store = self.store.write();
                delete
                    .execute(&catalog, &mut store, &triggers, session)
                    .map(ExecuteResult::RowCount)
            }
            Statement::Merge(merge) => {
                let catalog = self.catalog.read();
                let triggers = self.triggers.read();
                let mut store = self.store.write();
                merge
                    .execute(&catalog, &mut store, &triggers, session)
                    .map(ExecuteResult::RowCount)
            }
        }
    }

    pub fn add_before_row_trigger(&self, table_id: u64, event: TriggerEvent, trigger: BeforeRowFn) {
        self.triggers.write().add_before_row(table_id, event, trigger);
    }

    pub fn add_after_statement_trigger(
        &self,
        table_id: u64,
        event: TriggerEvent,
        trigger: AfterStatementFn,
    ) {
        self.triggers
            .write()
            .add_after_statement(table_id, event, trigger);
    }

    /// Snapshot of a table's rows in row-id order, for diagnostics and
    /// tests.
    pub fn rows(&self, table_id: u64) -> Result<Vec<(RowId, Vec<Value>)>> {
        let store = self.store.read();
        let mut cursor = store.table(table_id)?.scan();
        let mut out = Vec::new();
        while let Some(item) = cursor.next() {
            out.push(item);
        }
        Ok(out)
    }

    pub fn row_count(&self, table_id: u64) -> Result<usize> {
        Ok(self.store.read().table(table_id)?.row_count())
    }
}
