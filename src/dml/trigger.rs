//! Per-table trigger lists keyed by operation and timing. Row-level
//! BEFORE triggers run immediately before a row's mutation is applied
//! and may rewrite the proposed new values; AFTER statement triggers
//! run once per statement against the accumulated row-set.

use crate::schema::TableDef;
use crate::storage::RowId;
use crate::types::Value;
use eyre::Result;
use hashbrown::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerEvent {
    Insert,
    Update,
    Delete,
}

/// One applied mutation as seen by AFTER statement triggers. `new` is
/// `None` for a delete; `old` is empty for an insert.
#[derive(Debug, Clone)]
pub struct RowChange {
    pub row_id: RowId,
    pub old: Vec<Value>,
    pub new: Option<Vec<Value>>,
}

pub type BeforeRowFn =
    Box<dyn Fn(&TableDef, Option<&[Value]>, Option<&mut Vec<Value>>) -> Result<()> + Send + Sync>;

pub type AfterStatementFn = Box<dyn Fn(&TableDef, &[RowChange]) -> Result<()> + Send + Sync>;

#[derive(Default)]
pub struct TriggerRegistry {
    before_row: HashMap<(u64, TriggerEvent), Vec<BeforeRowFn>>,
    after_statement: HashMap<(u64, TriggerEvent), Vec<AfterStatementFn>>,
}

impl TriggerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_before_row(&mut self, table_id: u64, event: TriggerEvent, trigger: BeforeRowFn) {
        self.before_row
            .entry((table_id, event))
            .or_default()
            .push(trigger);
    }

    pub fn add_after_statement(
        &mut self,
        table_id: u64,
        event: TriggerEvent,
        trigger: AfterStatementFn,
    ) {
        self.after_statement
            .entry((table_id, event))
            .or_default()
            .push(trigger);
    }

    pub fn fire_before_row(
        &self,
        table: &TableDef,
        event: TriggerEvent,
        old: Option<&[Value]>,
        mut new: Option<&mut Vec<Value>>,
    ) -> Result<()> {
        if let Some(triggers) = self.before_row.get(&(table.id(), event)) {
            for trigger in triggers {
                trigger(table, old, new.as_mut().map(|v| &mut **v))?;
            }
        }
        Ok(())
    }

    pub fn fire_after_statement(
        &self,
        table: &TableDef,
        event: TriggerEvent,
        changes: &[RowChange],
    ) -> Result<()> {
        if let Some(triggers) = self.after_statement.get(&(table.id(), event)) {
            for trigger in triggers {
                trigger(table, changes)?;
            }
        }
        Ok(())
    }
}
