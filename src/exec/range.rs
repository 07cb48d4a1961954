//! # Range Iterator Module
//!
//! The per-execution state machine for one range variable:
//!
//! ```text
//! BEFORE_FIRST ──advance──▶ ITERATING ──exhausted──▶ EXHAUSTED
//!       ▲                                                │
//!       └────────────────────reset───────────────────────┘
//! ```
//!
//! `advance()` opens the bound access path lazily, then fetches rows
//! until one passes the end condition, the join residual, and the
//! where residual. A LEFT or FULL range variable that exhausts without
//! one accepted row owes a single all-NULL row, emitted only if the
//! where residual accepts the all-NULL image.
//!
//! The residuals differ in one way: a join residual failure skips the
//! row and keeps the owed null row pending, a where residual failure
//! skips the row and cancels it. Rows accepted past the join residual
//! are recorded for the right/full second pass before the where
//! residual runs, since WHERE filters joined rows but does not make a
//! matched row unmatched.

use crate::expr::eval::{self, EvalScope};
use crate::plan::{AccessPath, ConditionSet, RangeVariable};
use crate::schema::TableDef;
use crate::storage::{Cursor, MemTable, RowId, Visibility};
use crate::types::Value;
use eyre::{bail, Result};
use hashbrown::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    BeforeFirst,
    Iterating,
    Exhausted,
}

pub struct RangeIterator<'a> {
    rv: &'a RangeVariable,
    table: &'a TableDef,
    rows: &'a MemTable,
    visibility: &'a dyn Visibility,
    params: &'a [Value],
    interrupt: &'a AtomicBool,
    state: State,
    set_idx: usize,
    cursor: Cursor,
    owes_null_row: bool,
    current: Option<(Option<RowId>, Vec<Value>)>,
    matched: HashSet<RowId>,
}

impl<'a> RangeIterator<'a> {
    pub fn new(
        rv: &'a RangeVariable,
        table: &'a TableDef,
        rows: &'a MemTable,
        visibility: &'a dyn Visibility,
        params: &'a [Value],
        interrupt: &'a AtomicBool,
    ) -> Self {
        Self {
            rv,
            table,
            rows,
            visibility,
            params,
            interrupt,
            state: State::BeforeFirst,
            set_idx: 0,
            cursor: Cursor::empty(),
            owes_null_row: rv.join_type().null_extends_self(),
            current: None,
            matched: HashSet::new(),
        }
    }

    pub fn range_variable(&self) -> &'a RangeVariable {
        self.rv
    }

    pub fn table(&self) -> &'a TableDef {
        self.table
    }

    pub fn current(&self) -> Option<(Option<RowId>, &[Value])> {
        self.current
            .as_ref()
            .map(|(rid, row)| (*rid, row.as_slice()))
    }

    pub fn current_values(&self) -> Option<&[Value]> {
        self.current.as_ref().map(|(_, row)| row.as_slice())
    }

    /// Back to BEFORE_FIRST for the next pass of an enclosing nested
    /// loop. The matched-row record survives: the right/full second
    /// pass needs every row accepted across the whole primary pass.
    pub fn reset(&mut self) {
        self.state = State::BeforeFirst;
        self.set_idx = 0;
        self.cursor = Cursor::empty();
        self.owes_null_row = self.rv.join_type().null_extends_self();
        self.current = None;
    }

    pub fn is_matched(&self, row: RowId) -> bool {
        self.matched.contains(&row)
    }

    pub fn is_visible(&self, row: RowId) -> bool {
        self.visibility.is_visible(row)
    }

    pub(crate) fn scan_all(&self) -> Cursor {
        self.rows.scan()
    }

    pub(crate) fn null_image(&self) -> Vec<Value> {
        vec![Value::Null; self.table.columns().len()]
    }

    /// Fetch the next qualifying row. `outer` holds the current rows
    /// of all earlier range variables, indexed by position.
    pub fn advance(&mut self, outer: &[Option<&[Value]>]) -> Result<bool> {
        let rv = self.rv;
        match self.state {
            State::Exhausted => {
                self.current = None;
                return Ok(false);
            }
            State::BeforeFirst => {
                self.set_idx = 0;
                self.cursor = self.open_set(&rv.condition_sets()[0], outer)?;
                self.state = State::Iterating;
            }
            State::Iterating => {}
        }

        loop {
            if self.interrupt.load(Ordering::Relaxed) {
                bail!("statement execution interrupted");
            }
            let Some((rid, row)) = self.cursor.next() else {
                if self.set_idx + 1 < rv.condition_sets().len() {
                    self.set_idx += 1;
                    self.cursor = self.open_set(&rv.condition_sets()[self.set_idx], outer)?;
                    continue;
                }
                return self.finish_pass(outer);
            };
            if !self.visibility.is_visible(rid) {
                continue;
            }

            let set = &rv.condition_sets()[self.set_idx];
            let scope = EvalScope::new(outer, Some((rv.position(), &row)), self.params);
            if let Some(end) = &set.end_condition {
                if !eval::test(end, &scope)? {
                    // Ordered scan: no later row can pass either.
                    self.cursor = Cursor::empty();
                    continue;
                }
            }
            if let Some(join) = &set.join_residual {
                if !eval::test(join, &scope)? {
                    continue;
                }
            }
            if rv.join_type().needs_second_pass() {
                self.matched.insert(rid);
            }
            if let Some(where_residual) = &set.where_residual {
                if !eval::test(where_residual, &scope)? {
                    self.owes_null_row = false;
                    continue;
                }
            }
            self.owes_null_row = false;
            self.current = Some((Some(rid), row));
            return Ok(true);
        }
    }

    /// Scan exhausted: synthesize the owed null-extended row, if any,
    /// then go terminal.
    fn finish_pass(&mut self, outer: &[Option<&[Value]>]) -> Result<bool> {
        let rv = self.rv;
        self.state = State::Exhausted;
        if self.owes_null_row && rv.join_type().null_extends_self() {
            self.owes_null_row = false;
            let image = self.null_image();
            let scope = EvalScope::new(outer, Some((rv.position(), &image)), self.params);
            let mut accepted = true;
            for set in rv.condition_sets() {
                if let Some(where_residual) = &set.where_residual {
                    if !eval::test(where_residual, &scope)? {
                        accepted = false;
                        break;
                    }
                }
            }
            if accepted {
                self.current = Some((None, image));
                return Ok(true);
            }
        }
        self.current = None;
        Ok(false)
    }

    fn open_set(&self, set: &ConditionSet, outer: &[Option<&[Value]>]) -> Result<Cursor> {
        let scope = EvalScope::new(outer, None, self.params);
        match &set.access {
            AccessPath::FullScan => Ok(self.rows.scan()),
            AccessPath::IndexEquality { index, keys } => {
                let columns = self.table.indexes()[*index].columns();
                let mut values = Vec::with_capacity(keys.len());
                for (key, &column) in keys.iter().zip(columns) {
                    let v = eval::eval(key, &scope)?;
                    // NULL keys match nothing; a constant outside the
                    // column's representable range matches nothing.
                    if v.is_null() || !self.table.columns()[column].data_type().contains(&v) {
                        return Ok(Cursor::empty());
                    }
                    values.push(v);
                }
                Ok(self.rows.probe_equal(*index, &values))
            }
            AccessPath::IndexRange { index, start } => match start {
                Some((op, expr)) => {
                    let v = eval::eval(expr, &scope)?;
                    if v.is_null() {
                        return Ok(Cursor::empty());
                    }
                    Ok(self.rows.probe_range(*index, Some((*op, &v))))
                }
                None => Ok(self.rows.probe_range(*index, None)),
            },
            AccessPath::InProbe { index, values } => Ok(self.rows.probe_in(*index, values)),
        }
    }
}
