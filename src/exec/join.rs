//! # Joined Row Iterator Module
//!
//! N-way nested-loop composition of range iterators, in declaration
//! order. Advancing moves the rightmost iterator; on exhaustion it is
//! reset and its left neighbor advances. A composed row exists only
//! when every iterator holds a row.
//!
//! After the primary pass, a second pass walks each RIGHT/FULL table
//! directly and emits a null-extended composed row for every parent
//! row the primary pass never matched, re-testing that range
//! variable's where residual against the parent row.

use crate::exec::RangeIterator;
use crate::expr::eval::{self, EvalScope};
use crate::storage::{Cursor, RowId};
use crate::types::Value;
use eyre::{bail, Result};
use smallvec::SmallVec;
use std::sync::atomic::{AtomicBool, Ordering};

pub struct JoinedRowIterator<'a> {
    iters: Vec<RangeIterator<'a>>,
    null_images: Vec<Vec<Value>>,
    params: &'a [Value],
    interrupt: &'a AtomicBool,
    started: bool,
    primary_done: bool,
    second_targets: Vec<usize>,
    second_idx: usize,
    second_cursor: Cursor,
    second_current: Option<(usize, RowId, Vec<Value>)>,
}

impl<'a> JoinedRowIterator<'a> {
    pub fn new(
        iters: Vec<RangeIterator<'a>>,
        params: &'a [Value],
        interrupt: &'a AtomicBool,
    ) -> Self {
        let null_images = iters.iter().map(|it| it.null_image()).collect();
        Self {
            iters,
            null_images,
            params,
            interrupt,
            started: false,
            primary_done: false,
            second_targets: Vec::new(),
            second_idx: 0,
            second_cursor: Cursor::empty(),
            second_current: None,
        }
    }

    pub fn width(&self) -> usize {
        self.iters.len()
    }

    /// The current row of the range variable at `pos`. A `None` row id
    /// marks a null-extended row.
    pub fn current(&self, pos: usize) -> Option<(Option<RowId>, &[Value])> {
        if let Some((p, rid, row)) = &self.second_current {
            if *p == pos {
                return Some((Some(*rid), row.as_slice()));
            }
            return Some((None, self.null_images[pos].as_slice()));
        }
        self.iters[pos].current()
    }

    /// Current rows of every range variable, for predicate evaluation
    /// by the statement layer.
    pub fn scope_rows(&self) -> Vec<Option<&[Value]>> {
        (0..self.iters.len())
            .map(|i| self.current(i).map(|(_, row)| row))
            .collect()
    }

    /// All columns of the composed row, concatenated in declaration
    /// order.
    pub fn output_row(&self) -> Vec<Value> {
        let mut out = Vec::new();
        for i in 0..self.iters.len() {
            if let Some((_, row)) = self.current(i) {
                out.extend_from_slice(row);
            }
        }
        out
    }

    pub fn advance(&mut self) -> Result<bool> {
        if !self.primary_done {
            if self.advance_primary()? {
                return Ok(true);
            }
            self.primary_done = true;
            self.init_second_pass();
        }
        self.advance_second()
    }

    fn advance_primary(&mut self) -> Result<bool> {
        let n = self.iters.len();
        let mut i = if self.started { n - 1 } else { 0 };
        loop {
            let advanced = {
                let (left, rest) = self.iters.split_at_mut(i);
                let outer: SmallVec<[Option<&[Value]>; 4]> =
                    left.iter().map(|it| it.current_values()).collect();
                rest[0].advance(&outer)?
            };
            if advanced {
                if i + 1 == n {
                    self.started = true;
                    return Ok(true);
                }
                i += 1;
                self.iters[i].reset();
            } else {
                if i == 0 {
                    return Ok(false);
                }
                i -= 1;
            }
        }
    }

    fn init_second_pass(&mut self) {
        self.second_targets = self
            .iters
            .iter()
            .enumerate()
            .filter(|(_, it)| it.range_variable().join_type().needs_second_pass())
            .map(|(i, _)| i)
            .collect();
        self.second_idx = 0;
        self.second_cursor = match self.second_targets.first() {
            Some(&p) => self.iters[p].scan_all(),
            None => Cursor::empty(),
        };
    }

    fn advance_second(&mut self) -> Result<bool> {
        loop {
            if self.second_idx >= self.second_targets.len() {
                self.second_current = None;
                return Ok(false);
            }
            if self.interrupt.load(Ordering::Relaxed) {
                bail!("statement execution interrupted");
            }
            let p = self.second_targets[self.second_idx];
            let Some((rid, row)) = self.second_cursor.next() else {
                self.second_idx += 1;
                if self.second_idx < self.second_targets.len() {
                    let next = self.second_targets[self.second_idx];
                    self.second_cursor = self.iters[next].scan_all();
                }
                continue;
            };
            if !self.iters[p].is_visible(rid) || self.iters[p].is_matched(rid) {
                continue;
            }

            // Null-extend every other range variable and re-test the
            // parent's where residual against the recovered row.
            let outer: Vec<Option<&[Value]>> = self
                .null_images
                .iter()
                .map(|img| Some(img.as_slice()))
                .collect();
            let scope = EvalScope::new(&outer, Some((p, &row)), self.params);
            let mut accepted = true;
            for set in self.iters[p].range_variable().condition_sets() {
                if let Some(where_residual) = &set.where_residual {
                    if !eval::test(where_residual, &scope)? {
                        accepted = false;
                        break;
                    }
                }
            }
            if accepted {
                self.second_current = Some((p, rid, row));
                return Ok(true);
            }
        }
    }
}
