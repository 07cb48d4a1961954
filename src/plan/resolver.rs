//! # Predicate Resolver Module
//!
//! Turns the compiled WHERE/ON trees of a statement into per-range
//! conditions. Runs once at statement compile time.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ 1. Decompose: flatten AND trees, split row-value equalities  │
//! ├──────────────────────────────────────────────────────────────┤
//! │ 2. Assign: each atom goes to its largest referenced range,   │
//! │    never before the floor (one past the last outer join)     │
//! ├──────────────────────────────────────────────────────────────┤
//! │ 3. Expand: synthesize equalities from col=col chains         │
//! ├──────────────────────────────────────────────────────────────┤
//! │ 4. Select: pick an index per range, leftovers turn residual  │
//! ├──────────────────────────────────────────────────────────────┤
//! │ 5. Promote: at most one IN list becomes an enumerated probe  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Malformed input trees are a contract violation of the statement
//! layer; they surface as internal errors, not data errors.

use crate::expr::{CmpOp, Expr};
use crate::plan::index_selection::select_access;
use crate::plan::{AccessPath, BoundPlan, ConditionSet, RangeDecl, RangeVariable};
use crate::schema::{Catalog, TableDef};
use crate::types::Value;
use eyre::{bail, Result};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

/// Compile the declared range variables and the WHERE tree into a
/// bound plan. Join conditions ride on their [`RangeDecl`].
pub fn compile(
    catalog: &Catalog,
    mut decls: Vec<RangeDecl>,
    where_clause: Option<Expr>,
) -> Result<BoundPlan> {
    let n = decls.len();
    if n == 0 {
        bail!("internal error: statement without range variables");
    }
    if decls[0].join_type.is_outer() || decls[0].on.is_some() {
        bail!("internal error: first range variable cannot carry a join");
    }

    let mut join_lists: Vec<Vec<Expr>> = vec![Vec::new(); n];
    let mut where_lists: Vec<Vec<Expr>> = vec![Vec::new(); n];

    for (i, decl) in decls.iter_mut().enumerate() {
        if let Some(on) = decl.on.take() {
            for pred in decompose(on) {
                if pred.max_range().map_or(false, |r| r > i) {
                    bail!("internal error: join condition references a later range variable");
                }
                join_lists[i].push(pred);
            }
        }
    }

    // One past the last outer-joined range variable. A predicate
    // spanning an outer join's two sides may only run once both sides
    // are materialized, so nothing is assigned before this position.
    let floor = decls
        .iter()
        .rposition(|d| d.join_type.is_outer())
        .map_or(0, |i| i + 1);

    if let Some(where_clause) = where_clause {
        for pred in decompose(where_clause) {
            let target = pred.max_range().unwrap_or(0).max(floor).min(n - 1);
            where_lists[target].push(pred);
        }
    }

    expand_equality_chains(&decls, floor, &join_lists, &mut where_lists);

    let mut accesses = Vec::with_capacity(n);
    for i in 0..n {
        let table = catalog.table(decls[i].table)?;
        let sel = select_access(table, i, decls[i].join_type, &join_lists[i], &where_lists[i]);
        remove_consumed(&mut join_lists[i], &sel.used_join);
        remove_consumed(&mut where_lists[i], &sel.used_where);
        accesses.push((sel.access, sel.end_condition));
    }

    promote_in_list(catalog, &decls, &mut accesses, &mut join_lists, &mut where_lists)?;

    let mut ranges = Vec::with_capacity(n);
    for (i, decl) in decls.into_iter().enumerate() {
        let (access, end_condition) = std::mem::take(&mut accesses[i]);
        let set = ConditionSet {
            access,
            end_condition,
            join_residual: Expr::and_all(std::mem::take(&mut join_lists[i])),
            where_residual: Expr::and_all(std::mem::take(&mut where_lists[i])),
        };
        ranges.push(RangeVariable::new(
            i,
            decl.table,
            decl.alias,
            decl.join_type,
            vec![set],
        ));
    }
    Ok(BoundPlan::new(ranges))
}

/// Flatten nested ANDs and split row-value equalities into per-column
/// equalities so each can be indexed on its own.
fn decompose(expr: Expr) -> Vec<Expr> {
    fn flatten(expr: Expr, out: &mut Vec<Expr>) {
        match expr {
            Expr::And(l, r) => {
                flatten(*l, out);
                flatten(*r, out);
            }
            other => out.push(other),
        }
    }

    let mut flat = Vec::new();
    flatten(expr, &mut flat);

    let mut atoms = Vec::with_capacity(flat.len());
    for pred in flat {
        if let Expr::Cmp {
            op: CmpOp::Eq,
            left,
            right,
        } = &pred
        {
            if let (Expr::Row(ls), Expr::Row(rs)) = (left.as_ref(), right.as_ref()) {
                if ls.len() == rs.len() {
                    for (l, r) in ls.iter().zip(rs) {
                        atoms.push(Expr::eq(l.clone(), r.clone()));
                    }
                    continue;
                }
            }
        }
        atoms.push(pred);
    }
    atoms
}

fn remove_consumed(list: &mut Vec<Expr>, used: &[usize]) {
    let mut i = 0;
    list.retain(|_| {
        let keep = !used.contains(&i);
        i += 1;
        keep
    });
}

type ColumnNode = (usize, usize);

fn as_column_pair(pred: &Expr) -> Option<(ColumnNode, ColumnNode)> {
    let Expr::Cmp {
        op: CmpOp::Eq,
        left,
        right,
    } = pred
    else {
        return None;
    };
    match (left.as_ref(), right.as_ref()) {
        (
            Expr::Column {
                range: ra,
                column: ca,
            },
            Expr::Column {
                range: rb,
                column: cb,
            },
        ) => Some(((*ra, *ca), (*rb, *cb))),
        _ => None,
    }
}

/// Chain detection over bare column equalities: A=B plus B=C yields
/// the derived A=C, assigned under the normal rule. Skipped when the
/// derived predicate would land on an outer-joined range variable,
/// where the extra constraint could wrongly suppress null extension.
fn expand_equality_chains(
    decls: &[RangeDecl],
    floor: usize,
    join_lists: &[Vec<Expr>],
    where_lists: &mut [Vec<Expr>],
) {
    let n = decls.len();
    let mut adjacency: BTreeMap<ColumnNode, Vec<ColumnNode>> = BTreeMap::new();
    let mut edges: BTreeSet<(ColumnNode, ColumnNode)> = BTreeSet::new();

    for pred in join_lists.iter().chain(where_lists.iter()).flatten() {
        if let Some((a, b)) = as_column_pair(pred) {
            if a == b {
                continue;
            }
            adjacency.entry(a).or_default().push(b);
            adjacency.entry(b).or_default().push(a);
            edges.insert(if a < b { (a, b) } else { (b, a) });
        }
    }

    let mut derived = Vec::new();
    for neighbors in adjacency.values() {
        for i in 0..neighbors.len() {
            for j in i + 1..neighbors.len() {
                let (a, c) = (neighbors[i], neighbors[j]);
                if a == c {
                    continue;
                }
                let key = if a < c { (a, c) } else { (c, a) };
                if edges.contains(&key) {
                    continue;
                }
                let target = a.0.max(c.0).max(floor).min(n - 1);
                if decls[target].join_type.is_outer() {
                    continue;
                }
                edges.insert(key);
                derived.push((target, a, c));
            }
        }
    }

    for (target, a, c) in derived {
        // Put the target's own column on the left so the synthesized
        // predicate stays indexable for its range variable.
        let (l, r) = if c.0 == target { (c, a) } else { (a, c) };
        where_lists[target].push(Expr::eq(Expr::col(l.0, l.1), Expr::col(r.0, r.1)));
    }
}

fn in_probe_candidate(
    pred: &Expr,
    position: usize,
    table: &TableDef,
) -> Option<(usize, Vec<Value>)> {
    let Expr::InList { expr, list } = pred else {
        return None;
    };
    let column = expr.as_column_of(position)?;
    let index = table
        .indexes()
        .iter()
        .position(|idx| idx.columns().first() == Some(&column))?;

    let mut values = Vec::with_capacity(list.len());
    for item in list {
        let Expr::Literal(v) = item else {
            return None;
        };
        // NULL never matches; constants outside the column's type are
        // statically unreachable. Both drop out of the probe list.
        if v.is_null() || !table.columns()[column].data_type().contains(v) {
            continue;
        }
        values.push(v.clone());
    }
    values.sort_by(|a, b| a.key_cmp(b));
    values.dedup_by(|a, b| a.key_cmp(b) == Ordering::Equal);
    Some((index, values))
}

/// Promote at most one residual IN list per statement to an enumerated
/// probe, in declaration order, and only where the range variable has
/// no other usable index condition.
fn promote_in_list(
    catalog: &Catalog,
    decls: &[RangeDecl],
    accesses: &mut [(AccessPath, Option<Expr>)],
    join_lists: &mut [Vec<Expr>],
    where_lists: &mut [Vec<Expr>],
) -> Result<()> {
    for i in 0..decls.len() {
        if !matches!(accesses[i].0, AccessPath::FullScan) {
            continue;
        }
        let table = catalog.table(decls[i].table)?;
        // Where predicates on an outer-joined range variable stay
        // residual for the null-extension re-test, same as in
        // select_access; only its join list may feed a probe.
        let outer = decls[i].join_type.is_outer();
        for (list, eligible) in [(&mut where_lists[i], !outer), (&mut join_lists[i], true)] {
            if !eligible {
                continue;
            }
            let mut hit = None;
            for (pos, pred) in list.iter().enumerate() {
                if let Some(candidate) = in_probe_candidate(pred, i, table) {
                    hit = Some((pos, candidate));
                    break;
                }
            }
            if let Some((pos, (index, values))) = hit {
                list.remove(pos);
                accesses[i].0 = AccessPath::InProbe { index, values };
                return Ok(());
            }
        }
    }
    Ok(())
}
