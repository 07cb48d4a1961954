//! Per-range-variable index selection. Works on the predicates the
//! resolver assigned to one range variable and picks the access path:
//! the index with the longest leading prefix covered by equality
//! predicates, a single-column range scan as fallback, or a full scan
//! with every predicate residual.

use crate::expr::{CmpOp, Expr};
use crate::plan::{AccessPath, JoinType};
use crate::schema::TableDef;

/// Where a consumed predicate came from, so the resolver can keep the
/// remainder in the right residual list.
#[derive(Debug, Clone, Copy)]
enum Source {
    Join(usize),
    Where(usize),
}

#[derive(Debug)]
struct Candidate {
    source: Source,
    column: usize,
    op: CmpOp,
    value: Expr,
}

#[derive(Debug)]
pub(crate) struct AccessSelection {
    pub access: AccessPath,
    pub end_condition: Option<Expr>,
    pub used_join: Vec<usize>,
    pub used_where: Vec<usize>,
}

/// A predicate can drive the index of range variable `position` only
/// if one side is a bare column of that range variable and the other
/// side references no range variable at or after it.
fn indexable(pred: &Expr, position: usize) -> Option<(usize, CmpOp, Expr)> {
    let Expr::Cmp { op, left, right } = pred else {
        return None;
    };
    if *op == CmpOp::Ne {
        return None;
    }
    if let Some(column) = left.as_column_of(position) {
        if !right.references_at_or_after(position) {
            return Some((column, *op, (**right).clone()));
        }
    }
    if let Some(column) = right.as_column_of(position) {
        if !left.references_at_or_after(position) {
            return Some((column, op.reversed(), (**left).clone()));
        }
    }
    None
}

pub(crate) fn select_access(
    table: &TableDef,
    position: usize,
    join_type: JoinType,
    join_preds: &[Expr],
    where_preds: &[Expr],
) -> AccessSelection {
    let mut candidates = Vec::new();
    for (i, pred) in join_preds.iter().enumerate() {
        if let Some((column, op, value)) = indexable(pred, position) {
            candidates.push(Candidate {
                source: Source::Join(i),
                column,
                op,
                value,
            });
        }
    }
    // Where predicates assigned to an outer-joined range variable must
    // stay residual: the null-extension decision re-tests them against
    // the all-NULL image, which an index probe cannot represent.
    if !join_type.is_outer() {
        for (i, pred) in where_preds.iter().enumerate() {
            if let Some((column, op, value)) = indexable(pred, position) {
                candidates.push(Candidate {
                    source: Source::Where(i),
                    column,
                    op,
                    value,
                });
            }
        }
    }

    if let Some(selection) = equality_prefix(table, &candidates) {
        return selection;
    }
    if let Some(selection) = range_fallback(table, position, &candidates) {
        return selection;
    }
    AccessSelection {
        access: AccessPath::FullScan,
        end_condition: None,
        used_join: Vec::new(),
        used_where: Vec::new(),
    }
}

/// Longest run of index-leading columns fully covered by equality
/// candidates. Ties keep the earliest index.
fn equality_prefix(table: &TableDef, candidates: &[Candidate]) -> Option<AccessSelection> {
    let eq_for = |column: usize| {
        candidates
            .iter()
            .find(|c| c.column == column && c.op == CmpOp::Eq)
    };

    let mut best: Option<(usize, usize)> = None;
    for (i, index) in table.indexes().iter().enumerate() {
        let mut matched = 0;
        for &column in index.columns() {
            if eq_for(column).is_some() {
                matched += 1;
            } else {
                break;
            }
        }
        if matched > 0 && best.map_or(true, |(_, n)| matched > n) {
            best = Some((i, matched));
        }
    }

    let (index, matched) = best?;
    let mut keys = Vec::with_capacity(matched);
    let mut used_join = Vec::new();
    let mut used_where = Vec::new();
    for &column in &table.indexes()[index].columns()[..matched] {
        let c = eq_for(column)?;
        keys.push(c.value.clone());
        match c.source {
            Source::Join(i) => used_join.push(i),
            Source::Where(i) => used_where.push(i),
        }
    }
    Some(AccessSelection {
        access: AccessPath::IndexEquality { index, keys },
        end_condition: None,
        used_join,
        used_where,
    })
}

/// Range scan over the first index whose leading column carries a
/// comparison. One lower bound drives the probe; every upper bound on
/// the same column becomes an end condition.
fn range_fallback(
    table: &TableDef,
    position: usize,
    candidates: &[Candidate],
) -> Option<AccessSelection> {
    let (index, column) = table.indexes().iter().enumerate().find_map(|(i, idx)| {
        let leading = *idx.columns().first()?;
        candidates
            .iter()
            .any(|c| c.column == leading && c.op.is_range())
            .then_some((i, leading))
    })?;

    let mut start = None;
    let mut ends = Vec::new();
    let mut used_join = Vec::new();
    let mut used_where = Vec::new();
    for c in candidates.iter().filter(|c| c.column == column) {
        match c.op {
            CmpOp::Gt | CmpOp::Ge if start.is_none() => {
                start = Some((c.op, c.value.clone()));
            }
            CmpOp::Lt | CmpOp::Le => {
                ends.push(Expr::cmp(
                    c.op,
                    Expr::col(position, column),
                    c.value.clone(),
                ));
            }
            _ => continue,
        }
        match c.source {
            Source::Join(i) => used_join.push(i),
            Source::Where(i) => used_where.push(i),
        }
    }

    Some(AccessSelection {
        access: AccessPath::IndexRange { index, start },
        end_condition: Expr::and_all(ends),
        used_join,
        used_where,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnDef, IndexDef};
    use crate::types::DataType;

    fn table() -> TableDef {
        TableDef::new(
            "t",
            vec![
                ColumnDef::new("a", DataType::Int8),
                ColumnDef::new("b", DataType::Int8),
                ColumnDef::new("c", DataType::Int8),
            ],
        )
        .with_index(IndexDef::new("idx_a", vec![0], false))
        .with_index(IndexDef::new("idx_bc", vec![1, 2], false))
    }

    #[test]
    fn prefers_longest_equality_prefix() {
        let t = table();
        let preds = vec![
            Expr::eq(Expr::col(0, 1), Expr::lit(1)),
            Expr::eq(Expr::col(0, 2), Expr::lit(2)),
        ];
        let sel = select_access(&t, 0, JoinType::Inner, &[], &preds);
        match sel.access {
            AccessPath::IndexEquality { index, keys } => {
                assert_eq!(index, 1);
                assert_eq!(keys.len(), 2);
            }
            other => panic!("expected equality access, got {:?}", other),
        }
        assert_eq!(sel.used_where, vec![0, 1]);
    }

    #[test]
    fn range_fallback_splits_bounds() {
        let t = table();
        let preds = vec![
            Expr::cmp(CmpOp::Gt, Expr::col(0, 0), Expr::lit(5)),
            Expr::cmp(CmpOp::Lt, Expr::col(0, 0), Expr::lit(9)),
        ];
        let sel = select_access(&t, 0, JoinType::Inner, &[], &preds);
        match sel.access {
            AccessPath::IndexRange { index, start } => {
                assert_eq!(index, 0);
                assert!(matches!(start, Some((CmpOp::Gt, _))));
            }
            other => panic!("expected range access, got {:?}", other),
        }
        assert!(sel.end_condition.is_some());
        assert_eq!(sel.used_where.len(), 2);
    }

    #[test]
    fn reversed_comparison_is_indexable() {
        let t = table();
        let preds = vec![Expr::eq(Expr::lit(3), Expr::col(0, 0))];
        let sel = select_access(&t, 0, JoinType::Inner, &[], &preds);
        assert!(matches!(sel.access, AccessPath::IndexEquality { .. }));
    }

    #[test]
    fn outer_join_ignores_where_predicates() {
        let t = table();
        let preds = vec![Expr::eq(Expr::col(0, 0), Expr::lit(1))];
        let sel = select_access(&t, 0, JoinType::Left, &[], &preds);
        assert!(matches!(sel.access, AccessPath::FullScan));
        assert!(sel.used_where.is_empty());
    }
}
