//! Expression evaluation against an execution scope.
//!
//! The scope holds one current row per range variable: the rows of all
//! range variables left of the one being advanced, plus the candidate
//! row of that range variable itself. Predicate testing follows SQL
//! three-valued logic internally and maps UNKNOWN to false at the
//! boundary, the only place a filter cares.

use crate::expr::Expr;
use crate::types::Value;
use eyre::{bail, Result};

/// Three-valued logic outcome for predicate evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Truth {
    True,
    False,
    Unknown,
}

impl Truth {
    fn from_bool(b: bool) -> Truth {
        if b {
            Truth::True
        } else {
            Truth::False
        }
    }

    fn negate(self) -> Truth {
        match self {
            Truth::True => Truth::False,
            Truth::False => Truth::True,
            Truth::Unknown => Truth::Unknown,
        }
    }
}

pub struct EvalScope<'a> {
    /// Rows of range variables `0..outer.len()`; `None` means not yet
    /// materialized (legal only for positions no predicate here reads).
    outer: &'a [Option<&'a [Value]>],
    /// The candidate row of the range variable currently being advanced.
    current: Option<(usize, &'a [Value])>,
    params: &'a [Value],
}

impl<'a> EvalScope<'a> {
    pub fn new(
        outer: &'a [Option<&'a [Value]>],
        current: Option<(usize, &'a [Value])>,
        params: &'a [Value],
    ) -> Self {
        Self {
            outer,
            current,
            params,
        }
    }

    fn column(&self, range: usize, column: usize) -> Result<Value> {
        if let Some((pos, row)) = self.current {
            if pos == range {
                return match row.get(column) {
                    Some(v) => Ok(v.clone()),
                    None => bail!("internal error: column {} out of bounds", column),
                };
            }
        }
        match self.outer.get(range) {
            Some(Some(row)) => match row.get(column) {
                Some(v) => Ok(v.clone()),
                None => bail!("internal error: column {} out of bounds", column),
            },
            _ => bail!(
                "internal error: predicate references unbound range variable {}",
                range
            ),
        }
    }

    fn param(&self, idx: usize) -> Result<Value> {
        match self.params.get(idx) {
            Some(v) => Ok(v.clone()),
            None => bail!("parameter ?{} was not bound", idx),
        }
    }
}

/// Evaluate an expression to a value. Comparison and logic nodes yield
/// `Bool` or `Null` (UNKNOWN).
pub fn eval(expr: &Expr, scope: &EvalScope<'_>) -> Result<Value> {
    match expr {
        Expr::Column { range, column } => scope.column(*range, *column),
        Expr::Literal(v) => Ok(v.clone()),
        Expr::Param(i) => scope.param(*i),
        Expr::Row(_) => bail!("internal error: row value evaluated outside a comparison"),
        Expr::Default => bail!("internal error: DEFAULT marker outside a SET assignment"),
        _ => Ok(match test_truth(expr, scope)? {
            Truth::True => Value::Bool(true),
            Truth::False => Value::Bool(false),
            Truth::Unknown => Value::Null,
        }),
    }
}

/// Test a predicate; UNKNOWN counts as false.
pub fn test(expr: &Expr, scope: &EvalScope<'_>) -> Result<bool> {
    Ok(test_truth(expr, scope)? == Truth::True)
}

fn test_truth(expr: &Expr, scope: &EvalScope<'_>) -> Result<Truth> {
    match expr {
        Expr::Cmp { op, left, right } => {
            if let (Expr::Row(ls), Expr::Row(rs)) = (left.as_ref(), right.as_ref()) {
                return row_cmp(*op, ls, rs, scope);
            }
            let l = eval(left, scope)?;
            let r = eval(right, scope)?;
            Ok(match l.compare(&r) {
                Some(ord) => Truth::from_bool(op.matches(ord)),
                None => Truth::Unknown,
            })
        }
        Expr::And(l, r) => {
            let lt = test_truth(l, scope)?;
            if lt == Truth::False {
                return Ok(Truth::False);
            }
            let rt = test_truth(r, scope)?;
            Ok(match (lt, rt) {
                (_, Truth::False) => Truth::False,
                (Truth::True, Truth::True) => Truth::True,
                _ => Truth::Unknown,
            })
        }
        Expr::Or(l, r) => {
            let lt = test_truth(l, scope)?;
            if lt == Truth::True {
                return Ok(Truth::True);
            }
            let rt = test_truth(r, scope)?;
            Ok(match (lt, rt) {
                (_, Truth::True) => Truth::True,
                (Truth::False, Truth::False) => Truth::False,
                _ => Truth::Unknown,
            })
        }
        Expr::Not(e) => Ok(test_truth(e, scope)?.negate()),
        Expr::IsNull { expr, negated } => {
            let v = eval(expr, scope)?;
            let is_null = v.is_null();
            Ok(Truth::from_bool(if *negated { !is_null } else { is_null }))
        }
        Expr::InList { expr, list } => {
            let target = eval(expr, scope)?;
            if target.is_null() {
                return Ok(Truth::Unknown);
            }
            let mut saw_null = false;
            for item in list {
                let v = eval(item, scope)?;
                match target.sql_eq(&v) {
                    Some(true) => return Ok(Truth::True),
                    Some(false) => {}
                    None => saw_null = true,
                }
            }
            Ok(if saw_null { Truth::Unknown } else { Truth::False })
        }
        Expr::Literal(Value::Bool(b)) => Ok(Truth::from_bool(*b)),
        Expr::Literal(Value::Null) => Ok(Truth::Unknown),
        Expr::Column { .. } => match eval(expr, scope)? {
            Value::Bool(b) => Ok(Truth::from_bool(b)),
            Value::Null => Ok(Truth::Unknown),
            other => bail!("expected boolean predicate, got {}", other),
        },
        other => bail!("expected boolean predicate, got {}", other),
    }
}

fn row_cmp(op: crate::expr::CmpOp, ls: &[Expr], rs: &[Expr], scope: &EvalScope<'_>) -> Result<Truth> {
    use crate::expr::CmpOp;

    if ls.len() != rs.len() {
        bail!("internal error: row value degree mismatch");
    }
    match op {
        CmpOp::Eq | CmpOp::Ne => {
            let mut result = Truth::True;
            for (l, r) in ls.iter().zip(rs) {
                let lv = eval(l, scope)?;
                let rv = eval(r, scope)?;
                match lv.sql_eq(&rv) {
                    Some(true) => {}
                    Some(false) => {
                        result = Truth::False;
                        break;
                    }
                    None => result = Truth::Unknown,
                }
            }
            Ok(if op == CmpOp::Eq { result } else { result.negate() })
        }
        _ => bail!("internal error: row values only compare with = or <>"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::CmpOp;

    fn scope_with(row: &[Value]) -> (Vec<Option<&[Value]>>, Vec<Value>) {
        (vec![Some(row)], Vec::new())
    }

    #[test]
    fn comparison_with_null_is_unknown() {
        let row = vec![Value::Null, Value::Int(3)];
        let (outer, params) = scope_with(&row);
        let scope = EvalScope::new(&outer, None, &params);

        let e = Expr::eq(Expr::col(0, 0), Expr::lit(3));
        assert!(!test(&e, &scope).unwrap());

        let e = Expr::Not(Box::new(Expr::eq(Expr::col(0, 0), Expr::lit(3))));
        // NOT UNKNOWN is still UNKNOWN, so the filter rejects.
        assert!(!test(&e, &scope).unwrap());
    }

    #[test]
    fn in_list_with_null_member() {
        let row = vec![Value::Int(7)];
        let (outer, params) = scope_with(&row);
        let scope = EvalScope::new(&outer, None, &params);

        let hit = Expr::in_list(Expr::col(0, 0), vec![Expr::lit(5), Expr::lit(7)]);
        assert!(test(&hit, &scope).unwrap());

        let miss = Expr::in_list(
            Expr::col(0, 0),
            vec![Expr::lit(5), Expr::Literal(Value::Null)],
        );
        assert!(!test(&miss, &scope).unwrap());
    }

    #[test]
    fn row_value_equality() {
        let row = vec![Value::Int(1), Value::Int(2)];
        let (outer, params) = scope_with(&row);
        let scope = EvalScope::new(&outer, None, &params);

        let e = Expr::cmp(
            CmpOp::Eq,
            Expr::Row(vec![Expr::col(0, 0), Expr::col(0, 1)]),
            Expr::Row(vec![Expr::lit(1), Expr::lit(2)]),
        );
        assert!(test(&e, &scope).unwrap());
    }

    #[test]
    fn candidate_row_shadows_outer() {
        let outer_row = vec![Value::Int(1)];
        let candidate = vec![Value::Int(9)];
        let outer: Vec<Option<&[Value]>> = vec![Some(&outer_row)];
        let params: Vec<Value> = Vec::new();
        let scope = EvalScope::new(&outer, Some((1, &candidate)), &params);

        let e = Expr::eq(Expr::col(1, 0), Expr::lit(9));
        assert!(test(&e, &scope).unwrap());
        let e = Expr::eq(Expr::col(0, 0), Expr::lit(1));
        assert!(test(&e, &scope).unwrap());
    }

    #[test]
    fn unbound_range_is_internal_error() {
        let outer: Vec<Option<&[Value]>> = vec![None];
        let params: Vec<Value> = Vec::new();
        let scope = EvalScope::new(&outer, None, &params);
        let err = test(&Expr::eq(Expr::col(0, 0), Expr::lit(1)), &scope).unwrap_err();
        assert!(err.to_string().starts_with("internal error"));
    }
}
