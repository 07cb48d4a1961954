//! # Expression Module
//!
//! The compiled predicate/value tree consumed by the resolver and the
//! iterators. Columns are positional: a `Column { range, column }` names
//! column `column` of the range variable at position `range` in the
//! statement's declaration order.
//!
//! The tree is a closed enum. The resolver inspects its shape (which
//! ranges a predicate touches, whether a comparison is indexable); the
//! evaluator in [`eval`] computes values against the current row of each
//! range variable.

pub mod eval;

use crate::types::Value;
use smallvec::SmallVec;
use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    pub fn matches(&self, ord: Ordering) -> bool {
        match self {
            CmpOp::Eq => ord == Ordering::Equal,
            CmpOp::Ne => ord != Ordering::Equal,
            CmpOp::Lt => ord == Ordering::Less,
            CmpOp::Le => ord != Ordering::Greater,
            CmpOp::Gt => ord == Ordering::Greater,
            CmpOp::Ge => ord != Ordering::Less,
        }
    }

    /// The operator with its operands swapped: `a < b` becomes `b > a`.
    pub fn reversed(&self) -> CmpOp {
        match self {
            CmpOp::Eq => CmpOp::Eq,
            CmpOp::Ne => CmpOp::Ne,
            CmpOp::Lt => CmpOp::Gt,
            CmpOp::Le => CmpOp::Ge,
            CmpOp::Gt => CmpOp::Lt,
            CmpOp::Ge => CmpOp::Le,
        }
    }

    pub fn is_range(&self) -> bool {
        matches!(self, CmpOp::Lt | CmpOp::Le | CmpOp::Gt | CmpOp::Ge)
    }
}

impl fmt::Display for CmpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            CmpOp::Eq => "=",
            CmpOp::Ne => "<>",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        };
        write!(f, "{}", text)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Column { range: usize, column: usize },
    Literal(Value),
    /// Execution-supplied value (bound parameter or the result of a
    /// sub-query evaluated by the statement layer).
    Param(usize),
    /// Tuple / row value, e.g. the sides of `(a, b) = (c, d)`.
    Row(Vec<Expr>),
    Cmp {
        op: CmpOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    IsNull {
        expr: Box<Expr>,
        negated: bool,
    },
    InList {
        expr: Box<Expr>,
        list: Vec<Expr>,
    },
    /// SET-list marker: restore the column default or regenerate an
    /// identity value. Only valid as an assignment source.
    Default,
}

impl Expr {
    pub fn col(range: usize, column: usize) -> Expr {
        Expr::Column { range, column }
    }

    pub fn lit(value: impl Into<Value>) -> Expr {
        Expr::Literal(value.into())
    }

    pub fn cmp(op: CmpOp, left: Expr, right: Expr) -> Expr {
        Expr::Cmp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn eq(left: Expr, right: Expr) -> Expr {
        Expr::cmp(CmpOp::Eq, left, right)
    }

    pub fn and(left: Expr, right: Expr) -> Expr {
        Expr::And(Box::new(left), Box::new(right))
    }

    /// Conjunction of a list, or `None` for an empty list.
    pub fn and_all(mut exprs: Vec<Expr>) -> Option<Expr> {
        let first = if exprs.is_empty() {
            return None;
        } else {
            exprs.remove(0)
        };
        Some(exprs.into_iter().fold(first, Expr::and))
    }

    pub fn is_null(expr: Expr) -> Expr {
        Expr::IsNull {
            expr: Box::new(expr),
            negated: false,
        }
    }

    pub fn in_list(expr: Expr, list: Vec<Expr>) -> Expr {
        Expr::InList {
            expr: Box::new(expr),
            list,
        }
    }

    /// The set of range-variable positions this expression reads.
    pub fn collect_ranges(&self, out: &mut SmallVec<[usize; 4]>) {
        match self {
            Expr::Column { range, .. } => {
                if !out.contains(range) {
                    out.push(*range);
                }
            }
            Expr::Literal(_) | Expr::Param(_) | Expr::Default => {}
            Expr::Row(items) | Expr::InList { list: items, .. } => {
                if let Expr::InList { expr, .. } = self {
                    expr.collect_ranges(out);
                }
                for item in items {
                    item.collect_ranges(out);
                }
            }
            Expr::Cmp { left, right, .. } => {
                left.collect_ranges(out);
                right.collect_ranges(out);
            }
            Expr::And(l, r) | Expr::Or(l, r) => {
                l.collect_ranges(out);
                r.collect_ranges(out);
            }
            Expr::Not(e) => e.collect_ranges(out),
            Expr::IsNull { expr, .. } => expr.collect_ranges(out),
        }
    }

    pub fn max_range(&self) -> Option<usize> {
        let mut ranges: SmallVec<[usize; 4]> = SmallVec::new();
        self.collect_ranges(&mut ranges);
        ranges.iter().copied().max()
    }

    /// True if the expression reads the given range variable or any
    /// later one. Index conditions for range variable `r` must be false
    /// here for their value side.
    pub fn references_at_or_after(&self, range: usize) -> bool {
        let mut ranges: SmallVec<[usize; 4]> = SmallVec::new();
        self.collect_ranges(&mut ranges);
        ranges.iter().any(|&r| r >= range)
    }

    /// The bare column position if this is `Column` of the given range.
    pub fn as_column_of(&self, range: usize) -> Option<usize> {
        match self {
            Expr::Column { range: r, column } if *r == range => Some(*column),
            _ => None,
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Column { range, column } => write!(f, "t{}.c{}", range, column),
            Expr::Literal(v) => write!(f, "{}", v),
            Expr::Param(i) => write!(f, "?{}", i),
            Expr::Row(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, ")")
            }
            Expr::Cmp { op, left, right } => write!(f, "{} {} {}", left, op, right),
            Expr::And(l, r) => write!(f, "({} AND {})", l, r),
            Expr::Or(l, r) => write!(f, "({} OR {})", l, r),
            Expr::Not(e) => write!(f, "NOT ({})", e),
            Expr::IsNull { expr, negated } => {
                write!(f, "{} IS {}NULL", expr, if *negated { "NOT " } else { "" })
            }
            Expr::InList { expr, list } => {
                write!(f, "{} IN (", expr)?;
                for (i, item) in list.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, ")")
            }
            Expr::Default => write!(f, "DEFAULT"),
        }
    }
}
