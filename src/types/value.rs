//! # Value Types
//!
//! Owned scalar values and column data types for the row-access core.
//!
//! Comparison follows SQL three-valued logic: any comparison involving
//! NULL yields UNKNOWN, surfaced here as `None`. Index key ordering is a
//! separate total order (`key_cmp`) in which NULL sorts lowest, so index
//! scans can skip the NULL run at the front of a range.

use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// SQL comparison: `None` means UNKNOWN (a NULL operand or an
    /// incomparable type pairing).
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => None,
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
            (Value::Float(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    pub fn sql_eq(&self, other: &Value) -> Option<bool> {
        self.compare(other).map(|o| o == Ordering::Equal)
    }

    /// Total order used for index keys. NULL sorts before everything,
    /// booleans before numbers, numbers before text. Floats use IEEE
    /// total ordering so the order is antisymmetric even with NaN.
    pub fn key_cmp(&self, other: &Value) -> Ordering {
        fn rank(v: &Value) -> u8 {
            match v {
                Value::Null => 0,
                Value::Bool(_) => 1,
                Value::Int(_) | Value::Float(_) => 2,
                Value::Text(_) => 3,
            }
        }

        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Float(a), Value::Float(b)) => a.total_cmp(b),
            (Value::Int(a), Value::Float(b)) => (*a as f64).total_cmp(b),
            (Value::Float(a), Value::Int(b)) => a.total_cmp(&(*b as f64)),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (a, b) => rank(a).cmp(&rank(b)),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Text(s) => write!(f, "'{}'", s),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Bool,
    Int2,
    Int4,
    Int8,
    Float8,
    Text,
}

impl DataType {
    /// Whether a value is statically representable in this column type.
    /// Used by iterator setup: a probe constant outside the column's
    /// range can never match, so the scan opens empty.
    pub fn contains(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (DataType::Bool, Value::Bool(_)) => true,
            (DataType::Int2, Value::Int(i)) => (i64::from(i16::MIN)..=i64::from(i16::MAX)).contains(i),
            (DataType::Int4, Value::Int(i)) => (i64::from(i32::MIN)..=i64::from(i32::MAX)).contains(i),
            (DataType::Int8, Value::Int(_)) => true,
            (DataType::Int2 | DataType::Int4 | DataType::Int8, Value::Float(f)) => {
                f.fract() == 0.0 && self.contains(&Value::Int(*f as i64))
            }
            (DataType::Float8, Value::Float(_) | Value::Int(_)) => true,
            (DataType::Text, Value::Text(_)) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_comparison_is_unknown() {
        assert_eq!(Value::Null.compare(&Value::Int(1)), None);
        assert_eq!(Value::Int(1).compare(&Value::Null), None);
        assert_eq!(Value::Null.sql_eq(&Value::Null), None);
    }

    #[test]
    fn mixed_numeric_comparison() {
        assert_eq!(
            Value::Int(2).compare(&Value::Float(2.0)),
            Some(Ordering::Equal)
        );
        assert_eq!(
            Value::Float(1.5).compare(&Value::Int(2)),
            Some(Ordering::Less)
        );
    }

    #[test]
    fn key_order_puts_null_first() {
        assert_eq!(Value::Null.key_cmp(&Value::Int(i64::MIN)), Ordering::Less);
        assert_eq!(Value::Int(1).key_cmp(&Value::Text("a".into())), Ordering::Less);
    }

    #[test]
    fn int2_range_check() {
        assert!(DataType::Int2.contains(&Value::Int(32767)));
        assert!(!DataType::Int2.contains(&Value::Int(32768)));
        assert!(DataType::Int2.contains(&Value::Null));
        assert!(!DataType::Int4.contains(&Value::Int(1 << 40)));
    }
}
