//! Operator semantics over [`Value`]
//!
//! Type coercion, numeric promotion, comparison and three-valued logic.
//! Every operator of the expression language bottoms out here.

use std::cmp::Ordering;

use super::Value;
use crate::error::{Error, Result};

/// Binary arithmetic operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl CmpOp {
    fn holds(self, ord: Ordering) -> bool {
        match self {
            CmpOp::Eq => ord == Ordering::Equal,
            CmpOp::Neq => ord != Ordering::Equal,
            CmpOp::Lt => ord == Ordering::Less,
            CmpOp::Lte => ord != Ordering::Greater,
            CmpOp::Gt => ord == Ordering::Greater,
            CmpOp::Gte => ord != Ordering::Less,
        }
    }
}

/// Parse the longest numeric prefix of `s`.
///
/// Leading whitespace is skipped. Returns `None` when no digit starts the
/// text. Integer-looking prefixes that do not fit in 64 bits become Real.
pub fn numeric_prefix(s: &str) -> Option<Value> {
    let s = s.trim_start();
    let bytes = s.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'+') | Some(b'-')) {
        end += 1;
    }

    let int_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    let mut digits = end - int_start;
    let mut is_real = false;

    if end < bytes.len() && bytes[end] == b'.' {
        let mut frac_end = end + 1;
        while frac_end < bytes.len() && bytes[frac_end].is_ascii_digit() {
            frac_end += 1;
        }
        let frac_digits = frac_end - end - 1;
        if digits + frac_digits > 0 {
            digits += frac_digits;
            is_real = true;
            end = frac_end;
        }
    }
    if digits == 0 {
        return None;
    }

    if end < bytes.len() && (bytes[end] == b'e' || bytes[end] == b'E') {
        let mut exp_end = end + 1;
        if exp_end < bytes.len() && (bytes[exp_end] == b'+' || bytes[exp_end] == b'-') {
            exp_end += 1;
        }
        let exp_digits_start = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > exp_digits_start {
            is_real = true;
            end = exp_end;
        }
    }

    let text = &s[..end];
    if !is_real {
        if let Ok(i) = text.parse::<i64>() {
            return Some(Value::Integer(i));
        }
    }
    text.parse::<f64>().ok().map(Value::Real)
}

/// Coerce a value into the numeric domain.
///
/// Numbers and NULL pass through; text and blobs use their numeric prefix,
/// falling back to `Integer(0)`.
pub fn to_numeric(value: &Value) -> Value {
    match value {
        Value::Integer(_) | Value::Real(_) | Value::Null => value.clone(),
        Value::Text(s) => numeric_prefix(s).unwrap_or(Value::Integer(0)),
        Value::Blob(b) => numeric_prefix(&String::from_utf8_lossy(b)).unwrap_or(Value::Integer(0)),
    }
}

/// Truth value under three-valued logic; `None` is unknown
pub fn truth(value: &Value) -> Option<bool> {
    match to_numeric(value) {
        Value::Integer(i) => Some(i != 0),
        Value::Real(f) => Some(f != 0.0),
        _ => None,
    }
}

fn from_truth(t: Option<bool>) -> Value {
    match t {
        Some(b) => Value::Integer(b as i64),
        None => Value::Null,
    }
}

fn real_result(f: f64) -> Value {
    if f.is_nan() {
        Value::Null
    } else {
        Value::Real(f)
    }
}

/// Compare an integer with a real without losing integer precision
pub(crate) fn int_real_cmp(i: i64, r: f64) -> Option<Ordering> {
    if r.is_nan() {
        return None;
    }
    // 2^63 is exactly representable; anything at or past it is out of i64 range
    if r >= 9_223_372_036_854_775_808.0 {
        return Some(Ordering::Less);
    }
    if r < -9_223_372_036_854_775_808.0 {
        return Some(Ordering::Greater);
    }
    let whole = r.trunc();
    match i.cmp(&(whole as i64)) {
        Ordering::Equal => 0.0_f64.partial_cmp(&(r - whole)),
        ord => Some(ord),
    }
}

fn numeric_cmp(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Integer(x), Value::Integer(y)) => Some(x.cmp(y)),
        (Value::Real(x), Value::Real(y)) => x.partial_cmp(y),
        (Value::Integer(x), Value::Real(y)) => int_real_cmp(*x, *y),
        (Value::Real(x), Value::Integer(y)) => int_real_cmp(*y, *x).map(Ordering::reverse),
        _ => None,
    }
}

/// Order two values under SQL comparison rules; `None` when the result is NULL
pub fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Null, _) | (_, Value::Null) => None,
        (Value::Blob(x), Value::Blob(y)) => Some(x.cmp(y)),
        (Value::Blob(_), _) => Some(Ordering::Greater),
        (_, Value::Blob(_)) => Some(Ordering::Less),
        (Value::Text(x), Value::Text(y)) => Some(x.as_bytes().cmp(y.as_bytes())),
        _ => numeric_cmp(&to_numeric(a), &to_numeric(b)),
    }
}

/// Apply a comparison operator, yielding `Integer(1)`, `Integer(0)` or `Null`
pub fn comparison(op: CmpOp, a: &Value, b: &Value) -> Value {
    from_truth(compare(a, b).map(|ord| op.holds(ord)))
}

/// Apply an arithmetic operator
pub fn arithmetic(op: ArithOp, a: &Value, b: &Value) -> Value {
    let (x, y) = match (to_numeric(a), to_numeric(b)) {
        (Value::Null, _) | (_, Value::Null) => return Value::Null,
        pair => pair,
    };

    match (op, &x, &y) {
        (ArithOp::Add, Value::Integer(p), Value::Integer(q)) => p
            .checked_add(*q)
            .map_or_else(|| Value::Real((*p as i128 + *q as i128) as f64), Value::Integer),
        (ArithOp::Sub, Value::Integer(p), Value::Integer(q)) => p
            .checked_sub(*q)
            .map_or_else(|| Value::Real((*p as i128 - *q as i128) as f64), Value::Integer),
        (ArithOp::Mul, Value::Integer(p), Value::Integer(q)) => p
            .checked_mul(*q)
            .map_or_else(|| Value::Real((*p as i128 * *q as i128) as f64), Value::Integer),
        (ArithOp::Mod, Value::Integer(p), Value::Integer(q)) => {
            if *q == 0 {
                Value::Null
            } else {
                Value::Integer(p.wrapping_rem(*q))
            }
        }
        (ArithOp::Mod, _, _) => {
            // Real operands are truncated toward zero; the result stays Real
            let p = x.as_f64().unwrap_or(0.0).trunc() as i64;
            let q = y.as_f64().unwrap_or(0.0).trunc() as i64;
            if q == 0 {
                Value::Null
            } else {
                Value::Real(p.wrapping_rem(q) as f64)
            }
        }
        (ArithOp::Div, _, _) => {
            let q = y.as_f64().unwrap_or(0.0);
            if q == 0.0 {
                Value::Null
            } else {
                real_result(x.as_f64().unwrap_or(0.0) / q)
            }
        }
        (ArithOp::Add, _, _) => real_result(x.as_f64().unwrap_or(0.0) + y.as_f64().unwrap_or(0.0)),
        (ArithOp::Sub, _, _) => real_result(x.as_f64().unwrap_or(0.0) - y.as_f64().unwrap_or(0.0)),
        (ArithOp::Mul, _, _) => real_result(x.as_f64().unwrap_or(0.0) * y.as_f64().unwrap_or(0.0)),
    }
}

/// Three-valued AND
pub fn and(a: &Value, b: &Value) -> Value {
    from_truth(match (truth(a), truth(b)) {
        (Some(false), _) | (_, Some(false)) => Some(false),
        (Some(true), Some(true)) => Some(true),
        _ => None,
    })
}

/// Three-valued OR
pub fn or(a: &Value, b: &Value) -> Value {
    from_truth(match (truth(a), truth(b)) {
        (Some(true), _) | (_, Some(true)) => Some(true),
        (Some(false), Some(false)) => Some(false),
        _ => None,
    })
}

/// Three-valued NOT
pub fn not(a: &Value) -> Value {
    from_truth(truth(a).map(|t| !t))
}

fn unary_operand(op: &'static str, a: &Value) -> Result<Value> {
    match a {
        Value::Integer(_) | Value::Real(_) | Value::Null => Ok(a.clone()),
        Value::Text(s) => numeric_prefix(s).ok_or(Error::UndefinedOperation {
            op,
            operand: "non-numeric text",
        }),
        Value::Blob(_) => Err(Error::UndefinedOperation { op, operand: "blob" }),
    }
}

/// Unary minus
pub fn negate(a: &Value) -> Result<Value> {
    Ok(match unary_operand("unary -", a)? {
        Value::Integer(i) => i
            .checked_neg()
            .map_or_else(|| Value::Real(-(i as f64)), Value::Integer),
        Value::Real(f) => Value::Real(-f),
        other => other,
    })
}

/// Unary plus
pub fn identity(a: &Value) -> Result<Value> {
    unary_operand("unary +", a)
}
