//! Value type for sqlvtab
//!
//! A dynamically typed scalar. Every value carries its own type tag, and the
//! operators in [`coerce`] decide what to do from the tags of their operands.

pub mod coerce;

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use crate::vtab::ResultSink;

/// A dynamically typed scalar value
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    /// Text value
    Text(String),
    /// Double-precision floating point value
    Real(f64),
    /// 64-bit signed integer value
    Integer(i64),
    /// Binary data
    Blob(Vec<u8>),
    /// NULL value
    Null,
}

// Bitwise float comparison keeps Eq and Hash consistent
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Real(a), Value::Real(b)) => a.to_bits() == b.to_bits(),
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Blob(a), Value::Blob(b)) => a == b,
            (Value::Null, Value::Null) => true,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl std::hash::Hash for Value {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Text(v) => v.hash(state),
            Value::Real(v) => v.to_bits().hash(state),
            Value::Integer(v) => v.hash(state),
            Value::Blob(v) => v.hash(state),
            Value::Null => {}
        }
    }
}

/// Storage class rank used by the store's key order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum StorageClass {
    Null,
    Numeric,
    Text,
    Blob,
}

impl Value {
    /// Check if this value is NULL
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Try to convert to i64 (integers only)
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Try to convert to f64 (numeric values only)
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Real(f) => Some(*f),
            _ => None,
        }
    }

    /// Try to borrow as text
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Get the type name of this value
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Text(_) => "text",
            Value::Real(_) => "real",
            Value::Integer(_) => "integer",
            Value::Blob(_) => "blob",
            Value::Null => "null",
        }
    }

    /// Storage class of this value
    pub fn storage_class(&self) -> StorageClass {
        match self {
            Value::Null => StorageClass::Null,
            Value::Integer(_) | Value::Real(_) => StorageClass::Numeric,
            Value::Text(_) => StorageClass::Text,
            Value::Blob(_) => StorageClass::Blob,
        }
    }

    /// Total order used for store keys.
    ///
    /// NULL sorts first, then numbers by value, then text by bytes, then blobs.
    pub fn storage_cmp(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => a.cmp(b),
            (Value::Real(a), Value::Real(b)) => a.total_cmp(b),
            (Value::Integer(a), Value::Real(b)) => {
                coerce::int_real_cmp(*a, *b).unwrap_or_else(|| (*a as f64).total_cmp(b))
            }
            (Value::Real(a), Value::Integer(b)) => coerce::int_real_cmp(*b, *a)
                .map(Ordering::reverse)
                .unwrap_or_else(|| a.total_cmp(&(*b as f64))),
            (Value::Text(a), Value::Text(b)) => a.as_bytes().cmp(b.as_bytes()),
            (Value::Blob(a), Value::Blob(b)) => a.cmp(b),
            _ => self.storage_class().cmp(&other.storage_class()),
        }
    }

    /// Hand this value to a host result sink
    pub fn emit(&self, sink: &mut dyn ResultSink) {
        match self {
            Value::Null => sink.result_null(),
            Value::Blob(b) => sink.result_blob(b),
            Value::Real(f) => sink.result_double(*f),
            Value::Integer(i) => sink.result_int64(*i),
            Value::Text(s) => sink.result_text(s),
        }
    }
}

/// Render a Real as shortest round-trip digits, always distinguishable from an Integer
pub fn format_real(f: f64) -> String {
    if f.is_nan() {
        return "NaN".to_string();
    }
    if f.is_infinite() {
        return if f.is_sign_positive() { "Inf" } else { "-Inf" }.to_string();
    }

    // `{:e}` yields the shortest digits that round-trip, e.g. "-1.81e1"
    let sci = format!("{:e}", f);
    let (mantissa, exp) = match sci.split_once('e') {
        Some((m, e)) => (m, e.parse::<i32>().unwrap_or(0)),
        None => (sci.as_str(), 0),
    };
    let (sign, mantissa) = match mantissa.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", mantissa),
    };

    if !(-4..15).contains(&exp) {
        let exp_sign = if exp < 0 { '-' } else { '+' };
        return format!("{}{}e{}{:02}", sign, mantissa, exp_sign, exp.unsigned_abs());
    }

    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();
    let point = exp + 1;
    let body = if point <= 0 {
        format!("0.{}{}", "0".repeat(point.unsigned_abs() as usize), digits)
    } else {
        let point = point as usize;
        if point >= digits.len() {
            format!("{}{}.0", digits, "0".repeat(point - digits.len()))
        } else {
            format!("{}.{}", &digits[..point], &digits[point..])
        }
    };
    format!("{}{}", sign, body)
}

fn write_quoted_blob(f: &mut fmt::Formatter<'_>, bytes: &[u8]) -> fmt::Result {
    f.write_str("\"")?;
    for chunk in bytes.utf8_chunks() {
        for c in chunk.valid().chars() {
            match c {
                '"' => f.write_str("\\\"")?,
                '\\' => f.write_str("\\\\")?,
                '\n' => f.write_str("\\n")?,
                '\r' => f.write_str("\\r")?,
                '\t' => f.write_str("\\t")?,
                c if c.is_control() && (c as u32) < 0x80 => write!(f, "\\x{:02x}", c as u32)?,
                c if c.is_control() => write!(f, "\\u{:04x}", c as u32)?,
                c => write!(f, "{}", c)?,
            }
        }
        for b in chunk.invalid() {
            write!(f, "\\x{:02x}", b)?;
        }
    }
    f.write_str("\"")
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(s) => f.write_str(s),
            Value::Real(n) => f.write_str(&format_real(*n)),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Blob(b) => write_quoted_blob(f, b),
            Value::Null => f.write_str("NULL"),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl From<&serde_json::Value> for Value {
    fn from(v: &serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::from(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => n.as_f64().map_or(Value::Null, Value::Real),
            },
            serde_json::Value::String(s) => Value::Text(s.clone()),
            other => Value::Text(other.to_string()),
        }
    }
}
