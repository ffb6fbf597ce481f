//! Virtual table boundary
//!
//! The capability interface a host query engine drives: table lifecycle,
//! index selection, scanning, mutation and transaction framing. [`Vtab`]
//! implements it over the copy-on-write table store.

pub mod cursor;
pub mod table;

pub use cursor::{CursorState, VtabCursor};
pub use table::Vtab;

use crate::config::TableConfig;
use crate::error::Result;
use crate::executor::IndexInfo;
use crate::value::Value;

/// The host's dynamic column-result API
pub trait ResultSink {
    fn result_null(&mut self);
    fn result_blob(&mut self, blob: &[u8]);
    fn result_double(&mut self, value: f64);
    fn result_int64(&mut self, value: i64);
    fn result_text(&mut self, text: &str);
}

/// A sink that keeps the last value handed to it
#[derive(Debug, Default)]
pub struct ColumnContext {
    value: Option<Value>,
}

impl ColumnContext {
    pub fn new() -> Self {
        Self { value: None }
    }

    /// Take the value out of this context, leaving `None`
    pub fn take_value(&mut self) -> Option<Value> {
        self.value.take()
    }
}

impl ResultSink for ColumnContext {
    fn result_null(&mut self) {
        self.value = Some(Value::Null);
    }

    fn result_blob(&mut self, blob: &[u8]) {
        self.value = Some(Value::Blob(blob.to_vec()));
    }

    fn result_double(&mut self, value: f64) {
        self.value = Some(Value::Real(value));
    }

    fn result_int64(&mut self, value: i64) {
        self.value = Some(Value::Integer(value));
    }

    fn result_text(&mut self, text: &str) {
        self.value = Some(Value::Text(text.to_string()));
    }
}

/// A column value supplied by the host for a mutation
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    /// The statement does not touch this column
    Unchanged,
    Value(Value),
}

impl From<Value> for ArgValue {
    fn from(value: Value) -> Self {
        ArgValue::Value(value)
    }
}

/// A virtual table module.
///
/// Mutation and framing methods default to no-ops so read-only modules only
/// need `connect`, `declaration`, `best_index` and `open`.
pub trait VirtualTable: Send + Sync {
    type Cursor: VirtualCursor;

    /// Connect to a table described by module arguments
    fn connect(name: &str, args: &[&str], config: TableConfig) -> Result<Self>
    where
        Self: Sized;

    /// The `CREATE TABLE` statement the host declares for this table
    fn declaration(&self) -> String;

    /// Choose a plan for the host's constraints
    fn best_index(&self, info: &mut IndexInfo) -> Result<()>;

    /// Open a scan cursor
    fn open(&self) -> Result<Self::Cursor>;

    /// Insert a row; `rowid` is `None` when the host leaves it to the table
    fn insert(&mut self, rowid: Option<i64>, values: &[ArgValue]) -> Result<i64>;

    /// Update a row in place, keeping its rowid
    fn update(&mut self, rowid: i64, values: &[ArgValue]) -> Result<()>;

    fn delete(&mut self, rowid: i64) -> Result<()>;

    /// Replace a row, possibly under a new rowid or key; returns the new rowid
    fn replace(&mut self, old_rowid: i64, new_rowid: Option<i64>, values: &[ArgValue])
        -> Result<i64>;

    fn begin(&mut self) -> Result<()> {
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        Ok(())
    }

    fn savepoint(&mut self, _level: i32) -> Result<()> {
        Ok(())
    }

    fn release(&mut self, _level: i32) -> Result<()> {
        Ok(())
    }

    fn rollback_to(&mut self, _level: i32) -> Result<()> {
        Ok(())
    }

    fn disconnect(&mut self) -> Result<()> {
        Ok(())
    }
}

/// A scan over a virtual table
pub trait VirtualCursor: Send {
    /// Start a scan for the plan identifier chosen by `best_index`
    fn filter(&mut self, idx_str: &str, args: &[Value]) -> Result<()>;

    /// Advance to the next row
    fn next(&mut self) -> Result<()>;

    /// Whether there is no current row
    fn eof(&self) -> bool;

    /// Value of column `index` (`-1` for the rowid) at the current row
    fn column(&self, index: i32) -> Result<Value>;

    /// Hand column `index` at the current row to the host
    fn column_into(&self, sink: &mut dyn ResultSink, index: i32) -> Result<()>;

    fn rowid(&self) -> Result<i64>;

    /// Release the scan; idempotent
    fn close(&mut self);
}
