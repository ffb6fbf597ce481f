//! Scan cursor
//!
//! A cursor scans the table as it was when the cursor was opened. Each step
//! re-seeks the snapshot just past the current key, so the cursor holds no
//! borrowed iterator and mutations through the table never disturb it.

use std::cmp::Ordering;
use std::ops::Bound;
use std::sync::Arc;

use tracing::debug;

use super::{ResultSink, VirtualCursor};
use crate::catalog::{Schema, ROWID_COLUMN};
use crate::error::{Error, Result};
use crate::executor::{ConstraintOp, RowContext, ScanPlan};
use crate::storage::btree::Iter;
use crate::storage::{BPlusTree, IndexKey, StoredRow};
use crate::value::Value;

/// Cursor lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    Created,
    Positioned,
    Exhausted,
    Closed,
}

/// Where a key lies relative to the scanned key range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Before,
    Inside,
    After,
}

/// Key range decoded from a plan identifier and its arguments
#[derive(Debug, Clone)]
struct KeyRange {
    /// Values pinned by equality on the leading key columns
    prefix: Vec<Value>,
    /// Bound on the key column after the prefix, with inclusiveness
    lower: Option<(Value, bool)>,
    upper: Option<(Value, bool)>,
    descending: bool,
}

impl KeyRange {
    fn bounded(&self, value: &Value) -> Vec<Value> {
        let mut key = self.prefix.clone();
        key.push(value.clone());
        key
    }

    fn first<'a>(&self, rows: &'a BPlusTree<StoredRow>) -> Iter<'a, StoredRow> {
        if self.descending {
            let end = match &self.upper {
                Some((v, _)) => self.bounded(v),
                None => self.prefix.clone(),
            };
            rows.seek_back(|k| k.compare_prefix(&end) != Ordering::Greater)
        } else {
            let start = match &self.lower {
                Some((v, _)) => self.bounded(v),
                None => self.prefix.clone(),
            };
            rows.seek(|k| k.compare_prefix(&start) == Ordering::Less)
        }
    }

    /// Bounds only match key components of their own storage class
    fn locate(&self, key: &IndexKey) -> Side {
        match key.compare_prefix(&self.prefix) {
            Ordering::Less => return Side::Before,
            Ordering::Greater => return Side::After,
            Ordering::Equal => {}
        }
        let component = match key.values().get(self.prefix.len()) {
            Some(c) => c,
            None => return Side::Inside,
        };

        if let Some((v, inclusive)) = &self.lower {
            match component.storage_class().cmp(&v.storage_class()) {
                Ordering::Less => return Side::Before,
                Ordering::Greater => return Side::After,
                Ordering::Equal => match component.storage_cmp(v) {
                    Ordering::Less => return Side::Before,
                    Ordering::Equal if !inclusive => return Side::Before,
                    _ => {}
                },
            }
        }
        if let Some((v, inclusive)) = &self.upper {
            match component.storage_class().cmp(&v.storage_class()) {
                Ordering::Less => return Side::Before,
                Ordering::Greater => return Side::After,
                Ordering::Equal => match component.storage_cmp(v) {
                    Ordering::Greater => return Side::After,
                    Ordering::Equal if !inclusive => return Side::After,
                    _ => {}
                },
            }
        }
        Side::Inside
    }
}

/// Cursor over a table snapshot
#[derive(Debug)]
pub struct VtabCursor {
    schema: Arc<Schema>,
    rows: BPlusTree<StoredRow>,
    /// `table.column` per position, for row contexts
    qualified: Vec<String>,
    range: Option<KeyRange>,
    current: Option<(IndexKey, StoredRow)>,
    state: CursorState,
}

impl VtabCursor {
    pub fn new(schema: Arc<Schema>, rows: BPlusTree<StoredRow>) -> Self {
        let qualified = (0..schema.column_count())
            .filter_map(|p| schema.qualified_name(p))
            .collect();
        Self {
            schema,
            rows,
            qualified,
            range: None,
            current: None,
            state: CursorState::Created,
        }
    }

    pub fn state(&self) -> CursorState {
        self.state
    }

    /// Build the key range a plan's terms and arguments describe.
    ///
    /// `Ok(None)` when an argument is NULL, which no key matches.
    fn decode(&self, plan: &ScanPlan, args: &[Value]) -> Result<Option<KeyRange>> {
        if args.len() != plan.terms.len() {
            return Err(Error::InvalidPlan(format!(
                "plan binds {} arguments, got {}",
                plan.terms.len(),
                args.len()
            )));
        }
        if let Some(term) = plan.terms.iter().find(|t| !t.op.is_indexable()) {
            return Err(Error::InvalidPlan(format!(
                "operator {:?} cannot bound a scan",
                term.op
            )));
        }
        if args.iter().any(Value::is_null) {
            return Ok(None);
        }

        let mut used = vec![false; args.len()];
        let mut take = |column: i32, pred: fn(ConstraintOp) -> bool| {
            let i = plan
                .terms
                .iter()
                .zip(used.iter())
                .position(|(t, &u)| !u && t.column == column && pred(t.op))?;
            used[i] = true;
            Some((args[i].clone(), plan.terms[i].op))
        };

        let mut range = KeyRange {
            prefix: Vec::new(),
            lower: None,
            upper: None,
            descending: plan.descending,
        };
        for column in self.schema.key_columns() {
            if let Some((v, _)) = take(column, |op| op == ConstraintOp::Eq) {
                range.prefix.push(v);
                continue;
            }
            range.lower =
                take(column, ConstraintOp::is_lower).map(|(v, op)| (v, op.is_inclusive()));
            range.upper =
                take(column, ConstraintOp::is_upper).map(|(v, op)| (v, op.is_inclusive()));
            break;
        }

        if let Some(i) = used.iter().position(|u| !u) {
            return Err(Error::InvalidPlan(format!(
                "term on column {} does not follow the key order",
                plan.terms[i].column
            )));
        }
        Ok(Some(range))
    }

    /// Next row in scan order strictly past `after`, or the first one
    fn seek(&self, after: Option<&IndexKey>) -> Option<(IndexKey, StoredRow)> {
        let range = self.range.as_ref()?;
        let iter = match (after, range.descending) {
            (Some(k), false) => self.rows.iter_from(Bound::Excluded(k)),
            (Some(k), true) => self.rows.iter_back_from(Bound::Excluded(k)),
            (None, _) => range.first(&self.rows),
        };
        for (key, row) in iter {
            match (range.locate(key), range.descending) {
                (Side::Inside, _) => return Some((key.clone(), row.clone())),
                (Side::After, false) | (Side::Before, true) => return None,
                _ => continue,
            }
        }
        None
    }

    fn position(&mut self, next: Option<(IndexKey, StoredRow)>) {
        self.state = if next.is_some() {
            CursorState::Positioned
        } else {
            CursorState::Exhausted
        };
        self.current = next;
    }

    fn current_row(&self, op: &str) -> Result<&StoredRow> {
        match (&self.current, self.state) {
            (Some((_, row)), CursorState::Positioned) => Ok(row),
            (_, state) => Err(Error::ContractViolation(format!(
                "{} called on a cursor in state {:?}",
                op, state
            ))),
        }
    }

    fn value_at(&self, index: i32) -> Result<&Value> {
        let row = self.current_row("column")?;
        usize::try_from(index)
            .ok()
            .and_then(|i| row.values.get(i))
            .ok_or_else(|| Error::ContractViolation(format!("column {} out of range", index)))
    }
}

impl VirtualCursor for VtabCursor {
    fn filter(&mut self, idx_str: &str, args: &[Value]) -> Result<()> {
        if self.state == CursorState::Closed {
            return Err(Error::ContractViolation(
                "filter called on a closed cursor".to_string(),
            ));
        }
        let plan = ScanPlan::decode(idx_str)?;
        self.range = self.decode(&plan, args)?;
        let first = self.seek(None);
        self.position(first);

        debug!(
            table = self.schema.table_name(),
            terms = plan.terms.len(),
            descending = plan.descending,
            state = ?self.state,
            "cursor filtered"
        );
        Ok(())
    }

    fn next(&mut self) -> Result<()> {
        if self.state != CursorState::Positioned {
            return Err(Error::ContractViolation(format!(
                "next called on a cursor in state {:?}",
                self.state
            )));
        }
        let after = self.current.as_ref().map(|(k, _)| k);
        let next = self.seek(after);
        self.position(next);
        Ok(())
    }

    fn eof(&self) -> bool {
        self.state != CursorState::Positioned
    }

    fn column(&self, index: i32) -> Result<Value> {
        if index == ROWID_COLUMN {
            return self.rowid().map(Value::Integer);
        }
        self.value_at(index).cloned()
    }

    fn column_into(&self, sink: &mut dyn ResultSink, index: i32) -> Result<()> {
        if index == ROWID_COLUMN {
            sink.result_int64(self.rowid()?);
        } else {
            self.value_at(index)?.emit(sink);
        }
        Ok(())
    }

    fn rowid(&self) -> Result<i64> {
        self.current_row("rowid").map(|row| row.rowid)
    }

    fn close(&mut self) {
        if self.state != CursorState::Closed {
            self.rows = BPlusTree::default();
            self.range = None;
            self.current = None;
            self.state = CursorState::Closed;
        }
    }
}

/// The current row, keyed by `table.column`
impl RowContext for VtabCursor {
    fn get(&self, name: &str) -> Option<&Value> {
        let row = self.current_row("get").ok()?;
        let pos = self.qualified.iter().position(|q| q == name)?;
        row.values.get(pos)
    }
}
