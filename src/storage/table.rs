//! Table storage for sqlvtab
//!
//! This module combines a schema with copy-on-write trees to provide table
//! operations. Everything mutable lives in one [`Root`], so a snapshot of
//! the whole table is a single O(1) clone.

use std::sync::Arc;

use tracing::{debug, trace};

use super::btree::{BPlusTree, IndexKey};
use crate::catalog::Schema;
use crate::config::TableConfig;
use crate::error::{Constraint, Error, Result};
use crate::value::Value;

/// A stored row and the rowid the host knows it by
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRow {
    pub rowid: i64,
    pub values: Vec<Value>,
}

/// The mutable state of a table
#[derive(Debug, Clone)]
pub struct Root {
    /// Rows keyed by primary key, or by `[rowid]` when there is none
    rows: BPlusTree<StoredRow>,
    /// `[rowid]` to row key
    rowids: BPlusTree<IndexKey>,
    /// One tree per unique column set, mapping the set's values to a rowid
    uniques: Vec<BPlusTree<i64>>,
    /// Next rowid handed out when the host supplies none
    next_rowid: i64,
}

/// An independent copy of a table's state taken before a risky write
#[derive(Debug)]
#[must_use = "a snapshot must be restored or cancelled"]
pub struct Snapshot {
    root: Root,
}

impl Snapshot {
    /// Discard the snapshot, keeping the live state
    pub fn cancel(self) {
        trace!(rows = self.root.rows.len(), "snapshot cancelled");
    }
}

/// A table combining schema and storage
#[derive(Debug)]
pub struct Table {
    /// Table schema
    schema: Arc<Schema>,
    /// Live state
    root: Root,
}

impl Table {
    /// Create a new empty table
    pub fn new(schema: Arc<Schema>, config: &TableConfig) -> Self {
        let capacity = config.node_capacity;
        let root = Root {
            rows: BPlusTree::new(capacity),
            rowids: BPlusTree::new(capacity),
            uniques: schema
                .unique_sets()
                .iter()
                .map(|_| BPlusTree::new(capacity))
                .collect(),
            next_rowid: 1,
        };
        Self { schema, root }
    }

    /// Get table name
    pub fn name(&self) -> &str {
        self.schema.table_name()
    }

    /// Get table schema
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.root.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.root.rows.is_empty()
    }

    /// Rows in key order; the returned tree is a snapshot
    pub fn rows(&self) -> &BPlusTree<StoredRow> {
        &self.root.rows
    }

    /// Look up a row by rowid
    pub fn get(&self, rowid: i64) -> Option<&StoredRow> {
        let key = self.root.rowids.get(&rowid_key(rowid))?;
        self.root.rows.get(key)
    }

    /// The store key a row with these values and this rowid is filed under
    pub fn row_key(&self, values: &[Value], rowid: i64) -> IndexKey {
        if self.schema.has_primary_key() {
            IndexKey::composite(
                self.schema
                    .primary_key()
                    .iter()
                    .map(|&p| values.get(p).cloned().unwrap_or(Value::Null))
                    .collect(),
            )
        } else {
            rowid_key(rowid)
        }
    }

    /// Capture the current state
    pub fn snapshot(&self) -> Snapshot {
        trace!(table = self.name(), rows = self.len(), "snapshot taken");
        Snapshot {
            root: self.root.clone(),
        }
    }

    /// Make a snapshot the live state again
    pub fn restore(&mut self, snapshot: Snapshot) {
        debug!(
            table = self.name(),
            from_rows = self.len(),
            to_rows = snapshot.root.rows.len(),
            "snapshot restored"
        );
        self.root = snapshot.root;
    }

    /// Insert a row, returning its rowid.
    ///
    /// All constraints are checked before anything is written.
    pub fn insert(&mut self, values: Vec<Value>, rowid: Option<i64>) -> Result<i64> {
        self.check_arity(&values)?;
        let rowid = match rowid {
            Some(r) => r,
            None => self.root.next_rowid,
        };
        let key = self.row_key(&values, rowid);

        self.check_not_null(&values)?;
        if self.root.rows.contains_key(&key) || self.root.rowids.contains_key(&rowid_key(rowid)) {
            return Err(Error::ConstraintViolation(Constraint::PrimaryKey {
                table: self.name().to_string(),
            }));
        }
        let unique_keys = self.check_unique(&values, None)?;
        let next_rowid = if rowid >= self.root.next_rowid {
            rowid
                .checked_add(1)
                .ok_or_else(|| Error::Store("rowid space exhausted".to_string()))?
        } else {
            self.root.next_rowid
        };

        for (tree, unique_key) in self.root.uniques.iter_mut().zip(unique_keys) {
            if let Some(k) = unique_key {
                tree.insert(k, rowid);
            }
        }
        self.root.rowids.insert(rowid_key(rowid), key.clone());
        self.root.rows.insert(key, StoredRow { rowid, values });
        self.root.next_rowid = next_rowid;

        trace!(table = self.name(), rowid, "row inserted");
        Ok(rowid)
    }

    /// Replace the values of a row whose key stays the same
    pub fn overwrite(&mut self, rowid: i64, values: Vec<Value>) -> Result<()> {
        self.check_arity(&values)?;
        let key = self
            .root
            .rowids
            .get(&rowid_key(rowid))
            .cloned()
            .ok_or(Error::RowNotFound(rowid))?;
        if self.row_key(&values, rowid) != key {
            return Err(Error::Store(format!(
                "overwrite of row {} would change its key",
                rowid
            )));
        }

        self.check_not_null(&values)?;
        let unique_keys = self.check_unique(&values, Some(rowid))?;
        let old_unique_keys = match self.root.rows.get(&key) {
            Some(old) => self.unique_keys(&old.values),
            None => {
                return Err(Error::Store(format!(
                    "row {} missing from row tree",
                    rowid
                )))
            }
        };

        self.root.rows.insert(key, StoredRow { rowid, values });
        for ((tree, old_key), new_key) in self
            .root
            .uniques
            .iter_mut()
            .zip(old_unique_keys)
            .zip(unique_keys)
        {
            if let Some(k) = old_key {
                tree.remove(&k);
            }
            if let Some(k) = new_key {
                tree.insert(k, rowid);
            }
        }

        trace!(table = self.name(), rowid, "row overwritten");
        Ok(())
    }

    /// Delete a row by rowid, returning it
    pub fn delete(&mut self, rowid: i64) -> Result<StoredRow> {
        let key = self
            .root
            .rowids
            .get(&rowid_key(rowid))
            .cloned()
            .ok_or(Error::RowNotFound(rowid))?;
        let row = self
            .root
            .rows
            .remove(&key)
            .ok_or_else(|| Error::Store(format!("row {} missing from row tree", rowid)))?;
        self.root.rowids.remove(&rowid_key(rowid));

        let unique_keys = self.unique_keys(&row.values);
        for (tree, unique_key) in self.root.uniques.iter_mut().zip(unique_keys) {
            if let Some(k) = unique_key {
                tree.remove(&k);
            }
        }

        trace!(table = self.name(), rowid, "row deleted");
        Ok(row)
    }

    fn check_arity(&self, values: &[Value]) -> Result<()> {
        let expected = self.schema.column_count();
        if values.len() != expected {
            return Err(Error::Store(format!(
                "expected {} columns, got {}",
                expected,
                values.len()
            )));
        }
        Ok(())
    }

    fn check_not_null(&self, values: &[Value]) -> Result<()> {
        for (col, value) in self.schema.columns().iter().zip(values) {
            if !col.nullable && value.is_null() {
                return Err(Error::ConstraintViolation(Constraint::NotNull {
                    column: format!("{}.{}", self.name(), col.name),
                }));
            }
        }
        Ok(())
    }

    /// Key per unique set; `None` where a NULL exempts the row
    fn unique_keys(&self, values: &[Value]) -> Vec<Option<IndexKey>> {
        self.schema
            .unique_sets()
            .iter()
            .map(|set| {
                let parts: Vec<Value> = set
                    .iter()
                    .map(|&p| values.get(p).cloned().unwrap_or(Value::Null))
                    .collect();
                if parts.iter().any(Value::is_null) {
                    None
                } else {
                    Some(IndexKey::composite(parts))
                }
            })
            .collect()
    }

    fn check_unique(&self, values: &[Value], owner: Option<i64>) -> Result<Vec<Option<IndexKey>>> {
        let keys = self.unique_keys(values);
        for ((tree, key), set) in self
            .root
            .uniques
            .iter()
            .zip(&keys)
            .zip(self.schema.unique_sets())
        {
            let holder = key.as_ref().and_then(|k| tree.get(k));
            if let Some(&holder) = holder {
                if Some(holder) != owner {
                    return Err(Error::ConstraintViolation(Constraint::Unique {
                        columns: set
                            .iter()
                            .map(|&p| format!("{}.{}", self.name(), self.schema.columns()[p].name))
                            .collect(),
                    }));
                }
            }
        }
        Ok(keys)
    }
}

fn rowid_key(rowid: i64) -> IndexKey {
    IndexKey::new(Value::Integer(rowid))
}
