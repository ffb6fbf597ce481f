//! Virtual table over the copy-on-write store
//!
//! Mutations are made atomic with snapshots: a key-changing replace
//! snapshots the table, deletes, inserts, and restores the snapshot if the
//! insert fails. Transactions and savepoints apply the same discipline at a
//! coarser grain.

use std::sync::Arc;

use tracing::{debug, warn};

use super::{ArgValue, VirtualTable, VtabCursor};
use crate::catalog::Schema;
use crate::config::TableConfig;
use crate::error::{Error, Result};
use crate::executor::{IndexInfo, IndexPlanner};
use crate::storage::Table;
use crate::transaction::TransactionManager;
use crate::value::Value;

/// A virtual table backed by a [`Table`]
#[derive(Debug)]
pub struct Vtab {
    table: Table,
    transactions: TransactionManager,
    planner: IndexPlanner,
}

impl Vtab {
    /// The backing table
    pub fn table(&self) -> &Table {
        &self.table
    }

    /// Whether a transaction is open
    pub fn in_transaction(&self) -> bool {
        self.transactions.is_active()
    }

    pub fn planner(&self) -> &IndexPlanner {
        &self.planner
    }

    /// Resolve host arguments into a full row, taking unchanged columns from `old`
    fn resolve(&self, args: &[ArgValue], old: Option<&[Value]>) -> Result<Vec<Value>> {
        let expected = self.table.schema().column_count();
        if args.len() != expected {
            return Err(Error::Store(format!(
                "expected {} column values, got {}",
                expected,
                args.len()
            )));
        }
        Ok(args
            .iter()
            .enumerate()
            .map(|(i, arg)| match arg {
                ArgValue::Value(v) => v.clone(),
                ArgValue::Unchanged => old.and_then(|o| o.get(i)).cloned().unwrap_or(Value::Null),
            })
            .collect())
    }
}

impl VirtualTable for Vtab {
    type Cursor = VtabCursor;

    fn connect(name: &str, args: &[&str], config: TableConfig) -> Result<Self> {
        config.validate()?;
        let schema = Arc::new(Schema::from_args(name, args)?);
        let planner = IndexPlanner::new(schema.key_columns(), config.clone());
        let table = Table::new(schema, &config);

        debug!(
            table = name,
            columns = ?table.schema().column_names(),
            key = ?planner.key_columns(),
            "virtual table connected"
        );
        Ok(Self {
            table,
            transactions: TransactionManager::new(),
            planner,
        })
    }

    fn declaration(&self) -> String {
        self.table.schema().declaration()
    }

    fn best_index(&self, info: &mut IndexInfo) -> Result<()> {
        self.planner.best_index(info)
    }

    fn open(&self) -> Result<VtabCursor> {
        Ok(VtabCursor::new(
            self.table.schema().clone(),
            self.table.rows().clone(),
        ))
    }

    fn insert(&mut self, rowid: Option<i64>, values: &[ArgValue]) -> Result<i64> {
        let values = self.resolve(values, None)?;
        self.table.insert(values, rowid)
    }

    fn update(&mut self, rowid: i64, values: &[ArgValue]) -> Result<()> {
        self.replace(rowid, None, values).map(|_| ())
    }

    fn delete(&mut self, rowid: i64) -> Result<()> {
        self.table.delete(rowid).map(|_| ())
    }

    fn replace(
        &mut self,
        old_rowid: i64,
        new_rowid: Option<i64>,
        values: &[ArgValue],
    ) -> Result<i64> {
        let old = self
            .table
            .get(old_rowid)
            .cloned()
            .ok_or(Error::RowNotFound(old_rowid))?;
        let values = self.resolve(values, Some(old.values.as_slice()))?;
        let new_rowid = new_rowid.unwrap_or(old_rowid);

        if new_rowid == old_rowid
            && self.table.row_key(&values, new_rowid) == self.table.row_key(&old.values, old_rowid)
        {
            self.table.overwrite(old_rowid, values)?;
            return Ok(old_rowid);
        }

        let backup = self.table.snapshot();
        let result = self
            .table
            .delete(old_rowid)
            .and_then(|_| self.table.insert(values, Some(new_rowid)));
        match result {
            Ok(rowid) => {
                backup.cancel();
                debug!(table = self.table.name(), old_rowid, rowid, "row replaced");
                Ok(rowid)
            }
            Err(e) => {
                warn!(
                    table = self.table.name(),
                    old_rowid,
                    error = %e,
                    "replace failed, restoring previous state"
                );
                self.table.restore(backup);
                Err(e)
            }
        }
    }

    fn begin(&mut self) -> Result<()> {
        self.transactions.begin(&self.table).map(|_| ())
    }

    fn commit(&mut self) -> Result<()> {
        self.transactions.commit().map(|_| ())
    }

    fn rollback(&mut self) -> Result<()> {
        self.transactions.rollback(&mut self.table).map(|_| ())
    }

    fn savepoint(&mut self, level: i32) -> Result<()> {
        self.transactions.savepoint(level, &self.table)
    }

    fn release(&mut self, level: i32) -> Result<()> {
        self.transactions.release(level)
    }

    fn rollback_to(&mut self, level: i32) -> Result<()> {
        self.transactions.rollback_to(level, &mut self.table)
    }

    fn disconnect(&mut self) -> Result<()> {
        if self.transactions.is_active() {
            warn!(
                table = self.table.name(),
                "disconnecting with an open transaction, rolling back"
            );
            self.transactions.rollback(&mut self.table)?;
        }
        debug!(table = self.table.name(), "virtual table disconnected");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Constraint;
    use crate::vtab::VirtualCursor;

    fn connect() -> Vtab {
        Vtab::connect(
            "users",
            &["id INTEGER PRIMARY KEY", "name TEXT NOT NULL", "email UNIQUE"],
            TableConfig::default(),
        )
        .unwrap()
    }

    fn args(id: i64, name: &str, email: &str) -> Vec<ArgValue> {
        vec![
            Value::Integer(id).into(),
            Value::from(name).into(),
            Value::from(email).into(),
        ]
    }

    #[test]
    fn test_connect_rejects_bad_input() {
        assert!(matches!(
            Vtab::connect("t", &[], TableConfig::default()),
            Err(Error::Schema(_))
        ));
        assert!(matches!(
            Vtab::connect("t", &["a"], TableConfig::new().node_capacity(1)),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_insert_maps_unchanged_to_null() {
        let mut vtab = connect();
        let rowid = vtab
            .insert(
                None,
                &[Value::Integer(1).into(), Value::from("a").into(), ArgValue::Unchanged],
            )
            .unwrap();
        assert_eq!(vtab.table().get(rowid).unwrap().values[2], Value::Null);
    }

    #[test]
    fn test_update_keeps_unchanged_columns() {
        let mut vtab = connect();
        let rowid = vtab.insert(None, &args(1, "alice", "a@x")).unwrap();

        vtab.update(
            rowid,
            &[ArgValue::Unchanged, Value::from("alicia").into(), ArgValue::Unchanged],
        )
        .unwrap();
        let row = vtab.table().get(rowid).unwrap();
        assert_eq!(row.values, vec![Value::Integer(1), Value::from("alicia"), Value::from("a@x")]);
    }

    #[test]
    fn test_replace_changes_key() {
        let mut vtab = connect();
        let rowid = vtab.insert(None, &args(1, "alice", "a@x")).unwrap();

        let new_rowid = vtab.replace(rowid, Some(40), &args(7, "alice", "a@x")).unwrap();
        assert_eq!(new_rowid, 40);
        assert!(vtab.table().get(rowid).is_none());
        assert_eq!(vtab.table().get(40).unwrap().values[0], Value::Integer(7));
        assert_eq!(vtab.table().len(), 1);
    }

    #[test]
    fn test_replace_restores_on_failure() {
        let mut vtab = connect();
        let a = vtab.insert(None, &args(1, "alice", "a@x")).unwrap();
        vtab.insert(None, &args(2, "bob", "b@x")).unwrap();

        // Moving alice onto bob's key fails after her old row was deleted
        let err = vtab.replace(a, None, &args(2, "alice", "a@x")).unwrap_err();
        assert!(matches!(
            err,
            Error::ConstraintViolation(Constraint::PrimaryKey { .. })
        ));
        assert_eq!(vtab.table().len(), 2);
        assert_eq!(vtab.table().get(a).unwrap().values, vec![
            Value::Integer(1),
            Value::from("alice"),
            Value::from("a@x"),
        ]);
    }

    #[test]
    fn test_transaction_framing() {
        let mut vtab = connect();
        vtab.insert(None, &args(1, "alice", "a@x")).unwrap();

        vtab.begin().unwrap();
        assert!(vtab.in_transaction());
        assert!(matches!(vtab.begin(), Err(Error::TransactionActive)));
        vtab.insert(None, &args(2, "bob", "b@x")).unwrap();
        vtab.rollback().unwrap();
        assert_eq!(vtab.table().len(), 1);

        assert!(matches!(vtab.commit(), Err(Error::NoActiveTransaction)));

        vtab.begin().unwrap();
        vtab.insert(None, &args(3, "carol", "c@x")).unwrap();
        vtab.disconnect().unwrap();
        assert!(!vtab.in_transaction());
        assert_eq!(vtab.table().len(), 1);
    }

    #[test]
    fn test_cursor_sees_table_as_of_open() {
        let mut vtab = connect();
        vtab.insert(None, &args(1, "alice", "a@x")).unwrap();
        let mut cursor = vtab.open().unwrap();
        vtab.insert(None, &args(2, "bob", "b@x")).unwrap();

        cursor.filter("", &[]).unwrap();
        cursor.next().unwrap();
        assert!(cursor.eof());
    }
}
