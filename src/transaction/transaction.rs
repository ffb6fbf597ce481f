//! Transaction Manager
//!
//! Handles transaction lifecycle (Begin, Commit, Rollback) and savepoints
//! for one table. Every frame is a snapshot of the table taken when the
//! frame opened; rolling back restores it, committing discards it.

use tracing::debug;

use crate::error::{Error, Result};
use crate::storage::{Snapshot, Table};

/// Transaction State
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Active,
    Committed,
    Aborted,
}

/// Transaction Context
#[derive(Debug)]
pub struct Transaction {
    pub id: u64,
    pub state: TransactionState,
    /// State of the table at BEGIN
    begin: Option<Snapshot>,
    /// Open savepoints, innermost last
    savepoints: Vec<(i32, Snapshot)>,
}

impl Transaction {
    /// Levels of the open savepoints, outermost first
    pub fn savepoint_levels(&self) -> Vec<i32> {
        self.savepoints.iter().map(|(level, _)| *level).collect()
    }

    fn finish(mut self, state: TransactionState) -> Self {
        for (_, snapshot) in self.savepoints.drain(..) {
            snapshot.cancel();
        }
        if let Some(snapshot) = self.begin.take() {
            snapshot.cancel();
        }
        self.state = state;
        self
    }
}

/// Transaction Manager
#[derive(Debug)]
pub struct TransactionManager {
    /// The open transaction, if any
    current: Option<Transaction>,
    /// Next Transaction ID
    next_trans_id: u64,
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionManager {
    /// Create a new transaction manager
    pub fn new() -> Self {
        Self {
            current: None,
            next_trans_id: 1,
        }
    }

    /// Begin a new transaction
    pub fn begin(&mut self, table: &Table) -> Result<u64> {
        if self.current.is_some() {
            return Err(Error::TransactionActive);
        }

        let trans_id = self.next_trans_id;
        self.next_trans_id += 1;

        self.current = Some(Transaction {
            id: trans_id,
            state: TransactionState::Active,
            begin: Some(table.snapshot()),
            savepoints: Vec::new(),
        });

        debug!(trans_id, table = table.name(), "transaction started");
        Ok(trans_id)
    }

    /// Commit the open transaction, keeping the table as it is
    pub fn commit(&mut self) -> Result<Transaction> {
        let trans = self.current.take().ok_or(Error::NoActiveTransaction)?;
        debug!(trans_id = trans.id, "transaction committed");
        Ok(trans.finish(TransactionState::Committed))
    }

    /// Rollback the open transaction, restoring the table as of BEGIN
    pub fn rollback(&mut self, table: &mut Table) -> Result<Transaction> {
        let mut trans = self.current.take().ok_or(Error::NoActiveTransaction)?;
        if let Some(snapshot) = trans.begin.take() {
            table.restore(snapshot);
        }
        debug!(trans_id = trans.id, "transaction rolled back");
        Ok(trans.finish(TransactionState::Aborted))
    }

    /// Open savepoint `level`, discarding any at that level or deeper
    pub fn savepoint(&mut self, level: i32, table: &Table) -> Result<()> {
        let trans = self.current.as_mut().ok_or(Error::NoActiveTransaction)?;
        Self::discard_from(trans, level);
        trans.savepoints.push((level, table.snapshot()));
        debug!(
            trans_id = trans.id,
            level,
            open = ?trans.savepoint_levels(),
            "savepoint opened"
        );
        Ok(())
    }

    /// Release savepoint `level` and every deeper one; the changes stay
    pub fn release(&mut self, level: i32) -> Result<()> {
        let trans = self.current.as_mut().ok_or(Error::NoActiveTransaction)?;
        Self::discard_from(trans, level);
        debug!(
            trans_id = trans.id,
            level,
            open = ?trans.savepoint_levels(),
            "savepoint released"
        );
        Ok(())
    }

    /// Restore the table to savepoint `level`, which stays open
    pub fn rollback_to(&mut self, level: i32, table: &mut Table) -> Result<()> {
        let trans = self.current.as_mut().ok_or(Error::NoActiveTransaction)?;
        if !trans.savepoints.iter().any(|(l, _)| *l == level) {
            return Err(Error::SavepointNotFound(level));
        }
        Self::discard_from(trans, level.saturating_add(1));

        if let Some((level, snapshot)) = trans.savepoints.pop() {
            table.restore(snapshot);
            trans.savepoints.push((level, table.snapshot()));
        }
        debug!(
            trans_id = trans.id,
            level,
            open = ?trans.savepoint_levels(),
            "rolled back to savepoint"
        );
        Ok(())
    }

    fn discard_from(trans: &mut Transaction, level: i32) {
        let keep = trans
            .savepoints
            .iter()
            .position(|(l, _)| *l >= level)
            .unwrap_or(trans.savepoints.len());
        for (_, snapshot) in trans.savepoints.drain(keep..) {
            snapshot.cancel();
        }
    }

    /// Check if a transaction is active
    pub fn is_active(&self) -> bool {
        self.current.is_some()
    }

    /// The open transaction
    pub fn current(&self) -> Option<&Transaction> {
        self.current.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Schema;
    use crate::config::TableConfig;
    use crate::value::Value;
    use std::sync::Arc;

    fn create_test_table() -> Table {
        let schema = Schema::from_args("t", &["k INTEGER PRIMARY KEY", "v"]).unwrap();
        Table::new(Arc::new(schema), &TableConfig::default())
    }

    fn put(table: &mut Table, k: i64) -> i64 {
        table
            .insert(vec![Value::Integer(k), Value::Null], None)
            .unwrap()
    }

    #[test]
    fn test_commit_keeps_changes() {
        let mut table = create_test_table();
        let mut tm = TransactionManager::new();

        let id = tm.begin(&table).unwrap();
        assert!(tm.is_active());
        put(&mut table, 1);

        let trans = tm.commit().unwrap();
        assert_eq!(trans.id, id);
        assert_eq!(trans.state, TransactionState::Committed);
        assert!(!tm.is_active());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_rollback_restores_begin_state() {
        let mut table = create_test_table();
        put(&mut table, 1);
        let mut tm = TransactionManager::new();

        tm.begin(&table).unwrap();
        put(&mut table, 2);
        table.delete(1).unwrap();

        let trans = tm.rollback(&mut table).unwrap();
        assert_eq!(trans.state, TransactionState::Aborted);
        assert_eq!(table.len(), 1);
        assert!(table.get(1).is_some());
    }

    #[test]
    fn test_framing_errors() {
        let mut table = create_test_table();
        let mut tm = TransactionManager::new();

        assert!(matches!(tm.commit(), Err(Error::NoActiveTransaction)));
        assert!(matches!(tm.rollback(&mut table), Err(Error::NoActiveTransaction)));
        assert!(matches!(tm.savepoint(0, &table), Err(Error::NoActiveTransaction)));

        let first = tm.begin(&table).unwrap();
        assert!(matches!(tm.begin(&table), Err(Error::TransactionActive)));
        tm.commit().unwrap();
        assert_eq!(tm.begin(&table).unwrap(), first + 1);
    }

    #[test]
    fn test_savepoints() {
        let mut table = create_test_table();
        let mut tm = TransactionManager::new();

        tm.begin(&table).unwrap();
        put(&mut table, 1);
        tm.savepoint(0, &table).unwrap();
        put(&mut table, 2);
        tm.savepoint(1, &table).unwrap();
        put(&mut table, 3);
        assert_eq!(tm.current().unwrap().savepoint_levels(), vec![0, 1]);

        tm.rollback_to(0, &mut table).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(tm.current().unwrap().savepoint_levels(), vec![0]);

        // Savepoint 0 is still open and can be rolled back to again
        put(&mut table, 4);
        tm.rollback_to(0, &mut table).unwrap();
        assert_eq!(table.len(), 1);

        assert!(matches!(
            tm.rollback_to(5, &mut table),
            Err(Error::SavepointNotFound(5))
        ));

        put(&mut table, 5);
        tm.release(0).unwrap();
        assert!(tm.current().unwrap().savepoint_levels().is_empty());
        assert_eq!(table.len(), 2);

        tm.rollback(&mut table).unwrap();
        assert!(table.is_empty());
    }
}
