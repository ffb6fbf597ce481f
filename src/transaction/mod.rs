//! Transaction module
//!
//! Snapshot-framed transactions and savepoints.

pub mod transaction;

pub use transaction::{Transaction, TransactionManager, TransactionState};
