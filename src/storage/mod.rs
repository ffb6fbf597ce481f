//! Storage engine module
//!
//! This module contains the storage engine components:
//! - Copy-on-write B+ tree
//! - Table store with O(1) snapshots

pub mod btree;
pub mod table;

pub use btree::{BPlusTree, IndexKey};
pub use table::{Root, Snapshot, StoredRow, Table};
