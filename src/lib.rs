//! sqlvtab - A SQL scalar-expression engine and virtual table adapter
//!
//! This library provides:
//! - Expression parsing (lexer, parser, AST) and compilation to closures
//! - SQLite-style manifest typing and three-valued logic
//! - A copy-on-write B+ tree table store with O(1) snapshots
//! - Cost-based index planning and scan cursors
//! - A virtual table adapter with atomic replace and transactions

pub mod catalog;
pub mod config;
pub mod error;
pub mod executor;
pub mod sql;
pub mod storage;
pub mod transaction;
pub mod value;
pub mod vtab;

pub use catalog::Schema;
pub use config::TableConfig;
pub use error::{Constraint, Error, ErrorCode, Result};
pub use executor::{Evaluator, RowContext};
pub use value::Value;
pub use vtab::{ArgValue, VirtualCursor, VirtualTable, Vtab, VtabCursor};
