//! Catalog module
//!
//! This module contains table schema definitions.

pub mod schema;

pub use schema::{Column, Schema, ROWID_COLUMN};
