//! Query execution module
//!
//! This module contains the expression evaluator and the index planner.

pub mod evaluator;
pub mod planner;

pub use evaluator::{EmptyRow, Evaluator, RowContext};
pub use planner::{
    BoundTerm, ConstraintOp, ConstraintUsage, IndexConstraint, IndexInfo, IndexOrderBy, IndexPlan,
    IndexPlanner, ScanPlan,
};
