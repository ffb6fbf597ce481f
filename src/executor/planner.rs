//! Index planner
//!
//! Maps the host's per-column constraints and ordering request onto a scan
//! of the store's key order. The chosen plan is serialized into the plan
//! identifier the host hands back to the cursor unchanged.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::TableConfig;
use crate::error::{Error, Result};

/// Comparison operator of a host constraint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConstraintOp {
    Eq,
    Gt,
    Ge,
    Lt,
    Le,
    Ne,
    Like,
    Glob,
    IsNull,
    IsNotNull,
    /// Anything the host could not describe
    Ignored,
}

impl ConstraintOp {
    /// Whether the operator bounds a scan from below
    pub fn is_lower(self) -> bool {
        matches!(self, ConstraintOp::Gt | ConstraintOp::Ge)
    }

    /// Whether the operator bounds a scan from above
    pub fn is_upper(self) -> bool {
        matches!(self, ConstraintOp::Lt | ConstraintOp::Le)
    }

    /// Whether a bound with this operator includes its own value
    pub fn is_inclusive(self) -> bool {
        matches!(self, ConstraintOp::Eq | ConstraintOp::Ge | ConstraintOp::Le)
    }

    /// Whether the planner can ever consume this operator
    pub fn is_indexable(self) -> bool {
        self == ConstraintOp::Eq || self.is_lower() || self.is_upper()
    }
}

/// A single constraint from the host's WHERE clause
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndexConstraint {
    /// Column position (`-1` for the rowid)
    pub column: i32,
    pub op: ConstraintOp,
    /// Whether the host can supply a value for this constraint at filter time
    pub usable: bool,
}

impl IndexConstraint {
    pub fn new(column: i32, op: ConstraintOp) -> Self {
        Self {
            column,
            op,
            usable: true,
        }
    }

    /// Mark the constraint unusable
    pub fn unusable(mut self) -> Self {
        self.usable = false;
        self
    }
}

/// A single ORDER BY term
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexOrderBy {
    pub column: i32,
    pub desc: bool,
}

/// How one constraint maps onto the filter arguments
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConstraintUsage {
    /// 1-based position in the filter arguments; 0 when not consumed
    pub argv_index: i32,
    /// The scan enforces the constraint, so the host need not re-check it
    pub omit: bool,
}

/// A consumed constraint as recorded in the plan identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundTerm {
    pub column: i32,
    pub op: ConstraintOp,
}

/// Decoded plan identifier.
///
/// `terms[i]` is bound to the i-th filter argument.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanPlan {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub terms: Vec<BoundTerm>,
    #[serde(default)]
    pub descending: bool,
}

impl ScanPlan {
    /// Encode as a plan identifier
    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::InvalidPlan(e.to_string()))
    }

    /// Decode a plan identifier; an empty identifier is a full ascending scan
    pub fn decode(idx_str: &str) -> Result<Self> {
        if idx_str.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(idx_str)
            .map_err(|e| Error::InvalidPlan(format!("bad plan identifier '{}': {}", idx_str, e)))
    }
}

/// The plan chosen for one set of constraints
#[derive(Debug, Clone, PartialEq)]
pub struct IndexPlan {
    pub estimated_cost: f64,
    pub estimated_rows: i64,
    /// Positionally aligned with the constraints the plan was chosen for
    pub constraint_usage: Vec<ConstraintUsage>,
    /// The scan already yields rows in the requested order
    pub order_by_consumed: bool,
    pub scan: ScanPlan,
}

/// Information exchanged with the host during index selection.
///
/// The host fills `constraints` and `order_by`; [`IndexPlanner::best_index`]
/// fills the rest.
#[derive(Debug, Clone)]
pub struct IndexInfo {
    pub constraints: Vec<IndexConstraint>,
    pub order_by: Vec<IndexOrderBy>,
    pub constraint_usage: Vec<ConstraintUsage>,
    pub idx_str: Option<String>,
    pub order_by_consumed: bool,
    pub estimated_cost: f64,
    pub estimated_rows: i64,
}

impl IndexInfo {
    pub fn new(constraints: Vec<IndexConstraint>, order_by: Vec<IndexOrderBy>) -> Self {
        let usage_len = constraints.len();
        Self {
            constraints,
            order_by,
            constraint_usage: vec![ConstraintUsage::default(); usage_len],
            idx_str: None,
            order_by_consumed: false,
            estimated_cost: f64::MAX,
            estimated_rows: i64::MAX,
        }
    }
}

/// Cost-based planner over a table's key columns
#[derive(Debug, Clone)]
pub struct IndexPlanner {
    /// Store key columns in key order (`-1` for the rowid)
    key_columns: Vec<i32>,
    config: TableConfig,
}

impl IndexPlanner {
    pub fn new(key_columns: Vec<i32>, config: TableConfig) -> Self {
        Self {
            key_columns,
            config,
        }
    }

    pub fn key_columns(&self) -> &[i32] {
        &self.key_columns
    }

    /// Choose a plan.
    ///
    /// Key columns are bound left to right: each takes the first usable
    /// equality on it; the first one without an equality takes at most one
    /// lower and one upper bound, and binding stops there. Consumed
    /// constraints keep the host's order.
    pub fn select_plan(
        &self,
        constraints: &[IndexConstraint],
        order_by: &[IndexOrderBy],
    ) -> IndexPlan {
        let find = |column: i32, pred: &dyn Fn(ConstraintOp) -> bool| {
            constraints
                .iter()
                .position(|c| c.usable && c.column == column && pred(c.op))
        };

        let mut consumed = Vec::new();
        let mut eq_count = 0;
        let mut bounds = 0;
        for &column in &self.key_columns {
            if let Some(i) = find(column, &|op: ConstraintOp| op == ConstraintOp::Eq) {
                consumed.push(i);
                eq_count += 1;
                continue;
            }
            for pred in [ConstraintOp::is_lower, ConstraintOp::is_upper] {
                if let Some(i) = find(column, &pred) {
                    consumed.push(i);
                    bounds += 1;
                }
            }
            break;
        }
        consumed.sort_unstable();

        let mut constraint_usage = vec![ConstraintUsage::default(); constraints.len()];
        let mut terms = Vec::with_capacity(consumed.len());
        for (slot, &i) in consumed.iter().enumerate() {
            constraint_usage[i] = ConstraintUsage {
                argv_index: slot as i32 + 1,
                omit: true,
            };
            terms.push(BoundTerm {
                column: constraints[i].column,
                op: constraints[i].op,
            });
        }

        let point_lookup = !self.key_columns.is_empty() && eq_count == self.key_columns.len();
        let selectivity =
            self.config.eq_selectivity.powi(eq_count as i32) * self.config.range_selectivity.powi(bounds);
        let mut estimated_cost = self.config.full_scan_cost * selectivity;
        let estimated_rows = if point_lookup {
            estimated_cost = estimated_cost.min(self.config.point_lookup_cost);
            1
        } else {
            (estimated_cost.ceil() as i64).max(1)
        };

        let ordering = self.ordering(order_by, eq_count);
        let plan = IndexPlan {
            estimated_cost,
            estimated_rows,
            constraint_usage,
            order_by_consumed: ordering.is_some(),
            scan: ScanPlan {
                terms,
                descending: ordering.unwrap_or(false),
            },
        };
        debug!(
            eq = eq_count,
            bounds,
            cost = plan.estimated_cost,
            rows = plan.estimated_rows,
            ordered = plan.order_by_consumed,
            "index plan selected"
        );
        plan
    }

    /// Direction that satisfies `order_by`, if the key order can.
    ///
    /// The requested columns must be a run of key columns starting no later
    /// than the first column not pinned by equality, all in one direction.
    fn ordering(&self, order_by: &[IndexOrderBy], eq_count: usize) -> Option<bool> {
        let first = order_by.first()?;
        if order_by.iter().any(|o| o.desc != first.desc) {
            return None;
        }
        let requested: Vec<i32> = order_by.iter().map(|o| o.column).collect();
        (0..=eq_count.min(self.key_columns.len()))
            .any(|start| self.key_columns[start..].starts_with(&requested))
            .then_some(first.desc)
    }

    /// Fill the host's side of `info`
    pub fn best_index(&self, info: &mut IndexInfo) -> Result<()> {
        let plan = self.select_plan(&info.constraints, &info.order_by);
        info.idx_str = Some(plan.scan.encode()?);
        info.constraint_usage = plan.constraint_usage;
        info.order_by_consumed = plan.order_by_consumed;
        info.estimated_cost = plan.estimated_cost;
        info.estimated_rows = plan.estimated_rows;
        Ok(())
    }
}
