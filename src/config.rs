//! Table configuration
//!
//! Cost model constants for index selection and the store's node size.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default estimated cost of a full table scan
pub const DEFAULT_FULL_SCAN_COST: f64 = 1_000_000.0;

/// Default B+ tree node capacity
pub const DEFAULT_NODE_CAPACITY: usize = 32;

/// Per-table configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableConfig {
    /// Cost reported when no constraint is consumed
    pub full_scan_cost: f64,
    /// Cost reported when every key column is bound by equality
    pub point_lookup_cost: f64,
    /// Cost factor applied per consumed equality constraint
    pub eq_selectivity: f64,
    /// Cost factor applied per consumed range bound
    pub range_selectivity: f64,
    /// Maximum keys per B+ tree node before it splits
    pub node_capacity: usize,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            full_scan_cost: DEFAULT_FULL_SCAN_COST,
            point_lookup_cost: 1.0,
            eq_selectivity: 0.01,
            range_selectivity: 0.25,
            node_capacity: DEFAULT_NODE_CAPACITY,
        }
    }
}

impl TableConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the full scan cost
    pub fn full_scan_cost(mut self, cost: f64) -> Self {
        self.full_scan_cost = cost;
        self
    }

    /// Set the point lookup cost
    pub fn point_lookup_cost(mut self, cost: f64) -> Self {
        self.point_lookup_cost = cost;
        self
    }

    /// Set the equality selectivity
    pub fn eq_selectivity(mut self, selectivity: f64) -> Self {
        self.eq_selectivity = selectivity;
        self
    }

    /// Set the range selectivity
    pub fn range_selectivity(mut self, selectivity: f64) -> Self {
        self.range_selectivity = selectivity;
        self
    }

    /// Set the B+ tree node capacity
    pub fn node_capacity(mut self, capacity: usize) -> Self {
        self.node_capacity = capacity;
        self
    }

    /// Check the cost model keeps equality constraints monotone.
    ///
    /// Binding a key column by equality replaces at most two range bounds on
    /// that column, so one equality factor must never exceed two range factors.
    pub fn validate(&self) -> Result<()> {
        let unit = |x: f64| x > 0.0 && x <= 1.0;
        if !unit(self.range_selectivity) {
            return Err(Error::InvalidConfig(format!(
                "range_selectivity must be in (0, 1], got {}",
                self.range_selectivity
            )));
        }
        if !unit(self.eq_selectivity) {
            return Err(Error::InvalidConfig(format!(
                "eq_selectivity must be in (0, 1], got {}",
                self.eq_selectivity
            )));
        }
        if self.eq_selectivity > self.range_selectivity * self.range_selectivity {
            return Err(Error::InvalidConfig(format!(
                "eq_selectivity {} exceeds range_selectivity squared {}",
                self.eq_selectivity,
                self.range_selectivity * self.range_selectivity
            )));
        }
        if !(self.full_scan_cost > 0.0) || !(self.point_lookup_cost > 0.0) {
            return Err(Error::InvalidConfig("costs must be positive".to_string()));
        }
        if self.point_lookup_cost > self.full_scan_cost {
            return Err(Error::InvalidConfig(
                "point_lookup_cost exceeds full_scan_cost".to_string(),
            ));
        }
        if self.node_capacity < 3 {
            return Err(Error::InvalidConfig(format!(
                "node_capacity must be at least 3, got {}",
                self.node_capacity
            )));
        }
        Ok(())
    }
}
