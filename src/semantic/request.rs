//! Query requests.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::sql::dialect::Dialect;
use crate::table_calc::TableCalculation;

/// What to compute: metrics sliced by dimensions, plus filtering, ordering
/// and pagination.
///
/// `dialect` and `use_preaggregations` fall back to the compiler settings
/// when unset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryRequest {
    pub metrics: Vec<String>,
    pub dimensions: Vec<String>,
    pub filters: Vec<String>,
    pub segments: Vec<String>,
    /// `field`, `field ASC` or `field DESC`; fields are request references
    /// or output column names.
    pub order_by: Vec<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    /// Emit raw rows without aggregation.
    pub ungrouped: bool,
    pub parameters: HashMap<String, Value>,
    pub dialect: Option<Dialect>,
    pub use_preaggregations: Option<bool>,
    /// Post-query calculations; only their output names matter to the compiler.
    pub table_calculations: Vec<TableCalculation>,
}

impl QueryRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_metrics(mut self, metrics: &[&str]) -> Self {
        self.metrics.extend(metrics.iter().map(|m| m.to_string()));
        self
    }

    pub fn with_dimensions(mut self, dimensions: &[&str]) -> Self {
        self.dimensions
            .extend(dimensions.iter().map(|d| d.to_string()));
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filters.push(filter.into());
        self
    }

    pub fn with_segment(mut self, segment: impl Into<String>) -> Self {
        self.segments.push(segment.into());
        self
    }

    pub fn with_order_by(mut self, order_by: impl Into<String>) -> Self {
        self.order_by.push(order_by.into());
        self
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn ungrouped(mut self) -> Self {
        self.ungrouped = true;
        self
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = Some(dialect);
        self
    }

    pub fn with_preaggregations(mut self, enabled: bool) -> Self {
        self.use_preaggregations = Some(enabled);
        self
    }

    pub fn with_table_calculation(mut self, calculation: TableCalculation) -> Self {
        self.table_calculations.push(calculation);
        self
    }
}

/// Split `field DESC` into the field and whether it sorts descending.
pub fn parse_order_by(entry: &str) -> (&str, bool) {
    let entry = entry.trim();
    if let Some((field, dir)) = entry.rsplit_once(char::is_whitespace) {
        match dir.to_ascii_uppercase().as_str() {
            "DESC" => return (field.trim_end(), true),
            "ASC" => return (field.trim_end(), false),
            _ => {}
        }
    }
    (entry, false)
}
