//! Semantic model definitions.
//!
//! Loaders (out of scope for this crate) hand these over already parsed;
//! every type derives serde so JSON/TOML/YAML shaped data deserializes
//! directly. Builder-style constructors cover programmatic use.

use serde::{Deserialize, Serialize};

use super::reference::Granularity;
use crate::time::TimeComparison;

// =============================================================================
// Model
// =============================================================================

/// A table (or SQL query) with its dimensions, metrics and relationships.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
    #[serde(default)]
    pub primary_key: String,
    #[serde(default)]
    pub dimensions: Vec<Dimension>,
    #[serde(default)]
    pub metrics: Vec<Metric>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
    #[serde(default)]
    pub segments: Vec<Segment>,
    #[serde(default)]
    pub pre_aggregations: Vec<PreAggregation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Model {
    pub fn new(name: impl Into<String>, primary_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: None,
            sql: None,
            primary_key: primary_key.into(),
            dimensions: vec![],
            metrics: vec![],
            relationships: vec![],
            segments: vec![],
            pre_aggregations: vec![],
            description: None,
        }
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn with_sql(mut self, sql: impl Into<String>) -> Self {
        self.sql = Some(sql.into());
        self
    }

    pub fn with_dimension(mut self, dimension: Dimension) -> Self {
        self.dimensions.push(dimension);
        self
    }

    pub fn with_metric(mut self, metric: Metric) -> Self {
        self.metrics.push(metric);
        self
    }

    pub fn with_relationship(mut self, relationship: Relationship) -> Self {
        self.relationships.push(relationship);
        self
    }

    pub fn with_segment(mut self, segment: Segment) -> Self {
        self.segments.push(segment);
        self
    }

    pub fn with_pre_aggregation(mut self, preagg: PreAggregation) -> Self {
        self.pre_aggregations.push(preagg);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn get_dimension(&self, name: &str) -> Option<&Dimension> {
        self.dimensions.iter().find(|d| d.name == name)
    }

    pub fn get_metric(&self, name: &str) -> Option<&Metric> {
        self.metrics.iter().find(|m| m.name == name)
    }

    pub fn get_segment(&self, name: &str) -> Option<&Segment> {
        self.segments.iter().find(|s| s.name == name)
    }

    /// The declared relationship pointing at `target`, if any.
    pub fn relationship_to(&self, target: &str) -> Option<&Relationship> {
        self.relationships.iter().find(|r| r.name == target)
    }

    /// First time dimension, used as the default ordering for windows.
    pub fn default_time_dimension(&self) -> Option<&Dimension> {
        self.dimensions
            .iter()
            .find(|d| d.dimension_type == DimensionType::Time)
    }
}

// =============================================================================
// Dimension
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DimensionType {
    #[default]
    Categorical,
    Time,
    Boolean,
    Numeric,
}

/// A groupable attribute of a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dimension {
    pub name: String,
    #[serde(rename = "type", default)]
    pub dimension_type: DimensionType,
    /// Column or SQL expression; defaults to the dimension name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
    /// Base granularity of a time dimension.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub granularity: Option<Granularity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl Dimension {
    fn with_type(name: impl Into<String>, dimension_type: DimensionType) -> Self {
        Self {
            name: name.into(),
            dimension_type,
            sql: None,
            granularity: None,
            description: None,
            label: None,
        }
    }

    pub fn categorical(name: impl Into<String>) -> Self {
        Self::with_type(name, DimensionType::Categorical)
    }

    pub fn time(name: impl Into<String>, granularity: Granularity) -> Self {
        let mut dim = Self::with_type(name, DimensionType::Time);
        dim.granularity = Some(granularity);
        dim
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::with_type(name, DimensionType::Boolean)
    }

    pub fn numeric(name: impl Into<String>) -> Self {
        Self::with_type(name, DimensionType::Numeric)
    }

    pub fn with_sql(mut self, sql: impl Into<String>) -> Self {
        self.sql = Some(sql.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// SQL expression for this dimension.
    pub fn sql_expr(&self) -> &str {
        self.sql.as_deref().unwrap_or(&self.name)
    }

    pub fn is_time(&self) -> bool {
        self.dimension_type == DimensionType::Time
    }
}

// =============================================================================
// Metric
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    #[default]
    Simple,
    Ratio,
    Derived,
    Cumulative,
    TimeComparison,
    Conversion,
}

impl MetricType {
    /// Types computed from other metrics rather than an aggregation.
    pub fn is_composite(&self) -> bool {
        !matches!(self, MetricType::Simple)
    }

    /// Types that need a window over the grouped result.
    pub fn needs_window(&self) -> bool {
        matches!(self, MetricType::Cumulative | MetricType::TimeComparison)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    Sum,
    Count,
    CountDistinct,
    Avg,
    Min,
    Max,
    Median,
}

impl Aggregation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Aggregation::Sum => "sum",
            Aggregation::Count => "count",
            Aggregation::CountDistinct => "count_distinct",
            Aggregation::Avg => "avg",
            Aggregation::Min => "min",
            Aggregation::Max => "max",
            Aggregation::Median => "median",
        }
    }
}

/// Literal substituted when a metric evaluates to NULL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FillValue {
    Int(i64),
    Float(f64),
    Text(String),
}

/// A named aggregation or calculation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub name: String,
    #[serde(rename = "type", default)]
    pub metric_type: MetricType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agg: Option<Aggregation>,
    /// Column/expression for simple metrics, formula for derived ones.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub numerator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub denominator: Option<String>,
    /// Row expression accumulated when `sql` is absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_expression: Option<String>,
    /// Rolling window for cumulative metrics, e.g. `7 days`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window: Option<String>,
    /// Reset grain for period-to-date cumulative metrics.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grain_to_date: Option<Granularity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comparison: Option<TimeComparison>,
    /// Ordered funnel steps for conversion metrics.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub funnel_steps: Vec<String>,
    /// Row predicates applied to this metric only.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill_nulls_with: Option<FillValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl Metric {
    fn with_type(name: impl Into<String>, metric_type: MetricType) -> Self {
        Self {
            name: name.into(),
            metric_type,
            agg: None,
            sql: None,
            numerator: None,
            denominator: None,
            window_expression: None,
            window: None,
            grain_to_date: None,
            comparison: None,
            funnel_steps: vec![],
            filters: vec![],
            fill_nulls_with: None,
            description: None,
            label: None,
        }
    }

    /// Simple aggregation over `sql`.
    pub fn simple(name: impl Into<String>, agg: Aggregation, sql: impl Into<String>) -> Self {
        let mut metric = Self::with_type(name, MetricType::Simple);
        metric.agg = Some(agg);
        metric.sql = Some(sql.into());
        metric
    }

    pub fn sum(name: impl Into<String>, sql: impl Into<String>) -> Self {
        Self::simple(name, Aggregation::Sum, sql)
    }

    pub fn avg(name: impl Into<String>, sql: impl Into<String>) -> Self {
        Self::simple(name, Aggregation::Avg, sql)
    }

    pub fn count_distinct(name: impl Into<String>, sql: impl Into<String>) -> Self {
        Self::simple(name, Aggregation::CountDistinct, sql)
    }

    /// Row count.
    pub fn count(name: impl Into<String>) -> Self {
        let mut metric = Self::with_type(name, MetricType::Simple);
        metric.agg = Some(Aggregation::Count);
        metric
    }

    /// Simple metric without `agg`: `sql` is a formula over other metrics.
    pub fn formula(name: impl Into<String>, sql: impl Into<String>) -> Self {
        let mut metric = Self::with_type(name, MetricType::Simple);
        metric.sql = Some(sql.into());
        metric
    }

    pub fn ratio(
        name: impl Into<String>,
        numerator: impl Into<String>,
        denominator: impl Into<String>,
    ) -> Self {
        let mut metric = Self::with_type(name, MetricType::Ratio);
        metric.numerator = Some(numerator.into());
        metric.denominator = Some(denominator.into());
        metric
    }

    pub fn derived(name: impl Into<String>, formula: impl Into<String>) -> Self {
        let mut metric = Self::with_type(name, MetricType::Derived);
        metric.sql = Some(formula.into());
        metric
    }

    /// Running total of `sql` (a metric reference or expression).
    pub fn cumulative(name: impl Into<String>, sql: impl Into<String>) -> Self {
        let mut metric = Self::with_type(name, MetricType::Cumulative);
        metric.sql = Some(sql.into());
        metric
    }

    pub fn time_comparison(name: impl Into<String>, comparison: TimeComparison) -> Self {
        let mut metric = Self::with_type(name, MetricType::TimeComparison);
        metric.comparison = Some(comparison);
        metric
    }

    pub fn conversion(name: impl Into<String>, funnel_steps: Vec<String>) -> Self {
        let mut metric = Self::with_type(name, MetricType::Conversion);
        metric.funnel_steps = funnel_steps;
        metric
    }

    pub fn with_sql(mut self, sql: impl Into<String>) -> Self {
        self.sql = Some(sql.into());
        self
    }

    pub fn with_window(mut self, window: impl Into<String>) -> Self {
        self.window = Some(window.into());
        self
    }

    pub fn with_grain_to_date(mut self, grain: Granularity) -> Self {
        self.grain_to_date = Some(grain);
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filters.push(filter.into());
        self
    }

    pub fn with_fill_nulls(mut self, value: FillValue) -> Self {
        self.fill_nulls_with = Some(value);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// A simple metric without `agg` whose `sql` is a formula over other metrics.
    pub fn is_formula(&self) -> bool {
        self.metric_type == MetricType::Simple && self.agg.is_none() && self.sql.is_some()
    }

    /// Aggregated directly from a model's rows.
    pub fn is_aggregate(&self) -> bool {
        self.metric_type == MetricType::Simple && self.agg.is_some()
    }
}

// =============================================================================
// Relationship
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    ManyToOne,
    OneToMany,
    OneToOne,
}

impl RelationshipType {
    /// The same edge seen from the other side.
    pub fn reversed(&self) -> Self {
        match self {
            RelationshipType::ManyToOne => RelationshipType::OneToMany,
            RelationshipType::OneToMany => RelationshipType::ManyToOne,
            RelationshipType::OneToOne => RelationshipType::OneToOne,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipType::ManyToOne => "many_to_one",
            RelationshipType::OneToMany => "one_to_many",
            RelationshipType::OneToOne => "one_to_one",
        }
    }
}

/// A join edge to another model. `name` is the target model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub name: String,
    #[serde(rename = "type")]
    pub relationship_type: RelationshipType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreign_key: Option<String>,
    /// Key referenced on the "one" side; defaults to that model's primary key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<String>,
}

impl Relationship {
    pub fn new(target: impl Into<String>, relationship_type: RelationshipType) -> Self {
        Self {
            name: target.into(),
            relationship_type,
            foreign_key: None,
            primary_key: None,
        }
    }

    pub fn many_to_one(target: impl Into<String>) -> Self {
        Self::new(target, RelationshipType::ManyToOne)
    }

    pub fn one_to_many(target: impl Into<String>) -> Self {
        Self::new(target, RelationshipType::OneToMany)
    }

    pub fn one_to_one(target: impl Into<String>) -> Self {
        Self::new(target, RelationshipType::OneToOne)
    }

    pub fn with_foreign_key(mut self, fk: impl Into<String>) -> Self {
        self.foreign_key = Some(fk.into());
        self
    }

    pub fn with_primary_key(mut self, pk: impl Into<String>) -> Self {
        self.primary_key = Some(pk.into());
        self
    }

    /// Foreign key column, defaulted from the model that holds it.
    ///
    /// many_to_one: `{target}_id` on the declaring model.
    /// one_to_many / one_to_one: `{declaring}_id` on the target.
    pub fn foreign_key_column(&self, declaring_model: &str) -> String {
        match &self.foreign_key {
            Some(fk) => fk.clone(),
            None => match self.relationship_type {
                RelationshipType::ManyToOne => format!("{}_id", self.name),
                RelationshipType::OneToMany | RelationshipType::OneToOne => {
                    format!("{}_id", declaring_model)
                }
            },
        }
    }
}

// =============================================================================
// Segment
// =============================================================================

/// A named, reusable filter. `{model}` in `sql` is replaced by the model's
/// CTE alias at generation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub name: String,
    pub sql: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Segment {
    pub fn new(name: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql: sql.into(),
            description: None,
        }
    }
}

// =============================================================================
// PreAggregation
// =============================================================================

/// A materialized rollup of a model at a fixed grain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreAggregation {
    pub name: String,
    #[serde(default)]
    pub measures: Vec<String>,
    #[serde(default)]
    pub dimensions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_dimension: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub granularity: Option<Granularity>,
}

impl PreAggregation {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            measures: vec![],
            dimensions: vec![],
            time_dimension: None,
            granularity: None,
        }
    }

    pub fn with_measures(mut self, measures: &[&str]) -> Self {
        self.measures = measures.iter().map(|m| m.to_string()).collect();
        self
    }

    pub fn with_dimensions(mut self, dimensions: &[&str]) -> Self {
        self.dimensions = dimensions.iter().map(|d| d.to_string()).collect();
        self
    }

    pub fn with_time_dimension(
        mut self,
        time_dimension: impl Into<String>,
        granularity: Granularity,
    ) -> Self {
        self.time_dimension = Some(time_dimension.into());
        self.granularity = Some(granularity);
        self
    }

    /// Physical table name: `{model}_preagg_{name}`.
    pub fn table_name(&self, model: &str) -> String {
        format!("{}_preagg_{}", model, self.name)
    }

    /// Column holding the truncated time dimension: `{time_dim}_{grain}`.
    pub fn time_column(&self) -> Option<String> {
        match (&self.time_dimension, self.granularity) {
            (Some(td), Some(g)) => Some(format!("{}_{}", td, g)),
            _ => None,
        }
    }
}
