//! Semantic layer - models, metrics, relationships and the graph that ties
//! them together.
//!
//! - [`model`] - model, dimension, metric, relationship, segment and
//!   pre-aggregation definitions
//! - [`graph`] - the registry plus join path search and metric dependencies
//! - [`reference`] - `model.field__granularity` references
//! - [`request`] - query requests
//! - [`error`] - error types shared across the crate

pub mod error;
pub mod graph;
pub mod model;
pub mod reference;
pub mod request;

pub use error::{
    MetricValidationError, ModelValidationError, QueryValidationError, SemanticError,
    SemanticResult,
};
pub use graph::{JoinPath, JoinStep, ResolvedDimension, ResolvedMetric, SemanticGraph};
pub use model::{
    Aggregation, Dimension, DimensionType, FillValue, Metric, MetricType, Model, PreAggregation,
    Relationship, RelationshipType, Segment,
};
pub use reference::{FieldRef, Granularity};
pub use request::QueryRequest;
