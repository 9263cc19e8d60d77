//! Error types for the semantic layer.
//!
//! [`SemanticError`] is the crate-level error returned by graph lookups,
//! metric compilation and SQL generation. The three validation errors carry
//! every violation found, one message per problem, and convert into
//! `SemanticError` with `?`.

use std::fmt;

/// Result type for semantic operations.
pub type SemanticResult<T> = Result<T, SemanticError>;

fn join_messages(messages: &[String]) -> String {
    messages.join("; ")
}

/// A model definition failed validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Model '{model}' is invalid: {}", join_messages(.messages))]
pub struct ModelValidationError {
    pub model: String,
    pub messages: Vec<String>,
}

/// A metric definition failed validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Metric '{metric}' is invalid: {}", join_messages(.messages))]
pub struct MetricValidationError {
    pub metric: String,
    pub messages: Vec<String>,
}

/// A query request failed validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Query validation failed: {}", join_messages(.messages))]
pub struct QueryValidationError {
    pub messages: Vec<String>,
}

/// Error type for the semantic layer.
#[derive(Debug, Clone, PartialEq)]
pub enum SemanticError {
    /// Referenced a model that isn't registered.
    ModelNotFound(String),

    /// Referenced a metric that doesn't exist (graph-level or `model.metric`).
    MetricNotFound(String),

    /// Referenced a dimension that doesn't exist on a model.
    DimensionNotFound { model: String, dimension: String },

    /// Referenced a segment that doesn't exist on a model.
    SegmentNotFound(String),

    /// Referenced a parameter that isn't registered.
    ParameterNotFound(String),

    /// A model or graph-level metric with this name already exists.
    Duplicate { kind: &'static str, name: String },

    /// No relationship path connects two models.
    NoPath { from: String, to: String },

    /// Malformed `model.field__granularity` style reference.
    InvalidReference(String),

    ModelValidation(ModelValidationError),
    MetricValidation(MetricValidationError),
    QueryValidation(QueryValidationError),

    /// Metric dependencies loop back on themselves.
    CyclicDependency(Vec<String>),

    /// A parameter value doesn't fit the parameter's type.
    InvalidParameterValue { name: String, message: String },

    /// Template rendering failed.
    Template(String),

    /// Time comparison definition is unusable (zero offset, missing grain...).
    InvalidTimeComparison(String),

    /// Time comparison calculation outside difference/percent_change/ratio.
    UnknownCalculation(String),

    /// The metric is recognized but can't be compiled for this query.
    UnsupportedMetric { metric: String, reason: String },
}

impl fmt::Display for SemanticError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SemanticError::ModelNotFound(name) => write!(f, "Model '{}' not found", name),
            SemanticError::MetricNotFound(name) => write!(f, "Metric '{}' not found", name),
            SemanticError::DimensionNotFound { model, dimension } => {
                write!(
                    f,
                    "Dimension '{}' not found on model '{}'",
                    dimension, model
                )
            }
            SemanticError::SegmentNotFound(name) => write!(f, "Segment '{}' not found", name),
            SemanticError::ParameterNotFound(name) => {
                write!(f, "Parameter '{}' not found", name)
            }
            SemanticError::Duplicate { kind, name } => {
                write!(f, "{} '{}' already exists", kind, name)
            }
            SemanticError::NoPath { from, to } => {
                write!(
                    f,
                    "No join path found between models '{}' and '{}'",
                    from, to
                )
            }
            SemanticError::InvalidReference(msg) => write!(f, "Invalid reference: {}", msg),
            SemanticError::ModelValidation(err) => write!(f, "{}", err),
            SemanticError::MetricValidation(err) => write!(f, "{}", err),
            SemanticError::QueryValidation(err) => write!(f, "{}", err),
            SemanticError::CyclicDependency(cycle) => {
                write!(f, "Circular metric dependency: {}", cycle.join(" -> "))
            }
            SemanticError::InvalidParameterValue { name, message } => {
                write!(f, "Invalid value for parameter '{}': {}", name, message)
            }
            SemanticError::Template(msg) => write!(f, "Template error: {}", msg),
            SemanticError::InvalidTimeComparison(msg) => {
                write!(f, "Invalid time comparison: {}", msg)
            }
            SemanticError::UnknownCalculation(calc) => {
                write!(f, "Unknown calculation type: {}", calc)
            }
            SemanticError::UnsupportedMetric { metric, reason } => {
                write!(f, "Metric '{}' cannot be compiled: {}", metric, reason)
            }
        }
    }
}

impl std::error::Error for SemanticError {}

impl From<ModelValidationError> for SemanticError {
    fn from(err: ModelValidationError) -> Self {
        SemanticError::ModelValidation(err)
    }
}

impl From<MetricValidationError> for SemanticError {
    fn from(err: MetricValidationError) -> Self {
        SemanticError::MetricValidation(err)
    }
}

impl From<QueryValidationError> for SemanticError {
    fn from(err: QueryValidationError) -> Self {
        SemanticError::QueryValidation(err)
    }
}
