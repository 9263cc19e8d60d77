//! # Tessera
//!
//! A semantic layer that compiles metric queries to multi-dialect SQL.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │   Models, metrics, relationships, segments, parameters   │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [validation, add_model / add_metric]
//! ┌─────────────────────────────────────────────────────────┐
//! │          SemanticGraph (join graph + registry)           │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [QueryRequest]
//! ┌─────────────────────────────────────────────────────────┐
//! │   SqlGenerator: resolve, route to rollups, build query   │
//! │   (metric compiler, time comparisons, parameters)        │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [dialect]
//! ┌─────────────────────────────────────────────────────────┐
//! │              SQL string  /  QueryPlan                    │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [executed elsewhere]
//! ┌─────────────────────────────────────────────────────────┐
//! │       TableCalculationProcessor over result rows         │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use tessera::prelude::*;
//!
//! let mut graph = SemanticGraph::new();
//! graph
//!     .add_model(
//!         Model::new("orders", "order_id")
//!             .with_table("orders")
//!             .with_dimension(Dimension::categorical("status"))
//!             .with_metric(Metric::sum("revenue", "amount")),
//!     )
//!     .unwrap();
//!
//! let request = QueryRequest::new()
//!     .with_metrics(&["orders.revenue"])
//!     .with_dimensions(&["orders.status"]);
//! let sql = SqlGenerator::new(&graph).generate(&request).unwrap();
//! assert!(sql.contains("GROUP BY"));
//! ```

pub mod compiler;
pub mod config;
pub mod params;
pub mod preagg;
pub mod semantic;
pub mod sql;
pub mod table_calc;
pub mod time;
pub mod validation;

// Re-export SQL submodules at crate level
pub use sql::dialect;
pub use sql::expr;
pub use sql::query;
pub use sql::token;

/// Re-exports for convenient usage.
pub mod prelude {
    pub use crate::compiler::SqlGenerator;
    pub use crate::config::Settings;
    pub use crate::dialect::{Dialect, SqlDialect};
    pub use crate::params::{Parameter, ParameterType};
    pub use crate::preagg::{PreaggScorer, QueryPlan};
    pub use crate::semantic::{
        Aggregation, Dimension, FillValue, Granularity, Metric, MetricType, Model,
        PreAggregation, QueryRequest, Relationship, RelationshipType, Segment, SemanticError,
        SemanticGraph, SemanticResult,
    };
    pub use crate::table_calc::{
        TableCalculation, TableCalculationProcessor, TableCalculationType, Value,
    };
    pub use crate::time::{ComparisonCalculation, ComparisonType, TimeComparison, TimeUnit};
}

// Also export at crate root for convenience
pub use compiler::SqlGenerator;
pub use dialect::Dialect;
pub use semantic::{QueryRequest, SemanticError, SemanticGraph, SemanticResult};
