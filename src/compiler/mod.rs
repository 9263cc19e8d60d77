//! Query compilation: requests in, SQL out.
//!
//! ```text
//! QueryRequest
//!     │ validate_query
//!     ▼
//! QueryContext        metrics, dimensions, filters, segments and the
//!     │               models they touch, parameters interpolated
//!     ├── single model, grouped, routing on ──► PreaggRouter ──► rollup SQL
//!     ▼
//! model CTEs ─► joined + grouped (or per-model aggregates) ─► window wrap
//!     │
//!     ▼
//! ORDER BY / LIMIT / OFFSET ─► SQL for the dialect
//! ```
//!
//! The generator only borrows the graph, so one graph can serve any number
//! of generators and threads.

mod builder;
mod context;
pub mod metrics;

use tracing::{debug, info};

use crate::config::Settings;
use crate::preagg::{
    rollup_query, DefaultScorer, PreaggRouter, PreaggScorer, QueryPlan, RoutingDecision,
    RoutingRequest,
};
use crate::semantic::error::SemanticResult;
use crate::semantic::graph::SemanticGraph;
use crate::semantic::request::{parse_order_by, QueryRequest};
use crate::sql::dialect::Dialect;
use crate::sql::expr::col;
use crate::sql::query::{OrderByExpr, Query};
use crate::validation::validate_query;

use context::QueryContext;

const DISABLED: &str = "pre-aggregation routing disabled";

pub use metrics::{MetricCompiler, MetricScope};

/// Compiles [`QueryRequest`]s against a graph.
pub struct SqlGenerator<'g> {
    graph: &'g SemanticGraph,
    settings: Settings,
    scorer: Box<dyn PreaggScorer + 'g>,
}

impl<'g> SqlGenerator<'g> {
    pub fn new(graph: &'g SemanticGraph) -> Self {
        Self {
            graph,
            settings: Settings::default(),
            scorer: Box::new(DefaultScorer),
        }
    }

    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Rank matching rollups with `scorer` instead of [`DefaultScorer`].
    pub fn with_scorer(mut self, scorer: impl PreaggScorer + 'g) -> Self {
        self.scorer = Box::new(scorer);
        self
    }

    /// SQL answering `request`.
    pub fn generate(&self, request: &QueryRequest) -> SemanticResult<String> {
        Ok(self.explain(request)?.sql)
    }

    /// Routing decision and final SQL for `request`, without running it.
    pub fn explain(&self, request: &QueryRequest) -> SemanticResult<QueryPlan> {
        validate_query(self.graph, request)?;

        let dialect = effective_dialect(request, &self.settings);
        let ctx = QueryContext::resolve(self.graph, request, dialect)?;

        let (decision, rollup) = self.route(&ctx, request)?;
        let query = match rollup {
            Some(query) => query,
            None => ctx.build_query()?,
        };
        let sql = apply_ordering(&ctx, request, query).to_sql(dialect);

        let plan = QueryPlan {
            sql,
            model: match ctx.models.as_slice() {
                [only] => Some(only.clone()),
                _ => None,
            },
            metrics: request.metrics.clone(),
            dimensions: request.dimensions.clone(),
            selected_preaggregation: decision.selected().map(|c| c.name.clone()),
            reason: decision.reason,
            candidates: decision.candidates,
        };
        info!(
            dialect = %dialect,
            models = ?ctx.models,
            preaggregation = ?plan.selected_preaggregation,
            "generated query"
        );
        Ok(plan)
    }

    /// Columns the generated SQL returns, followed by table calculation
    /// outputs, in order.
    pub fn output_columns(&self, request: &QueryRequest) -> SemanticResult<Vec<String>> {
        let ctx = QueryContext::resolve(self.graph, request, effective_dialect(request, &self.settings))?;
        let mut columns = ctx.output_columns();
        for calc in &request.table_calculations {
            if !columns.contains(&calc.name) {
                columns.push(calc.name.clone());
            }
        }
        Ok(columns)
    }

    fn route(
        &self,
        ctx: &QueryContext<'g>,
        request: &QueryRequest,
    ) -> SemanticResult<(RoutingDecision, Option<Query>)> {
        let enabled = request
            .use_preaggregations
            .unwrap_or(self.settings.compiler.use_preaggregations);
        let raw = |reason: &str| -> SemanticResult<(RoutingDecision, Option<Query>)> {
            let reason = if enabled { reason } else { DISABLED };
            Ok((RoutingDecision::raw(reason), None))
        };
        if ctx.ungrouped {
            return raw("ungrouped queries read raw rows");
        }
        let [model_name] = ctx.models.as_slice() else {
            return raw("query spans multiple models");
        };

        let model = self.graph.get_model(model_name)?;
        let routing = RoutingRequest {
            metrics: ctx
                .metrics
                .iter()
                .map(|m| match m.resolved.model_name() {
                    Some(owner) if owner == model.name => m.resolved.metric.name.clone(),
                    _ => m.reference.clone(),
                })
                .collect(),
            dimensions: ctx
                .dimensions
                .iter()
                .map(|d| (d.dimension.name.clone(), d.granularity))
                .collect(),
            filters: ctx.filters.iter().map(|f| f.sql.clone()).collect(),
            segments: request.segments.clone(),
        };

        let decision = PreaggRouter::new(model)
            .with_scorer(self.scorer.as_ref())
            .route(&routing);
        if !enabled {
            // Candidates are still evaluated so explain shows what would match.
            return Ok((decision.report_only(DISABLED), None));
        }
        let Some(preagg) = decision
            .selected_index()
            .and_then(|i| model.pre_aggregations.get(i))
        else {
            debug!(model = %model.name, reason = %decision.reason, "scanning raw table");
            return Ok((decision, None));
        };

        let table = self
            .settings
            .preaggregations
            .qualified_table(&preagg.table_name(&model.name), ctx.dialect);
        let query = rollup_query(model, preagg, &routing, &table, ctx.dialect)?;
        Ok((decision, Some(query)))
    }
}

/// ORDER BY on output columns, then LIMIT / OFFSET.
///
/// Entries naming table calculations are skipped: those columns only
/// exist after post-processing.
fn apply_ordering(ctx: &QueryContext<'_>, request: &QueryRequest, query: Query) -> Query {
    let order: Vec<OrderByExpr> = request
        .order_by
        .iter()
        .filter_map(|entry| {
            let (field, descending) = parse_order_by(entry);
            if request.table_calculations.iter().any(|c| c.name == field) {
                return None;
            }
            let column = ctx.order_column(field)?;
            Some(if descending {
                OrderByExpr::desc(col(&column))
            } else {
                OrderByExpr::new(col(&column))
            })
        })
        .collect();

    let mut query = if order.is_empty() {
        query
    } else {
        query.order_by(order)
    };
    if let Some(limit) = request.limit {
        query = query.limit(limit);
    }
    if let Some(offset) = request.offset {
        query = query.offset(offset);
    }
    query
}

/// Dialect a request compiles for under `settings`.
pub fn effective_dialect(request: &QueryRequest, settings: &Settings) -> Dialect {
    request.dialect.unwrap_or(settings.compiler.dialect)
}
