//! What a request touches, resolved once per query.

use std::collections::HashSet;

use tracing::debug;

use crate::params::ParameterSet;
use crate::semantic::error::{SemanticError, SemanticResult};
use crate::semantic::graph::{formula_references, ResolvedDimension, ResolvedMetric, SemanticGraph};
use crate::semantic::request::QueryRequest;
use crate::sql::dialect::Dialect;
use crate::time::relative;

/// Alias of a model's table or SQL inside its `{model}_cte`.
pub(crate) const SOURCE_ALIAS: &str = "t";

/// A metric named in the request.
#[derive(Debug, Clone)]
pub(crate) struct OutputMetric<'g> {
    pub reference: String,
    /// Output column: the metric name without its model prefix.
    pub alias: String,
    pub resolved: ResolvedMetric<'g>,
}

impl OutputMetric<'_> {
    pub fn is_window(&self) -> bool {
        self.resolved.metric.metric_type.needs_window()
    }
}

/// A request filter after parameter and relative-date rewriting.
#[derive(Debug, Clone)]
pub(crate) struct QueryFilter {
    pub sql: String,
    /// Models whose dimensions the filter reads.
    pub models: Vec<String>,
    /// Compares metric values, so it applies after aggregation.
    pub on_metrics: bool,
}

/// A segment predicate over its model's source alias.
#[derive(Debug, Clone)]
pub(crate) struct SegmentFilter {
    pub model: String,
    pub sql: String,
}

pub(crate) struct QueryContext<'g> {
    pub graph: &'g SemanticGraph,
    pub dialect: Dialect,
    pub ungrouped: bool,
    pub dimensions: Vec<ResolvedDimension<'g>>,
    pub metrics: Vec<OutputMetric<'g>>,
    pub filters: Vec<QueryFilter>,
    pub segments: Vec<SegmentFilter>,
    /// Dimensions read only by filters.
    pub filter_dimensions: Vec<ResolvedDimension<'g>>,
    /// Metrics aggregating model rows, requested or reached through
    /// dependencies and filters.
    pub row_metrics: Vec<ResolvedMetric<'g>>,
    /// Every model the request touches, in first-seen order.
    pub models: Vec<String>,
    pub params: ParameterSet<'g>,
    visited: HashSet<String>,
}

impl<'g> QueryContext<'g> {
    pub fn resolve(
        graph: &'g SemanticGraph,
        request: &QueryRequest,
        dialect: Dialect,
    ) -> SemanticResult<Self> {
        let mut ctx = Self {
            graph,
            dialect,
            ungrouped: request.ungrouped,
            dimensions: Vec::new(),
            metrics: Vec::new(),
            filters: Vec::new(),
            segments: Vec::new(),
            filter_dimensions: Vec::new(),
            row_metrics: Vec::new(),
            models: Vec::new(),
            params: ParameterSet::new(graph.parameters(), request.parameters.clone()),
            visited: HashSet::new(),
        };

        for reference in &request.metrics {
            let resolved = graph.resolve_metric(reference, None)?;
            if let Some(model) = resolved.model_name() {
                ctx.touch(model);
            }
            ctx.collect_row_metrics(resolved)?;
            ctx.metrics.push(OutputMetric {
                reference: reference.clone(),
                alias: output_name(reference),
                resolved,
            });
        }

        for reference in &request.dimensions {
            let resolved = graph.resolve_dimension(reference)?;
            ctx.touch(&resolved.model.name);
            ctx.dimensions.push(resolved);
        }

        for filter in &request.filters {
            let filter = ctx.resolve_filter(filter)?;
            ctx.filters.push(filter);
        }

        for reference in &request.segments {
            let (model, segment) = graph.resolve_segment(reference)?;
            ctx.touch(&model.name);
            let sql = ctx
                .params
                .interpolate(&segment.sql.replace("{model}", SOURCE_ALIAS))?;
            ctx.segments.push(SegmentFilter {
                model: model.name.clone(),
                sql,
            });
        }

        debug!(
            models = ?ctx.models,
            row_metrics = ctx.row_metrics.len(),
            filters = ctx.filters.len(),
            "resolved query"
        );
        Ok(ctx)
    }

    fn touch(&mut self, model: &str) {
        if !self.models.iter().any(|m| m == model) {
            self.models.push(model.to_string());
        }
    }

    fn collect_row_metrics(&mut self, resolved: ResolvedMetric<'g>) -> SemanticResult<()> {
        let key = resolved.canonical_name();
        if !self.visited.insert(key) {
            return Ok(());
        }

        let graph = self.graph;
        if let (true, Some(model)) = (
            graph.reads_rows(resolved.metric, resolved.model_name()),
            resolved.model,
        ) {
            self.touch(&model.name);
            self.row_metrics.push(resolved);
        }

        for dependency in graph.metric_dependencies(resolved.metric, resolved.model_name()) {
            let dep = graph.resolve_metric(&dependency, resolved.model_name())?;
            self.collect_row_metrics(dep)?;
        }
        Ok(())
    }

    fn resolve_filter(&mut self, filter: &str) -> SemanticResult<QueryFilter> {
        let sql = relative::rewrite_filter(&self.params.interpolate(filter)?, self.dialect);
        let graph = self.graph;

        let mut models: Vec<String> = Vec::new();
        let mut on_metrics = false;
        for reference in formula_references(&sql) {
            let Some((model, _)) = reference.name.split_once('.') else {
                continue;
            };
            if !graph.has_model(model) {
                continue;
            }
            if let Ok(dimension) = graph.resolve_dimension(&reference.name) {
                if !models.iter().any(|m| m == model) {
                    models.push(model.to_string());
                }
                self.touch(model);
                if !self.is_requested(&dimension)
                    && !self.filter_dimensions.iter().any(|d| same_column(d, &dimension))
                {
                    self.filter_dimensions.push(dimension);
                }
            } else if let Ok(metric) = graph.resolve_metric(&reference.name, None) {
                on_metrics = true;
                self.touch(model);
                self.collect_row_metrics(metric)?;
            }
        }

        Ok(QueryFilter {
            sql,
            models,
            on_metrics,
        })
    }

    /// Whether `dimension` is one of the request's output columns.
    pub fn is_requested(&self, dimension: &ResolvedDimension<'_>) -> bool {
        self.dimensions.iter().any(|d| same_column(d, dimension))
    }

    /// Models with row-reading metrics, in first-seen order.
    pub fn contributing_models(&self) -> Vec<String> {
        let mut models: Vec<String> = Vec::new();
        for metric in &self.row_metrics {
            if let Some(name) = metric.model_name() {
                if !models.iter().any(|m| m == name) {
                    models.push(name.to_string());
                }
            }
        }
        models
    }

    pub fn row_metrics_of<'a>(
        &'a self,
        model: &'a str,
    ) -> impl Iterator<Item = &'a ResolvedMetric<'g>> + 'a {
        self.row_metrics
            .iter()
            .filter(move |m| m.model_name() == Some(model))
    }

    /// Requested and filter dimensions living on `model`.
    pub fn cte_dimensions<'a>(
        &'a self,
        model: &'a str,
    ) -> impl Iterator<Item = &'a ResolvedDimension<'g>> + 'a {
        self.dimensions
            .iter()
            .chain(self.filter_dimensions.iter())
            .filter(move |d| d.model.name == model)
    }

    pub fn dimension_filters(&self) -> impl Iterator<Item = &QueryFilter> {
        self.filters.iter().filter(|f| !f.on_metrics)
    }

    pub fn metric_filters(&self) -> impl Iterator<Item = &QueryFilter> {
        self.filters.iter().filter(|f| f.on_metrics)
    }

    /// Models whose rows a dimension filter or segment restricts.
    pub fn restricted_models(&self) -> HashSet<&str> {
        self.dimension_filters()
            .flat_map(|f| f.models.iter().map(String::as_str))
            .chain(self.segments.iter().map(|s| s.model.as_str()))
            .collect()
    }

    /// Models every per-model aggregate must join: dimension owners plus
    /// restricted models.
    pub fn slicing_models(&self) -> Vec<String> {
        let mut models: Vec<String> = Vec::new();
        let owners = self
            .dimensions
            .iter()
            .map(|d| d.model.name.as_str())
            .chain(self.dimension_filters().flat_map(|f| f.models.iter().map(String::as_str)))
            .chain(self.segments.iter().map(|s| s.model.as_str()));
        for name in owners {
            if !models.iter().any(|m| m == name) {
                models.push(name.to_string());
            }
        }
        models
    }

    pub fn has_window_metrics(&self) -> bool {
        self.metrics.iter().any(OutputMetric::is_window)
    }

    /// Output columns of the SQL: dimensions, then metrics, in request order.
    pub fn output_columns(&self) -> Vec<String> {
        self.dimensions
            .iter()
            .map(ResolvedDimension::alias)
            .chain(self.metrics.iter().map(|m| m.alias.clone()))
            .collect()
    }

    /// Output column an ORDER BY field refers to.
    pub fn order_column(&self, field: &str) -> Option<String> {
        if let Some(dim) = self
            .dimensions
            .iter()
            .find(|d| format!("{}.{}", d.model.name, d.alias()) == field || d.alias() == field)
        {
            return Some(dim.alias());
        }
        self.metrics
            .iter()
            .find(|m| m.reference == field || m.alias == field)
            .map(|m| m.alias.clone())
    }

    pub fn first_window_metric(&self) -> Option<&OutputMetric<'g>> {
        self.metrics.iter().find(|m| m.is_window())
    }

    pub(crate) fn unsupported(&self, reason: impl Into<String>) -> SemanticError {
        let metric = self
            .first_window_metric()
            .map(|m| m.reference.clone())
            .unwrap_or_default();
        SemanticError::UnsupportedMetric {
            metric,
            reason: reason.into(),
        }
    }
}

fn same_column(a: &ResolvedDimension<'_>, b: &ResolvedDimension<'_>) -> bool {
    a.model.name == b.model.name && a.alias() == b.alias()
}

/// `orders.revenue` -> `revenue`.
pub(crate) fn output_name(reference: &str) -> String {
    reference
        .rsplit('.')
        .next()
        .unwrap_or(reference)
        .trim()
        .to_string()
}
