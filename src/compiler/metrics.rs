//! Metric compilation.
//!
//! Turns a metric reference into a SQL expression, branching on the metric
//! type and compiling dependencies first. Results are memoized per query by
//! canonical metric name, so a metric shared by several derived metrics is
//! compiled once.
//!
//! Where an aggregate reads its input from depends on the shape of the
//! query being built; see [`MetricScope`].

use std::collections::{HashMap, HashSet};

use crate::semantic::error::{SemanticError, SemanticResult};
use crate::semantic::graph::{substitute_references, ResolvedMetric, SemanticGraph};
use crate::semantic::model::{Aggregation, FillValue, Metric, MetricType, Model};
use crate::sql::dialect::{Dialect, SqlDialect};
use crate::sql::expr::{
    avg, coalesce, count, count_distinct, lit_float, lit_int, lit_str, max, min, nullif, raw_sql,
    sum, table_col, Expr, ExprExt,
};

/// Where aggregate metrics find their input.
#[derive(Debug, Clone)]
pub enum MetricScope {
    /// `AGG(relation.metric_raw)`; maps each model to the relation that
    /// carries its raw columns in the FROM clause.
    Grouped(HashMap<String, String>),
    /// Columns of the per-model aggregate CTEs: `{model}_agg.metric`.
    PreAggregated,
    /// Unaggregated row values, for ungrouped queries.
    Rows(HashMap<String, String>),
}

/// Name of the per-model CTE that reads the model's source.
pub fn model_cte(model: &str) -> String {
    format!("{}_cte", model)
}

/// Name of the per-model CTE that aggregates the model's metrics.
pub fn model_agg(model: &str) -> String {
    format!("{}_agg", model)
}

/// Column carrying a metric's row-level input.
pub fn raw_column(metric: &str) -> String {
    format!("{}_raw", metric)
}

/// Row-level expression behind a row-reading metric, with its filters
/// applied as `CASE WHEN`.
///
/// `{model}` placeholders are replaced by `source_alias`. Counts without
/// `sql` count rows.
pub fn raw_expression(metric: &Metric, source_alias: &str) -> String {
    let body = match (&metric.sql, &metric.window_expression) {
        (Some(sql), _) => sql.clone(),
        (None, Some(expr)) => expr.clone(),
        (None, None) if metric.agg == Some(Aggregation::Count) => "1".to_string(),
        (None, None) => metric.name.clone(),
    };
    let body = body.replace("{model}", source_alias);

    if metric.filters.is_empty() {
        return body;
    }
    let condition = metric
        .filters
        .iter()
        .map(|f| format!("({})", f.replace("{model}", source_alias)))
        .collect::<Vec<_>>()
        .join(" AND ");
    format!("CASE WHEN {} THEN {} END", condition, body)
}

/// Per-query metric compiler.
pub struct MetricCompiler<'g> {
    graph: &'g SemanticGraph,
    dialect: Dialect,
    scope: MetricScope,
    memo: HashMap<String, Expr>,
    in_progress: HashSet<String>,
}

impl<'g> MetricCompiler<'g> {
    pub fn new(graph: &'g SemanticGraph, dialect: Dialect, scope: MetricScope) -> Self {
        Self {
            graph,
            dialect,
            scope,
            memo: HashMap::new(),
            in_progress: HashSet::new(),
        }
    }

    /// Compile `reference` as seen from `context_model`.
    pub fn compile(&mut self, reference: &str, context_model: Option<&str>) -> SemanticResult<Expr> {
        let resolved = self.graph.resolve_metric(reference, context_model)?;
        self.compile_resolved(resolved)
    }

    pub fn compile_resolved(&mut self, resolved: ResolvedMetric<'g>) -> SemanticResult<Expr> {
        let key = resolved.canonical_name();
        if let Some(expr) = self.memo.get(&key) {
            return Ok(expr.clone());
        }
        if !self.in_progress.insert(key.clone()) {
            return Err(SemanticError::CyclicDependency(vec![key.clone(), key]));
        }

        let result = self.compile_uncached(resolved);
        self.in_progress.remove(&key);

        let expr = result?;
        self.memo.insert(key, expr.clone());
        Ok(expr)
    }

    fn compile_uncached(&mut self, resolved: ResolvedMetric<'g>) -> SemanticResult<Expr> {
        let metric = resolved.metric;
        let context = resolved.model_name();

        let expr = match metric.metric_type {
            MetricType::Simple if metric.agg.is_some() => {
                let model = resolved.model.ok_or_else(|| unattached(metric))?;
                self.aggregate(model, metric)?
            }
            MetricType::Simple | MetricType::Derived => self.formula(metric, context)?,
            MetricType::Ratio => {
                let (Some(numerator), Some(denominator)) = (&metric.numerator, &metric.denominator)
                else {
                    return Err(SemanticError::UnsupportedMetric {
                        metric: metric.name.clone(),
                        reason: "ratio needs a numerator and a denominator".to_string(),
                    });
                };
                let num = self.compile(numerator, context)?;
                let den = self.compile(denominator, context)?;
                num.paren().div(nullif(den, lit_int(0)))
            }
            MetricType::Cumulative | MetricType::TimeComparison => {
                return Err(SemanticError::UnsupportedMetric {
                    metric: metric.name.clone(),
                    reason: "window metrics must be requested directly, not referenced".to_string(),
                });
            }
            MetricType::Conversion => {
                return Err(SemanticError::UnsupportedMetric {
                    metric: metric.name.clone(),
                    reason: "conversion metrics cannot be compiled to SQL".to_string(),
                });
            }
        };

        Ok(fill_nulls(metric, expr))
    }

    /// Aggregate of a row-reading metric, without `fill_nulls_with`.
    ///
    /// Used directly when building the per-model aggregate CTEs.
    pub fn aggregate(&self, model: &Model, metric: &Metric) -> SemanticResult<Expr> {
        let agg = metric.agg.unwrap_or(Aggregation::Sum);
        match &self.scope {
            MetricScope::PreAggregated => Ok(table_col(&model_agg(&model.name), &metric.name)),
            MetricScope::Rows(sources) => {
                let source = source_for(sources, model, metric)?;
                Ok(table_col(source, &raw_column(&metric.name)))
            }
            MetricScope::Grouped(sources) => {
                let source = source_for(sources, model, metric)?;
                let input = table_col(source, &raw_column(&metric.name));
                Ok(match agg {
                    Aggregation::Sum => sum(input),
                    Aggregation::Count => count(input),
                    Aggregation::CountDistinct => count_distinct(input),
                    Aggregation::Avg => avg(input),
                    Aggregation::Min => min(input),
                    Aggregation::Max => max(input),
                    Aggregation::Median => raw_sql(&self.dialect.median(&input.to_sql(self.dialect))),
                })
            }
        }
    }

    /// Input of a cumulative or time comparison metric, at the query grain.
    pub fn window_input(&mut self, resolved: ResolvedMetric<'g>) -> SemanticResult<Expr> {
        let metric = resolved.metric;
        let context = resolved.model_name();
        match metric.metric_type {
            MetricType::TimeComparison => {
                let comparison = metric.comparison.as_ref().ok_or_else(|| {
                    SemanticError::InvalidTimeComparison(format!(
                        "metric '{}' has no comparison",
                        metric.name
                    ))
                })?;
                self.compile(&comparison.metric, context)
            }
            MetricType::Cumulative => {
                let deps = self.graph.metric_dependencies(metric, context);
                match deps.first() {
                    Some(dep) => self.compile(dep, context),
                    None => {
                        let model = resolved.model.ok_or_else(|| unattached(metric))?;
                        self.aggregate(model, metric)
                    }
                }
            }
            _ => self.compile_resolved(resolved),
        }
    }

    fn formula(&mut self, metric: &Metric, context: Option<&str>) -> SemanticResult<Expr> {
        let formula = metric.sql.as_deref().unwrap_or_default();
        let mut compiled = HashMap::new();
        for dep in self.graph.metric_dependencies(metric, context) {
            let expr = self.compile(&dep, context)?;
            compiled.insert(dep, expr.to_sql(self.dialect));
        }
        Ok(raw_sql(&substitute_references(formula, &compiled)))
    }
}

/// Wrap `expr` in `COALESCE` when the metric declares `fill_nulls_with`.
pub fn fill_nulls(metric: &Metric, expr: Expr) -> Expr {
    match &metric.fill_nulls_with {
        None => expr,
        Some(value) => coalesce(vec![expr, fill_literal(value)]),
    }
}

fn fill_literal(value: &FillValue) -> Expr {
    match value {
        FillValue::Int(n) => lit_int(*n),
        FillValue::Float(f) => lit_float(*f),
        FillValue::Text(s) => lit_str(s),
    }
}

fn source_for<'s>(
    sources: &'s HashMap<String, String>,
    model: &Model,
    metric: &Metric,
) -> SemanticResult<&'s str> {
    sources
        .get(&model.name)
        .map(String::as_str)
        .ok_or_else(|| SemanticError::UnsupportedMetric {
            metric: format!("{}.{}", model.name, metric.name),
            reason: format!("model '{}' is not part of this query", model.name),
        })
}

fn unattached(metric: &Metric) -> SemanticError {
    SemanticError::UnsupportedMetric {
        metric: metric.name.clone(),
        reason: "aggregates need a model".to_string(),
    }
}
