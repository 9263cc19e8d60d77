//! SELECT assembly for a resolved request.
//!
//! Every model the query reads gets a `{model}_cte` over its source with
//! just the columns the query needs. With at most one model contributing
//! aggregates the CTEs are joined and grouped directly. With several, each
//! contributing model is aggregated on its own in `{model}_agg` and the
//! aggregates are merged on the dimension columns, so no model's rows are
//! multiplied by another's. Window metrics wrap the grouped query in a
//! `base` CTE.

use std::collections::HashMap;

use super::context::{OutputMetric, QueryContext, QueryFilter, SOURCE_ALIAS};
use super::metrics::{
    fill_nulls, model_agg, model_cte, raw_column, raw_expression, MetricCompiler, MetricScope,
};
use crate::semantic::error::{ModelValidationError, SemanticError, SemanticResult};
use crate::semantic::graph::{formula_references, rewrite_references, JoinPath, ResolvedDimension};
use crate::semantic::model::{Aggregation, Metric, MetricType, Model};
use crate::semantic::reference::Granularity;
use crate::sql::dialect::SqlDialect;
use crate::sql::expr::{
    coalesce, max, min, raw_sql, sum, table_col, Expr, ExprExt, WindowExt, WindowFrame,
    WindowOrderBy,
};
use crate::sql::query::{Cte, JoinType, Query, SelectExpr, TableRef};
use crate::time::{generate_time_comparison_sql, parse_window};

const DEDUPED: &str = "deduped";
const BASE: &str = "base";

/// Join trees behind the grouped query.
enum Shape {
    /// One tree rooted at the model whose rows are aggregated.
    Inline { base: String, path: JoinPath },
    /// One tree per contributing model.
    PerModel(Vec<(String, JoinPath)>),
}

/// FROM clause of a grouped SELECT and where each model's columns live in it.
struct JoinedSource {
    query: Query,
    relations: HashMap<String, String>,
}

impl JoinedSource {
    fn dimension(&self, dim: &ResolvedDimension<'_>) -> Expr {
        let relation = self
            .relations
            .get(&dim.model.name)
            .cloned()
            .unwrap_or_else(|| model_cte(&dim.model.name));
        table_col(&relation, &dim.alias())
    }
}

/// Select list under construction, skipping repeated column names.
#[derive(Default)]
struct Columns {
    items: Vec<SelectExpr>,
    names: Vec<String>,
}

impl Columns {
    fn push(&mut self, name: &str, expr: Expr) {
        if self.names.iter().any(|n| n == name) {
            return;
        }
        self.names.push(name.to_string());
        self.items.push(SelectExpr::new(expr).with_alias(name));
    }
}

/// `{metric}_input`: the per-period value a window metric runs over.
fn window_input(alias: &str) -> String {
    format!("{}_input", alias)
}

/// Raw SQL predicate, parenthesized when a top-level OR would otherwise
/// bind looser than the surrounding ANDs.
fn predicate(sql: &str) -> Expr {
    let sql = sql.trim();
    let expr = raw_sql(sql);
    if sql.to_ascii_uppercase().contains(" OR ") {
        expr.paren()
    } else {
        expr
    }
}

impl<'g> QueryContext<'g> {
    /// The complete SELECT, without ORDER BY and pagination.
    pub fn build_query(&self) -> SemanticResult<Query> {
        let windowed = self.has_window_metrics();
        if windowed && self.ungrouped {
            return Err(self.unsupported("window metrics need a grouped query"));
        }

        let shape = self.shape()?;
        let mut ctes = self.model_ctes(&shape)?;
        let grouped = match &shape {
            Shape::Inline { base, path } => self.inline_query(base, path)?,
            Shape::PerModel(parts) => self.per_model_query(parts)?,
        };

        let mut query = if windowed {
            self.window_query(grouped)?
        } else {
            grouped
        };
        ctes.append(&mut query.with);
        query.with = ctes;
        Ok(query)
    }

    fn shape(&self) -> SemanticResult<Shape> {
        let contributing = self.contributing_models();
        if contributing.len() > 1 && !self.ungrouped {
            let slicing = self.slicing_models();
            let parts = contributing
                .into_iter()
                .map(|model| {
                    let targets: Vec<&str> = slicing
                        .iter()
                        .map(String::as_str)
                        .filter(|m| *m != model)
                        .collect();
                    let path = self.graph.find_join_tree(&model, &targets)?;
                    Ok((model, path))
                })
                .collect::<SemanticResult<Vec<_>>>()?;
            return Ok(Shape::PerModel(parts));
        }

        let base = contributing
            .into_iter()
            .next()
            .or_else(|| self.models.first().cloned())
            .ok_or_else(|| {
                SemanticError::InvalidReference("query does not touch any model".to_string())
            })?;
        let targets: Vec<&str> = self
            .models
            .iter()
            .map(String::as_str)
            .filter(|m| *m != base)
            .collect();
        let path = self.graph.find_join_tree(&base, &targets)?;
        Ok(Shape::Inline { base, path })
    }

    fn model_ctes(&self, shape: &Shape) -> SemanticResult<Vec<Cte>> {
        let trees: Vec<(&str, &JoinPath)> = match shape {
            Shape::Inline { base, path } => vec![(base.as_str(), path)],
            Shape::PerModel(parts) => parts.iter().map(|(m, p)| (m.as_str(), p)).collect(),
        };

        let mut order: Vec<&str> = Vec::new();
        let mut keys: HashMap<&str, Vec<&str>> = HashMap::new();
        for (base, path) in trees {
            if !order.contains(&base) {
                order.push(base);
            }
            for step in &path.steps {
                for (model, key) in [
                    (step.from_model.as_str(), step.from_key.as_str()),
                    (step.to_model.as_str(), step.to_key.as_str()),
                ] {
                    if !order.contains(&model) {
                        order.push(model);
                    }
                    keys.entry(model).or_default().push(key);
                }
            }
        }

        order
            .into_iter()
            .map(|name| {
                let model = self.graph.get_model(name)?;
                let model_keys = keys.get(name).map(Vec::as_slice).unwrap_or(&[]);
                Ok(Cte::new(&model_cte(name), self.model_cte_query(model, model_keys)?))
            })
            .collect()
    }

    fn model_cte_query(&self, model: &Model, keys: &[&str]) -> SemanticResult<Query> {
        let source = match (&model.table, &model.sql) {
            (Some(table), _) => TableRef::raw_table(table),
            (None, Some(sql)) => TableRef::raw_sql(&self.params.interpolate(sql)?),
            (None, None) => {
                return Err(ModelValidationError {
                    model: model.name.clone(),
                    messages: vec![format!(
                        "Model '{}' must have either 'table' or 'sql' defined",
                        model.name
                    )],
                }
                .into())
            }
        };

        let mut columns = Columns::default();
        columns.push(&model.primary_key, raw_sql(&model.primary_key));
        for key in keys {
            columns.push(key, raw_sql(key));
        }
        for dim in self.cte_dimensions(&model.name) {
            let expr = dim.dimension.sql_expr().replace("{model}", SOURCE_ALIAS);
            let expr = match dim.granularity {
                Some(grain) => self.dialect.date_trunc(grain.as_str(), &expr),
                None => expr,
            };
            columns.push(&dim.alias(), raw_sql(&expr));
        }
        for metric in self.row_metrics_of(&model.name) {
            columns.push(
                &raw_column(&metric.metric.name),
                raw_sql(&raw_expression(metric.metric, SOURCE_ALIAS)),
            );
        }

        let mut query = Query::new()
            .select(columns.items)
            .from(source.with_alias(SOURCE_ALIAS));
        for segment in self.segments.iter().filter(|s| s.model == model.name) {
            query = query.filter(predicate(&segment.sql));
        }
        Ok(query)
    }

    /// FROM `{base}_cte` joined along `path`, with dimension filters
    /// applied. Rows of the base model are deduplicated first when the
    /// tree would multiply them.
    fn joined_source(&self, base: &str, path: &JoinPath) -> SemanticResult<JoinedSource> {
        let restricted = self.restricted_models();
        let mut query = Query::new().from(TableRef::new(&model_cte(base)));
        for step in &path.steps {
            let on = table_col(&model_cte(&step.from_model), &step.from_key)
                .eq(table_col(&model_cte(&step.to_model), &step.to_key));
            let join_type = if restricted.contains(step.to_model.as_str()) {
                JoinType::Inner
            } else {
                JoinType::Left
            };
            query = query.join(join_type, TableRef::new(&model_cte(&step.to_model)), on);
        }

        let mut models = vec![base.to_string()];
        for step in &path.steps {
            if !models.contains(&step.to_model) {
                models.push(step.to_model.clone());
            }
        }
        let relations: HashMap<String, String> =
            models.iter().map(|m| (m.clone(), model_cte(m))).collect();

        for filter in self.dimension_filters() {
            let condition = self.render_filter(filter, None, &|d: &ResolvedDimension<'_>| {
                Ok(table_col(&model_cte(&d.model.name), &d.alias()))
            })?;
            query = query.filter(condition);
        }

        let fans_out =
            !self.ungrouped && path.causes_fanout() && self.row_metrics_of(base).next().is_some();
        if !fans_out {
            return Ok(JoinedSource { query, relations });
        }

        let base_model = self.graph.get_model(base)?;
        let base_cte = model_cte(base);
        let mut columns = Columns::default();
        columns.push(
            &base_model.primary_key,
            table_col(&base_cte, &base_model.primary_key),
        );
        for model in &models {
            for dim in self.cte_dimensions(model) {
                let alias = dim.alias();
                columns.push(&alias, table_col(&model_cte(model), &alias));
            }
        }
        for metric in self.row_metrics_of(base) {
            let raw = raw_column(&metric.metric.name);
            columns.push(&raw, table_col(&base_cte, &raw));
        }

        let mut inner = query.distinct();
        inner.select = columns.items;
        Ok(JoinedSource {
            query: Query::new().from(TableRef::subquery(inner).with_alias(DEDUPED)),
            relations: models
                .into_iter()
                .map(|m| (m, DEDUPED.to_string()))
                .collect(),
        })
    }

    /// Rewrite `model.dimension` and `model.metric` tokens of a filter to
    /// SQL. Metric tokens need `compiler`; without one they stay as written.
    fn render_filter(
        &self,
        filter: &QueryFilter,
        mut compiler: Option<&mut MetricCompiler<'g>>,
        locate: &dyn Fn(&ResolvedDimension<'_>) -> SemanticResult<Expr>,
    ) -> SemanticResult<Expr> {
        let mut compiled: HashMap<String, String> = HashMap::new();
        for reference in formula_references(&filter.sql) {
            if compiled.contains_key(&reference.name) {
                continue;
            }
            let Some((model, _)) = reference.name.split_once('.') else {
                continue;
            };
            if !self.graph.has_model(model) {
                continue;
            }
            if let Ok(dim) = self.graph.resolve_dimension(&reference.name) {
                compiled.insert(reference.name.clone(), locate(&dim)?.to_sql(self.dialect));
            } else if let Some(compiler) = compiler.as_deref_mut() {
                let expr = compiler.compile(&reference.name, None)?;
                compiled.insert(
                    reference.name.clone(),
                    format!("({})", expr.to_sql(self.dialect)),
                );
            }
        }
        let sql = rewrite_references(&filter.sql, |r| compiled.get(&r.name).cloned());
        Ok(predicate(&sql))
    }

    /// Dimension locator for predicates applied after grouping: only
    /// grouped columns exist there.
    fn grouped_dimension(
        &self,
        filter: &QueryFilter,
        dim: &ResolvedDimension<'_>,
        locate: impl Fn(&ResolvedDimension<'_>) -> Expr,
    ) -> SemanticResult<Expr> {
        if self.ungrouped || self.is_requested(dim) {
            return Ok(locate(dim));
        }
        Err(SemanticError::InvalidReference(format!(
            "filter '{}' compares metrics with '{}.{}', which is not a requested dimension",
            filter.sql,
            dim.model.name,
            dim.alias()
        )))
    }

    fn metric_column(
        &self,
        compiler: &mut MetricCompiler<'g>,
        metric: &OutputMetric<'g>,
    ) -> SemanticResult<SelectExpr> {
        if metric.is_window() {
            let input = compiler.window_input(metric.resolved)?;
            return Ok(SelectExpr::new(input).with_alias(&window_input(&metric.alias)));
        }
        let expr = compiler.compile_resolved(metric.resolved)?;
        Ok(SelectExpr::new(expr).with_alias(&metric.alias))
    }

    fn inline_query(&self, base: &str, path: &JoinPath) -> SemanticResult<Query> {
        let source = self.joined_source(base, path)?;
        let scope = if self.ungrouped {
            MetricScope::Rows(source.relations.clone())
        } else {
            MetricScope::Grouped(source.relations.clone())
        };
        let mut compiler = MetricCompiler::new(self.graph, self.dialect, scope);

        let dims: Vec<(String, Expr)> = self
            .dimensions
            .iter()
            .map(|d| (d.alias(), source.dimension(d)))
            .collect();
        let mut query = source.query.clone();
        for (alias, expr) in &dims {
            query = query.column(SelectExpr::new(expr.clone()).with_alias(alias));
        }
        for metric in &self.metrics {
            query = query.column(self.metric_column(&mut compiler, metric)?);
        }
        if !self.ungrouped && !dims.is_empty() && !self.metrics.is_empty() {
            query = query.group_by(dims.into_iter().map(|(_, e)| e).collect());
        } else if !self.ungrouped && self.metrics.is_empty() {
            query = query.distinct();
        }

        for filter in self.metric_filters() {
            let condition = self.render_filter(filter, Some(&mut compiler), &|d: &ResolvedDimension<'_>| {
                self.grouped_dimension(filter, d, |d| source.dimension(d))
            })?;
            query = if self.ungrouped {
                query.filter(condition)
            } else {
                query.having(condition)
            };
        }
        Ok(query)
    }

    fn per_model_query(&self, parts: &[(String, JoinPath)]) -> SemanticResult<Query> {
        let mut query = Query::new();
        let mut aggs: Vec<String> = Vec::new();

        for (model, path) in parts {
            let source = self.joined_source(model, path)?;
            let compiler = MetricCompiler::new(
                self.graph,
                self.dialect,
                MetricScope::Grouped(source.relations.clone()),
            );
            let dims: Vec<(String, Expr)> = self
                .dimensions
                .iter()
                .map(|d| (d.alias(), source.dimension(d)))
                .collect();

            let mut agg = source.query;
            for (alias, expr) in &dims {
                agg = agg.column(SelectExpr::new(expr.clone()).with_alias(alias));
            }
            for metric in self.row_metrics_of(model) {
                let owner = self.graph.get_model(model)?;
                let expr = compiler.aggregate(owner, metric.metric)?;
                agg = agg.column(SelectExpr::new(expr).with_alias(&metric.metric.name));
            }
            if !dims.is_empty() {
                agg = agg.group_by(dims.into_iter().map(|(_, e)| e).collect());
            }

            let name = model_agg(model);
            query = query.with_cte(Cte::new(&name, agg));
            aggs.push(name);
        }

        let merged = |alias: &str| -> Expr {
            coalesce(aggs.iter().map(|a| table_col(a, alias)).collect())
        };

        let join_type = if self.dialect.supports_full_outer_join() {
            JoinType::Full
        } else {
            JoinType::Left
        };
        if let Some(first) = aggs.first() {
            query = query.from(TableRef::new(first));
        }
        for (i, agg) in aggs.iter().enumerate().skip(1) {
            let condition = self.dimensions.iter().fold(None, |acc: Option<Expr>, dim| {
                let alias = dim.alias();
                let prior = if i == 1 {
                    table_col(&aggs[0], &alias)
                } else {
                    coalesce(aggs[..i].iter().map(|a| table_col(a, &alias)).collect())
                };
                let eq = raw_sql(&self.dialect.null_safe_eq(
                    &prior.to_sql(self.dialect),
                    &table_col(agg, &alias).to_sql(self.dialect),
                ));
                Some(match acc {
                    Some(acc) => acc.and(eq),
                    None => eq,
                })
            });
            query = match condition {
                Some(on) => query.join(join_type, TableRef::new(agg), on),
                None => query.cross_join(TableRef::new(agg)),
            };
        }

        for dim in &self.dimensions {
            let alias = dim.alias();
            query = query.column(SelectExpr::new(merged(&alias)).with_alias(&alias));
        }
        let mut compiler = MetricCompiler::new(self.graph, self.dialect, MetricScope::PreAggregated);
        for metric in &self.metrics {
            query = query.column(self.metric_column(&mut compiler, metric)?);
        }
        for filter in self.metric_filters() {
            let condition = self.render_filter(filter, Some(&mut compiler), &|d: &ResolvedDimension<'_>| {
                self.grouped_dimension(filter, d, |d| merged(&d.alias()))
            })?;
            query = query.filter(condition);
        }
        Ok(query)
    }

    /// Time column window metrics order by: the first requested time
    /// dimension, with the grain it is grouped at.
    fn window_time_dimension(&self) -> SemanticResult<(String, Option<Granularity>)> {
        self.dimensions
            .iter()
            .find(|d| d.dimension.is_time())
            .map(|d| (d.alias(), d.granularity.or(d.dimension.granularity)))
            .ok_or_else(|| self.unsupported("window metrics need a time dimension in the query"))
    }

    fn window_query(&self, grouped: Query) -> SemanticResult<Query> {
        let (time_alias, grain) = self.window_time_dimension()?;

        let mut hoisted = Vec::new();
        let grouped = grouped.take_ctes(&mut hoisted);
        let mut query = Query::new();
        for cte in hoisted {
            query = query.with_cte(cte);
        }
        query = query
            .with_cte(Cte::new(BASE, grouped))
            .from(TableRef::new(BASE));

        for dim in &self.dimensions {
            let alias = dim.alias();
            query = query.column(SelectExpr::new(table_col(BASE, &alias)).with_alias(&alias));
        }
        let order = table_col(BASE, &time_alias);
        // Each combination of the other dimensions is its own series.
        let series: Vec<Expr> = self
            .dimensions
            .iter()
            .map(|d| d.alias())
            .filter(|alias| *alias != time_alias)
            .map(|alias| table_col(BASE, &alias))
            .collect();
        for metric in &self.metrics {
            let expr = if metric.is_window() {
                let input = table_col(BASE, &window_input(&metric.alias));
                self.window_expression(metric, input, order.clone(), &series, grain)?
            } else {
                table_col(BASE, &metric.alias)
            };
            query = query.column(SelectExpr::new(expr).with_alias(&metric.alias));
        }
        Ok(query)
    }

    fn window_expression(
        &self,
        output: &OutputMetric<'g>,
        input: Expr,
        order: Expr,
        series: &[Expr],
        grain: Option<Granularity>,
    ) -> SemanticResult<Expr> {
        let metric = output.resolved.metric;
        let expr = match metric.metric_type {
            MetricType::TimeComparison => {
                let comparison = metric.comparison.as_ref().ok_or_else(|| {
                    SemanticError::InvalidTimeComparison(format!(
                        "metric '{}' has no comparison defined",
                        metric.name
                    ))
                })?;
                raw_sql(&generate_time_comparison_sql(
                    comparison,
                    &input.to_sql(self.dialect),
                    &order.to_sql(self.dialect),
                    &series
                        .iter()
                        .map(|e| e.to_sql(self.dialect))
                        .collect::<Vec<_>>(),
                    comparison.lag_offset(grain),
                    self.dialect,
                ))
            }
            _ => self.cumulative_expression(metric, input, order, series)?,
        };
        Ok(fill_nulls(metric, expr))
    }

    fn cumulative_expression(
        &self,
        metric: &Metric,
        input: Expr,
        order: Expr,
        series: &[Expr],
    ) -> SemanticResult<Expr> {
        let running = match metric.agg {
            Some(Aggregation::Min) => min(input),
            Some(Aggregation::Max) => max(input),
            _ => sum(input),
        };
        let mut window = running
            .over()
            .partition_by(series.to_vec())
            .order_by(vec![WindowOrderBy::new(order.clone())]);

        if let Some(grain) = metric.grain_to_date {
            let period = self
                .dialect
                .date_trunc(grain.as_str(), &order.to_sql(self.dialect));
            let mut partitions = series.to_vec();
            partitions.push(raw_sql(&period));
            window = window
                .partition_by(partitions)
                .frame(WindowFrame::rows_to_current());
        } else if let Some(spec) = &metric.window {
            let (amount, unit) = parse_window(spec)?;
            let (amount, unit) = unit.interval_parts(amount);
            let interval = self.dialect.interval_literal(amount, unit).ok_or_else(|| {
                SemanticError::UnsupportedMetric {
                    metric: metric.name.clone(),
                    reason: format!("{} has no interval frames for rolling windows", self.dialect),
                }
            })?;
            window = window.frame(WindowFrame::range_interval(interval));
        } else {
            window = window.frame(WindowFrame::rows_to_current());
        }
        Ok(window.build())
    }
}
