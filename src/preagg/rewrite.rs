//! SQL against a selected rollup table.
//!
//! Rollups store `{measure}_raw` partial aggregates, so the query
//! re-aggregates them: sums and counts are summed, minimums and maximums
//! re-minimized, and averages rebuilt from a sum and a stored count.

use crate::compiler::metrics::{fill_nulls, raw_column};
use crate::semantic::error::{SemanticError, SemanticResult};
use crate::semantic::graph::rewrite_references;
use crate::semantic::model::{Aggregation, Metric, Model, PreAggregation};
use crate::semantic::reference::Granularity;
use crate::sql::dialect::{Dialect, SqlDialect};
use crate::sql::expr::{col, lit_int, max, min, nullif, raw_sql, sum, Expr, ExprExt};
use crate::sql::query::{Query, SelectExpr, TableRef};

use super::{count_measure, RoutingRequest};

/// GROUP BY query answering `request` from `preagg`'s table.
///
/// `table` is the rollup's qualified, quoted name.
pub fn rollup_query(
    model: &Model,
    preagg: &PreAggregation,
    request: &RoutingRequest,
    table: &str,
    dialect: Dialect,
) -> SemanticResult<Query> {
    let mut query = Query::new().from(TableRef::raw_table(table));

    let mut group_by = Vec::new();
    for (name, grain) in &request.dimensions {
        let (alias, expr) = match grain {
            Some(grain) => (
                format!("{}__{}", name, grain),
                time_column(preagg, *grain, dialect)?,
            ),
            None => (name.clone(), col(name)),
        };
        query = query.column(SelectExpr::new(expr.clone()).with_alias(&alias));
        group_by.push(expr);
    }

    for name in &request.metrics {
        let metric = model
            .get_metric(name)
            .ok_or_else(|| SemanticError::MetricNotFound(format!("{}.{}", model.name, name)))?;
        let expr = fill_nulls(metric, reaggregate(model, metric, preagg)?);
        query = query.column(SelectExpr::new(expr).with_alias(name));
    }

    for filter in &request.filters {
        query = query.filter(raw_sql(&rewrite_filter(model, preagg, filter, dialect)));
    }

    if !group_by.is_empty() {
        query = query.group_by(group_by);
    }
    Ok(query)
}

/// The stored time column, truncated again when the query is coarser.
fn time_column(preagg: &PreAggregation, grain: Granularity, dialect: Dialect) -> SemanticResult<Expr> {
    let (Some(column), Some(stored)) = (preagg.time_column(), preagg.granularity) else {
        return Err(SemanticError::InvalidReference(format!(
            "pre-aggregation '{}' has no time column",
            preagg.name
        )));
    };
    if grain == stored {
        return Ok(col(&column));
    }
    Ok(raw_sql(
        &dialect.date_trunc(grain.as_str(), &dialect.quote_identifier(&column)),
    ))
}

fn reaggregate(model: &Model, metric: &Metric, preagg: &PreAggregation) -> SemanticResult<Expr> {
    let stored = col(&raw_column(&metric.name));
    match metric.agg {
        Some(Aggregation::Sum | Aggregation::Count) => Ok(sum(stored)),
        Some(Aggregation::Min) => Ok(min(stored)),
        Some(Aggregation::Max) => Ok(max(stored)),
        Some(Aggregation::Avg) => {
            let count = count_measure(model, metric, preagg).ok_or_else(|| {
                SemanticError::UnsupportedMetric {
                    metric: metric.name.clone(),
                    reason: "the rollup stores no count to average over".to_string(),
                }
            })?;
            Ok(sum(stored).div(nullif(sum(col(&raw_column(count))), lit_int(0))))
        }
        _ => Err(SemanticError::UnsupportedMetric {
            metric: metric.name.clone(),
            reason: "cannot be re-aggregated from a rollup".to_string(),
        }),
    }
}

/// Point `model.column` references at rollup columns.
fn rewrite_filter(model: &Model, preagg: &PreAggregation, filter: &str, dialect: Dialect) -> String {
    rewrite_references(filter, |reference| {
        let (owner, field) = reference.name.split_once('.')?;
        if owner != model.name {
            return None;
        }
        let (name, grain) = match field.split_once("__") {
            Some((name, grain)) => (name, grain.parse::<Granularity>().ok()),
            None => (field, None),
        };
        if preagg.time_dimension.as_deref() == Some(name) {
            let grain = grain.or(preagg.granularity)?;
            return time_column(preagg, grain, dialect)
                .ok()
                .map(|expr| expr.to_sql(dialect));
        }
        Some(dialect.quote_identifier(name))
    })
}
