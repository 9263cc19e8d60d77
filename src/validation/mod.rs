//! Static validation of models, metrics and query requests.
//!
//! Every check runs and every problem is reported; callers get the whole
//! list in one error rather than the first failure.

mod cycle;

pub use cycle::find_cycle;

use std::collections::HashSet;

use tracing::warn;

use crate::semantic::error::{MetricValidationError, ModelValidationError, QueryValidationError};
use crate::semantic::graph::{formula_references, SemanticGraph};
use crate::semantic::model::{Metric, MetricType, Model};
use crate::semantic::reference::Granularity;
use crate::semantic::request::{parse_order_by, QueryRequest};
use crate::time::parse_window;

// =============================================================================
// Models
// =============================================================================

/// Validate a model definition on its own.
pub fn validate_model(model: &Model) -> Result<(), ModelValidationError> {
    let mut errors = Vec::new();

    validate_source(model, &mut errors);
    validate_dimensions(model, &mut errors);
    validate_model_metrics(model, &mut errors);
    validate_unique_names(model, &mut errors);
    validate_pre_aggregations(model, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        warn!(model = %model.name, errors = errors.len(), "model failed validation");
        Err(ModelValidationError {
            model: model.name.clone(),
            messages: errors,
        })
    }
}

fn validate_source(model: &Model, errors: &mut Vec<String>) {
    if model.primary_key.trim().is_empty() {
        errors.push(format!(
            "Model '{}' must have a primary_key defined",
            model.name
        ));
    }

    match (&model.table, &model.sql) {
        (None, None) => errors.push(format!(
            "Model '{}' must have either 'table' or 'sql' defined",
            model.name
        )),
        (Some(_), Some(_)) => errors.push(format!(
            "Model '{}' cannot define both 'table' and 'sql'",
            model.name
        )),
        _ => {}
    }
}

fn validate_dimensions(model: &Model, errors: &mut Vec<String>) {
    for dim in &model.dimensions {
        if dim.is_time() && dim.granularity.is_none() {
            errors.push(format!(
                "Model '{}': time dimension '{}' should have a granularity defined",
                model.name, dim.name
            ));
        }
    }
}

fn validate_model_metrics(model: &Model, errors: &mut Vec<String>) {
    for metric in &model.metrics {
        if metric.metric_type == MetricType::Simple && metric.agg.is_none() && metric.sql.is_none()
        {
            errors.push(format!(
                "Model '{}': metric '{}' must have 'agg' defined",
                model.name, metric.name
            ));
        }
    }
}

fn validate_unique_names(model: &Model, errors: &mut Vec<String>) {
    let mut check = |kind: &str, names: Vec<&str>| {
        let mut seen = HashSet::new();
        for name in names {
            if !seen.insert(name) {
                errors.push(format!(
                    "Model '{}': duplicate {} name '{}'",
                    model.name, kind, name
                ));
            }
        }
    };

    check(
        "dimension",
        model.dimensions.iter().map(|d| d.name.as_str()).collect(),
    );
    check(
        "metric",
        model.metrics.iter().map(|m| m.name.as_str()).collect(),
    );
    check(
        "segment",
        model.segments.iter().map(|s| s.name.as_str()).collect(),
    );
    check(
        "pre-aggregation",
        model.pre_aggregations.iter().map(|p| p.name.as_str()).collect(),
    );
}

fn validate_pre_aggregations(model: &Model, errors: &mut Vec<String>) {
    for preagg in &model.pre_aggregations {
        for measure in &preagg.measures {
            if model.get_metric(measure).is_none() {
                errors.push(format!(
                    "Model '{}': pre-aggregation '{}' references unknown metric '{}'",
                    model.name, preagg.name, measure
                ));
            }
        }
        for dimension in &preagg.dimensions {
            if model.get_dimension(dimension).is_none() {
                errors.push(format!(
                    "Model '{}': pre-aggregation '{}' references unknown dimension '{}'",
                    model.name, preagg.name, dimension
                ));
            }
        }
        match (&preagg.time_dimension, preagg.granularity) {
            (Some(td), Some(_)) => {
                if !model.get_dimension(td).is_some_and(|d| d.is_time()) {
                    errors.push(format!(
                        "Model '{}': pre-aggregation '{}' time dimension '{}' is not a time dimension",
                        model.name, preagg.name, td
                    ));
                }
            }
            (Some(_), None) | (None, Some(_)) => errors.push(format!(
                "Model '{}': pre-aggregation '{}' needs both 'time_dimension' and 'granularity'",
                model.name, preagg.name
            )),
            (None, None) => {}
        }
    }
}

// =============================================================================
// Metrics
// =============================================================================

fn metric_label(metric: &Metric) -> &'static str {
    match metric.metric_type {
        MetricType::Simple => "Metric",
        MetricType::Ratio => "Ratio metric",
        MetricType::Derived => "Derived metric",
        MetricType::Cumulative => "Cumulative metric",
        MetricType::TimeComparison => "Time comparison metric",
        MetricType::Conversion => "Conversion metric",
    }
}

/// Validate a metric against the graph.
///
/// `context_model` is the model that declares the metric, `None` for
/// graph-level metrics.
pub fn validate_metric(
    graph: &SemanticGraph,
    metric: &Metric,
    context_model: Option<&str>,
) -> Result<(), MetricValidationError> {
    let mut errors = Vec::new();
    let label = metric_label(metric);
    let name = &metric.name;

    match metric.metric_type {
        MetricType::Simple => {
            if metric.agg.is_none() && metric.sql.is_none() {
                errors.push(format!("{} '{}' must have 'agg' defined", label, name));
            }
            if metric.is_aggregate() && context_model.is_none() {
                errors.push(format!(
                    "{} '{}' aggregates rows but is not attached to a model",
                    label, name
                ));
            }
        }
        MetricType::Ratio => {
            if metric.numerator.is_none() {
                errors.push(format!("{} '{}' must have 'numerator' defined", label, name));
            }
            if metric.denominator.is_none() {
                errors.push(format!("{} '{}' must have 'denominator' defined", label, name));
            }
            for (role, operand) in [
                ("numerator", &metric.numerator),
                ("denominator", &metric.denominator),
            ] {
                if let Some(reference) = operand {
                    if reference.trim() != name.as_str()
                        && graph.resolve_metric(reference, context_model).is_err()
                    {
                        errors.push(format!(
                            "{} '{}': {} '{}' not found",
                            label, name, role, reference
                        ));
                    }
                }
            }
        }
        MetricType::Derived => {
            if metric.sql.as_deref().map_or(true, |s| s.trim().is_empty()) {
                errors.push(format!("{} '{}' must have 'sql' defined", label, name));
            }
        }
        MetricType::Cumulative => {
            if metric.sql.is_none() && metric.window_expression.is_none() {
                errors.push(format!(
                    "{} '{}' must have 'sql' or 'window_expression' defined",
                    label, name
                ));
            }
            if let Some(window) = &metric.window {
                if let Err(e) = parse_window(window) {
                    errors.push(format!("{} '{}': {}", label, name, e));
                }
                if metric.grain_to_date.is_some() {
                    errors.push(format!(
                        "{} '{}' cannot combine 'window' and 'grain_to_date'",
                        label, name
                    ));
                }
            }
        }
        MetricType::TimeComparison => match &metric.comparison {
            None => errors.push(format!("{} '{}' must have 'comparison' defined", label, name)),
            Some(comparison) => {
                if let Err(e) = comparison.validate() {
                    errors.push(format!("{} '{}': {}", label, name, e));
                }
                if graph
                    .resolve_metric(&comparison.metric, context_model)
                    .is_err()
                {
                    errors.push(format!(
                        "{} '{}': base metric '{}' not found",
                        label, name, comparison.metric
                    ));
                }
            }
        },
        MetricType::Conversion => {
            if metric.funnel_steps.is_empty() {
                errors.push(format!(
                    "{} '{}' must have at least one funnel step",
                    label, name
                ));
            }
        }
    }

    validate_dependencies(graph, metric, context_model, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        warn!(metric = %metric.name, errors = errors.len(), "metric failed validation");
        Err(MetricValidationError {
            metric: metric.name.clone(),
            messages: errors,
        })
    }
}

fn validate_dependencies(
    graph: &SemanticGraph,
    metric: &Metric,
    context_model: Option<&str>,
    errors: &mut Vec<String>,
) {
    let label = metric_label(metric);
    let own_name = cycle::canonical_name(metric, context_model);
    let deps = graph.metric_dependencies(metric, context_model);

    if deps
        .iter()
        .any(|dep| cycle::dependency_name(graph, dep, context_model) == own_name)
    {
        errors.push(format!(
            "{} '{}' cannot reference itself",
            label, metric.name
        ));
        return;
    }

    // Ratio and comparison operands are reported above with their role.
    if matches!(
        metric.metric_type,
        MetricType::Simple | MetricType::Derived | MetricType::Cumulative
    ) {
        for dep in &deps {
            if graph.resolve_metric(dep, context_model).is_err() {
                errors.push(format!(
                    "{} '{}' references unknown metric '{}'",
                    label, metric.name, dep
                ));
            }
        }
    }

    if let Some(cycle) = find_cycle(graph, metric, context_model) {
        errors.push(format!(
            "{} '{}' has circular dependency: {}",
            label,
            metric.name,
            cycle.join(" -> ")
        ));
    }
}

// =============================================================================
// Queries
// =============================================================================

/// Validate a query request against the graph.
pub fn validate_query(
    graph: &SemanticGraph,
    request: &QueryRequest,
) -> Result<(), QueryValidationError> {
    let mut errors = Vec::new();
    let mut models: Vec<String> = Vec::new();
    let touch = |model: &str, models: &mut Vec<String>| {
        if !models.iter().any(|m| m == model) {
            models.push(model.to_string());
        }
    };

    if request.metrics.is_empty() && request.dimensions.is_empty() {
        errors.push("Query must request at least one metric or dimension".to_string());
    }

    for reference in &request.metrics {
        match graph.resolve_metric(reference, None) {
            Ok(resolved) => {
                if let Err(e) = validate_metric(graph, resolved.metric, resolved.model_name()) {
                    errors.extend(e.messages);
                    continue;
                }
                match graph.metric_models(reference, None) {
                    Ok(found) => found.iter().for_each(|m| touch(m, &mut models)),
                    Err(e) => errors.push(e.to_string()),
                }
                if let Some(model) = resolved.model_name() {
                    touch(model, &mut models);
                }
            }
            Err(_) => errors.push(missing_metric_message(graph, reference)),
        }
    }

    for reference in &request.dimensions {
        match validate_dimension_reference(graph, reference) {
            Ok(model) => touch(&model, &mut models),
            Err(message) => errors.push(message),
        }
    }

    for reference in &request.segments {
        match graph.resolve_segment(reference) {
            Ok((model, _)) => touch(&model.name, &mut models),
            Err(e) => errors.push(e.to_string()),
        }
    }

    for filter in &request.filters {
        for token in formula_references(filter) {
            let Some((model_name, field)) = token.name.split_once('.') else {
                continue;
            };
            let Ok(model) = graph.get_model(model_name) else {
                continue;
            };
            let base = field.split_once("__").map_or(field, |(f, _)| f);
            if model.get_dimension(base).is_none() && model.get_metric(field).is_none() {
                errors.push(format!(
                    "Filter '{}' references '{}', which is not a dimension or metric of model '{}'",
                    filter, token.name, model_name
                ));
                continue;
            }
            touch(model_name, &mut models);
        }
    }

    validate_order_by(request, &mut errors);

    for calc in &request.table_calculations {
        if let Err(e) = calc.validate() {
            errors.push(e.to_string());
        }
    }

    for (i, a) in models.iter().enumerate() {
        for b in &models[i + 1..] {
            if !graph.has_path(a, b) {
                errors.push(format!(
                    "No join path found between models '{}' and '{}'",
                    a, b
                ));
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        warn!(errors = errors.len(), "query failed validation");
        Err(QueryValidationError { messages: errors })
    }
}

fn missing_metric_message(graph: &SemanticGraph, reference: &str) -> String {
    match reference.split_once('.') {
        Some((model, metric)) if graph.has_model(model) => {
            format!("Metric '{}' not found in model '{}'", metric, model)
        }
        Some((model, _)) => format!(
            "Model '{}' not found (referenced in '{}')",
            model, reference
        ),
        None => format!("Metric '{}' not found", reference),
    }
}

/// Checks a dimension reference; returns its model on success.
fn validate_dimension_reference(graph: &SemanticGraph, reference: &str) -> Result<String, String> {
    let (base, grain) = match reference.rsplit_once("__") {
        Some((base, grain)) => (base, Some(grain)),
        None => (reference, None),
    };

    if let Some(grain) = grain {
        if grain.parse::<Granularity>().is_err() {
            return Err(format!(
                "Invalid time granularity '{}' in '{}'. Must be one of: hour, day, week, month, quarter, year",
                grain, reference
            ));
        }
    }

    let Some((model_name, dim_name)) = base.split_once('.') else {
        return Err(format!(
            "Dimension reference '{}' must be in 'model.dimension' format",
            reference
        ));
    };
    let Ok(model) = graph.get_model(model_name) else {
        return Err(format!(
            "Model '{}' not found (referenced in '{}')",
            model_name, reference
        ));
    };
    let Some(dimension) = model.get_dimension(dim_name) else {
        return Err(format!(
            "Dimension '{}' not found in model '{}'",
            dim_name, model_name
        ));
    };
    if grain.is_some() && !dimension.is_time() {
        return Err(format!(
            "Granularity suffix in '{}' requires a time dimension",
            reference
        ));
    }
    Ok(model.name.clone())
}

fn validate_order_by(request: &QueryRequest, errors: &mut Vec<String>) {
    let mut known: HashSet<&str> = HashSet::new();
    for reference in request.metrics.iter().chain(&request.dimensions) {
        known.insert(reference.as_str());
        known.insert(reference.rsplit_once('.').map_or(reference.as_str(), |(_, f)| f));
    }
    for calc in &request.table_calculations {
        known.insert(calc.name.as_str());
    }

    for entry in &request.order_by {
        let (field, _) = parse_order_by(entry);
        if !known.contains(field) {
            errors.push(format!(
                "Order by field '{}' is not among the requested metrics or dimensions",
                field
            ));
        }
    }
}
