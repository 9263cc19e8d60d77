//! Metric references inside formulas.
//!
//! Formulas name other metrics three ways: `${name}`, `model.metric`, or a
//! bare metric name. String literals and quoted identifiers are skipped, and
//! references are matched as whole tokens, so `revenue` never matches inside
//! `net_revenue` or `orders.revenue`.

use std::collections::{HashMap, HashSet};
use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

use super::SemanticGraph;
use crate::semantic::error::SemanticResult;
use crate::semantic::model::{Metric, MetricType};

static REFERENCE_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r#"'(?:[^']|'')*'"#,
        r#"|"(?:[^"]|"")*""#,
        r"|\$\{\s*([A-Za-z_]\w*(?:\.[A-Za-z_]\w*)?)\s*\}",
        r"|\d+(?:\.\d+)?(?:[eE][+-]?\d+)?",
        r"|([A-Za-z_]\w*(?:\.[A-Za-z_]\w*)?)",
    ))
    .unwrap()
});

/// A possible metric reference in a formula.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormulaRef {
    /// Byte range of the whole token, braces included.
    pub range: Range<usize>,
    pub name: String,
    /// Written as `${name}`.
    pub braced: bool,
}

/// Every `${name}` and identifier token in `formula`, in order.
pub fn formula_references(formula: &str) -> Vec<FormulaRef> {
    REFERENCE_TOKEN
        .captures_iter(formula)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            if let Some(name) = caps.get(1) {
                Some(FormulaRef {
                    range: whole.range(),
                    name: name.as_str().to_string(),
                    braced: true,
                })
            } else {
                caps.get(2).map(|name| FormulaRef {
                    range: whole.range(),
                    name: name.as_str().to_string(),
                    braced: false,
                })
            }
        })
        .collect()
}

/// Replace each reference named in `compiled` with its SQL in parentheses.
pub fn substitute_references(formula: &str, compiled: &HashMap<String, String>) -> String {
    rewrite_references(formula, |reference| {
        compiled
            .get(&reference.name)
            .map(|sql| format!("({})", sql))
    })
}

/// Replace every reference for which `replace` returns text; the rest of
/// the formula, literals included, is copied through.
pub fn rewrite_references(
    formula: &str,
    mut replace: impl FnMut(&FormulaRef) -> Option<String>,
) -> String {
    let mut out = String::with_capacity(formula.len());
    let mut last = 0;
    for reference in formula_references(formula) {
        if let Some(text) = replace(&reference) {
            out.push_str(&formula[last..reference.range.start]);
            out.push_str(&text);
            last = reference.range.end;
        }
    }
    out.push_str(&formula[last..]);
    out
}

impl SemanticGraph {
    /// Metric references `metric` depends on, as written, in order of
    /// first appearance.
    ///
    /// Explicit references (`${name}`, ratio operands, comparison bases)
    /// are returned whether or not they resolve so callers can report them.
    /// Bare words and `model.name` tokens count only when they name a
    /// metric, or a model that exists.
    pub fn metric_dependencies(&self, metric: &Metric, context_model: Option<&str>) -> Vec<String> {
        let mut deps: Vec<String> = Vec::new();
        if metric.is_aggregate() {
            return deps;
        }
        let mut push = |name: &str| {
            if !deps.iter().any(|d| d == name) {
                deps.push(name.to_string());
            }
        };

        match metric.metric_type {
            MetricType::Simple | MetricType::Derived => {
                if let Some(formula) = &metric.sql {
                    for reference in formula_references(formula) {
                        if reference.braced
                            || self.is_metric_token(&reference.name, metric, context_model)
                        {
                            push(&reference.name);
                        }
                    }
                }
            }
            MetricType::Ratio => {
                for operand in [&metric.numerator, &metric.denominator].into_iter().flatten() {
                    push(operand.trim());
                }
            }
            MetricType::Cumulative => {
                if let Some(sql) = &metric.sql {
                    if let Some(name) = single_reference(sql) {
                        if self.is_metric_token(&name, metric, context_model) {
                            push(&name);
                        }
                    }
                }
            }
            MetricType::TimeComparison => {
                if let Some(comparison) = &metric.comparison {
                    push(comparison.metric.trim());
                }
            }
            MetricType::Conversion => {}
        }

        deps
    }

    fn is_metric_token(&self, token: &str, metric: &Metric, context_model: Option<&str>) -> bool {
        match token.split_once('.') {
            Some((model, _)) => self.has_model(model),
            None => token == metric.name || self.resolve_metric(token, context_model).is_ok(),
        }
    }

    /// Models whose rows feed a metric, following its dependencies, in
    /// order of first appearance.
    pub fn metric_models(
        &self,
        reference: &str,
        context_model: Option<&str>,
    ) -> SemanticResult<Vec<String>> {
        let mut models = Vec::new();
        let mut seen = HashSet::new();
        self.collect_metric_models(reference, context_model, &mut models, &mut seen)?;
        Ok(models)
    }

    fn collect_metric_models(
        &self,
        reference: &str,
        context_model: Option<&str>,
        models: &mut Vec<String>,
        seen: &mut HashSet<String>,
    ) -> SemanticResult<()> {
        let resolved = self.resolve_metric(reference, context_model)?;
        if !seen.insert(resolved.canonical_name()) {
            return Ok(());
        }

        let deps = self.metric_dependencies(resolved.metric, resolved.model_name());
        if let (true, Some(model)) = (reads_rows(resolved.metric, &deps), resolved.model) {
            if !models.contains(&model.name) {
                models.push(model.name.clone());
            }
        }

        for dep in deps {
            self.collect_metric_models(&dep, resolved.model_name(), models, seen)?;
        }
        Ok(())
    }

    /// Whether `metric` aggregates its model's rows directly rather than
    /// other metrics.
    pub fn reads_rows(&self, metric: &Metric, context_model: Option<&str>) -> bool {
        reads_rows(metric, &self.metric_dependencies(metric, context_model))
    }

    /// Canonical name for a dependency reference, if it resolves.
    pub fn canonical_metric_name(&self, reference: &str, context_model: Option<&str>) -> Option<String> {
        self.resolve_metric(reference, context_model)
            .ok()
            .map(|resolved| resolved.canonical_name())
    }
}

fn reads_rows(metric: &Metric, deps: &[String]) -> bool {
    metric.is_aggregate() || (metric.metric_type == MetricType::Cumulative && deps.is_empty())
}

/// `revenue`, `orders.revenue` or `${revenue}` with nothing else around it.
pub(crate) fn single_reference(sql: &str) -> Option<String> {
    let trimmed = sql.trim();
    let refs = formula_references(trimmed);
    match refs.as_slice() {
        [only] if only.range == (0..trimmed.len()) => Some(only.name.clone()),
        _ => None,
    }
}
