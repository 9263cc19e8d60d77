//! Pre-aggregation routing.
//!
//! A model may declare materialized rollups: tables holding its measures
//! pre-aggregated by a set of dimensions and, optionally, a time dimension
//! truncated to a grain. For a query against that model the router checks
//! every rollup, scores the ones that can answer it, and picks the best.
//! When nothing matches, the query scans the raw table; that is a normal
//! outcome, not an error.
//!
//! ```text
//! for each rollup (declaration order):
//!     dimension coverage       plain dimensions stored in the rollup
//!     granularity compatibility query grain reachable from the rollup grain
//!     metric coverage          measures present and re-aggregatable
//!     filter compatibility     filter columns stored in the rollup
//!     time-grain alignment     truncated dimensions are the rollup's time dimension
//!     matched = every check passed
//! winner = highest score, earliest declaration on ties
//! ```

mod plan;
pub mod rewrite;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::semantic::graph::formula_references;
use crate::semantic::model::{Aggregation, Metric, Model, PreAggregation};
use crate::semantic::reference::Granularity;

pub use plan::{PreaggCandidate, PreaggCheck, QueryPlan};
pub use rewrite::rollup_query;

/// The parts of a query the router looks at, with model prefixes removed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoutingRequest {
    /// Metric names on the routed model.
    pub metrics: Vec<String>,
    /// Dimension names with their requested grain, if any.
    pub dimensions: Vec<(String, Option<Granularity>)>,
    pub filters: Vec<String>,
    pub segments: Vec<String>,
}

impl RoutingRequest {
    /// Grain the query wants for `preagg`'s time dimension, falling back to
    /// the first truncated dimension.
    pub fn granularity_for(&self, preagg: &PreAggregation) -> Option<Granularity> {
        let on_time_dimension = self.dimensions.iter().find_map(|(name, grain)| {
            match (&preagg.time_dimension, grain) {
                (Some(td), Some(g)) if td == name => Some(*g),
                _ => None,
            }
        });
        on_time_dimension.or_else(|| self.dimensions.iter().find_map(|(_, grain)| *grain))
    }

    fn plain_dimensions(&self) -> impl Iterator<Item = &str> {
        self.dimensions
            .iter()
            .filter(|(_, grain)| grain.is_none())
            .map(|(name, _)| name.as_str())
    }
}

/// Ranks rollups that can answer a query; higher wins.
pub trait PreaggScorer: Send + Sync {
    fn score(&self, preagg: &PreAggregation, request: &RoutingRequest) -> i64;
}

/// Prefers rollups that match the query exactly and carry the least extra
/// data.
///
/// +1000 when the rollup's dimensions are exactly the query's, -10 per
/// extra dimension, +100 for an exact grain, otherwise -5 per level of
/// grain difference.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultScorer;

impl PreaggScorer for DefaultScorer {
    fn score(&self, preagg: &PreAggregation, request: &RoutingRequest) -> i64 {
        let mut score = 0;

        let query_dims: Vec<&str> = request
            .plain_dimensions()
            .filter(|d| preagg.time_dimension.as_deref() != Some(*d))
            .collect();
        let extra = preagg
            .dimensions
            .iter()
            .filter(|d| !query_dims.contains(&d.as_str()))
            .count() as i64;
        let exact = extra == 0 && query_dims.iter().all(|d| preagg.dimensions.iter().any(|p| p == d));
        if exact {
            score += 1000;
        }
        score -= extra * 10;

        if let (Some(query_grain), Some(rollup_grain)) =
            (request.granularity_for(preagg), preagg.granularity)
        {
            if query_grain == rollup_grain {
                score += 100;
            } else {
                let diff = i64::from(query_grain.level()) - i64::from(rollup_grain.level());
                score -= diff.abs() * 5;
            }
        }
        score
    }
}

/// Which rollup, if any, a query reads, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoutingDecision {
    pub candidates: Vec<PreaggCandidate>,
    pub reason: String,
    selected: Option<usize>,
}

impl RoutingDecision {
    /// A decision to scan the raw table without evaluating rollups.
    pub fn raw(reason: impl Into<String>) -> Self {
        Self {
            candidates: Vec::new(),
            reason: reason.into(),
            selected: None,
        }
    }

    /// Position of the selected rollup in the model's declaration order.
    pub fn selected_index(&self) -> Option<usize> {
        self.selected
    }

    pub fn selected(&self) -> Option<&PreaggCandidate> {
        self.selected.and_then(|i| self.candidates.get(i))
    }

    /// Keep the evaluated candidates for reporting but scan the raw table.
    pub fn report_only(mut self, reason: impl Into<String>) -> Self {
        for candidate in &mut self.candidates {
            candidate.selected = false;
        }
        self.selected = None;
        self.reason = reason.into();
        self
    }
}

/// Routes queries against one model to its rollups.
pub struct PreaggRouter<'a> {
    model: &'a Model,
    scorer: &'a dyn PreaggScorer,
}

impl<'a> PreaggRouter<'a> {
    pub fn new(model: &'a Model) -> Self {
        Self {
            model,
            scorer: &DefaultScorer,
        }
    }

    pub fn with_scorer(mut self, scorer: &'a dyn PreaggScorer) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn route(&self, request: &RoutingRequest) -> RoutingDecision {
        if self.model.pre_aggregations.is_empty() {
            return RoutingDecision::raw(format!(
                "model '{}' has no pre-aggregations",
                self.model.name
            ));
        }

        let mut candidates: Vec<PreaggCandidate> = self
            .model
            .pre_aggregations
            .iter()
            .map(|preagg| {
                let checks = self.checks(preagg, request);
                let matched = checks.iter().all(|c| c.passed);
                PreaggCandidate {
                    name: preagg.name.clone(),
                    matched,
                    score: matched.then(|| self.scorer.score(preagg, request)),
                    selected: false,
                    checks,
                }
            })
            .collect();

        let best = candidates
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.score.map(|s| (i, s)))
            .fold(None, |best: Option<(usize, i64)>, (i, score)| match best {
                Some((_, top)) if top >= score => best,
                _ => Some((i, score)),
            });

        let reason = match best {
            Some((index, score)) => {
                candidates[index].selected = true;
                let name = &candidates[index].name;
                info!(model = %self.model.name, preagg = %name, score, "routing to pre-aggregation");
                format!("pre-aggregation '{}' covers the query (score: {})", name, score)
            }
            None => {
                debug!(model = %self.model.name, evaluated = candidates.len(), "no pre-aggregation matched");
                format!("no pre-aggregation matched ({} evaluated)", candidates.len())
            }
        };

        RoutingDecision {
            candidates,
            reason,
            selected: best.map(|(i, _)| i),
        }
    }

    fn checks(&self, preagg: &PreAggregation, request: &RoutingRequest) -> Vec<PreaggCheck> {
        vec![
            dimension_coverage(preagg, request),
            granularity_compatibility(preagg, request),
            self.metric_coverage(preagg, request),
            self.filter_compatibility(preagg, request),
            time_grain_alignment(preagg, request),
        ]
    }

    fn metric_coverage(&self, preagg: &PreAggregation, request: &RoutingRequest) -> PreaggCheck {
        const NAME: &str = "metric coverage";
        for name in &request.metrics {
            let Some(metric) = self.model.get_metric(name) else {
                return PreaggCheck::new(NAME, false, format!("'{}' is not a metric of '{}'", name, self.model.name));
            };
            if !preagg.measures.iter().any(|m| m == name) {
                return PreaggCheck::new(NAME, false, format!("'{}' is not stored in the rollup", name));
            }
            if let Err(detail) = derivable(self.model, metric, preagg) {
                return PreaggCheck::new(NAME, false, detail);
            }
        }
        PreaggCheck::new(
            NAME,
            true,
            format!("all {} metric(s) derivable", request.metrics.len()),
        )
    }

    /// Every `model.field` a filter reads must be a stored dimension, or the
    /// rollup time dimension at a grain the rollup can serve. A raw
    /// timestamp compared against day buckets would widen the range.
    fn filter_compatibility(&self, preagg: &PreAggregation, request: &RoutingRequest) -> PreaggCheck {
        const NAME: &str = "filter compatibility";
        if let Some(segment) = request.segments.first() {
            return PreaggCheck::new(NAME, false, format!("segment '{}' is not stored in rollups", segment));
        }
        if request.filters.is_empty() {
            return PreaggCheck::new(NAME, true, "no filters");
        }

        for filter in &request.filters {
            for token in formula_references(filter) {
                let Some((owner, field)) = token.name.split_once('.') else {
                    continue;
                };
                if let Err(detail) = self.stored_filter_field(preagg, owner, field) {
                    return PreaggCheck::new(NAME, false, detail);
                }
            }
        }
        PreaggCheck::new(NAME, true, "filter columns stored")
    }

    fn stored_filter_field(&self, preagg: &PreAggregation, owner: &str, field: &str) -> Result<(), String> {
        if owner != self.model.name {
            return Err(format!("filter reads '{}.{}' outside '{}'", owner, field, self.model.name));
        }
        if self.model.get_metric(field).is_some() {
            return Err(format!("filter on metric '{}' needs raw rows", field));
        }

        let (name, grain) = match field.split_once("__") {
            Some((name, grain)) => (name, Some(grain)),
            None => (field, None),
        };
        if preagg.time_dimension.as_deref() == Some(name) {
            let Some(grain) = grain else {
                return Err(format!(
                    "filter compares raw '{}'; use '{}__<grain>' to filter the rollup",
                    name, name
                ));
            };
            let servable = match (grain.parse::<Granularity>(), preagg.granularity) {
                (Ok(query), Some(stored)) => stored.can_roll_up_to(query),
                _ => false,
            };
            return if servable {
                Ok(())
            } else {
                Err(format!("filter grain '{}' is finer than the rollup", field))
            };
        }

        match grain {
            None if preagg.dimensions.iter().any(|d| d == name) => Ok(()),
            _ => Err(format!("filter column '{}' is not stored in the rollup", field)),
        }
    }
}

/// Whether `metric` can be re-aggregated from the rollup's stored measures.
fn derivable(model: &Model, metric: &Metric, preagg: &PreAggregation) -> Result<(), String> {
    if !metric.is_aggregate() {
        return Err(format!("'{}' is not a simple aggregation", metric.name));
    }
    match metric.agg {
        Some(Aggregation::Sum | Aggregation::Count | Aggregation::Min | Aggregation::Max) => Ok(()),
        Some(Aggregation::Avg) => count_measure(model, metric, preagg)
            .map(|_| ())
            .ok_or_else(|| format!("'{}' needs a count measure in the rollup", metric.name)),
        Some(agg) => Err(format!(
            "'{}' uses {}, which cannot be re-aggregated",
            metric.name,
            agg.as_str()
        )),
        None => Err(format!("'{}' has no aggregation", metric.name)),
    }
}

/// Count measure an average divides by: `count_{x}` for `avg_{x}`,
/// `{x}_count` for `{x}_avg`, then `count`, then any count measure.
pub fn count_measure<'p>(model: &Model, avg: &Metric, preagg: &'p PreAggregation) -> Option<&'p str> {
    let stored = |name: &str| preagg.measures.iter().find(|m| *m == name).map(String::as_str);

    if let Some(base) = avg.name.strip_prefix("avg_") {
        if let Some(found) = stored(&format!("count_{}", base)) {
            return Some(found);
        }
    }
    if avg.name.contains("_avg") {
        if let Some(found) = stored(&avg.name.replace("_avg", "_count")) {
            return Some(found);
        }
    }
    if let Some(found) = stored("count") {
        return Some(found);
    }
    preagg
        .measures
        .iter()
        .find(|m| {
            model
                .get_metric(m)
                .is_some_and(|metric| metric.agg == Some(Aggregation::Count))
        })
        .map(String::as_str)
}

fn dimension_coverage(preagg: &PreAggregation, request: &RoutingRequest) -> PreaggCheck {
    const NAME: &str = "dimension coverage";
    let missing: Vec<&str> = request
        .plain_dimensions()
        .filter(|d| !preagg.dimensions.iter().any(|p| p == d))
        .collect();
    if missing.is_empty() {
        PreaggCheck::new(NAME, true, "all dimensions stored")
    } else {
        PreaggCheck::new(NAME, false, format!("missing {}", missing.join(", ")))
    }
}

fn granularity_compatibility(preagg: &PreAggregation, request: &RoutingRequest) -> PreaggCheck {
    const NAME: &str = "granularity compatibility";
    let grains: Vec<Granularity> = request.dimensions.iter().filter_map(|(_, g)| *g).collect();
    if grains.is_empty() {
        return PreaggCheck::new(NAME, true, "no time grain requested");
    }
    let Some(stored) = preagg.granularity else {
        return PreaggCheck::new(NAME, false, "rollup has no time grain");
    };
    match grains.iter().find(|g| !stored.can_roll_up_to(**g)) {
        Some(g) => PreaggCheck::new(
            NAME,
            false,
            format!("{} rollup cannot serve {} queries", stored, g),
        ),
        None => PreaggCheck::new(
            NAME,
            true,
            format!("{} rolls up from {}", grains[0], stored),
        ),
    }
}

fn time_grain_alignment(preagg: &PreAggregation, request: &RoutingRequest) -> PreaggCheck {
    const NAME: &str = "time-grain alignment";
    for (name, grain) in &request.dimensions {
        if grain.is_none() {
            continue;
        }
        if preagg.time_dimension.as_deref() != Some(name.as_str()) {
            let detail = match &preagg.time_dimension {
                Some(td) => format!("'{}' is not the rollup time dimension '{}'", name, td),
                None => format!("rollup has no time dimension for '{}'", name),
            };
            return PreaggCheck::new(NAME, false, detail);
        }
    }
    PreaggCheck::new(NAME, true, "time dimensions aligned")
}
