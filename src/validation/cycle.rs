//! Dependency cycle detection for composite metrics.
//!
//! Three-color depth-first search over metric dependencies. White metrics
//! are unvisited, gray ones are on the current path, black ones are fully
//! explored. Reaching a gray metric closes a cycle, which is reported as
//! the path from that metric back to itself.

use std::collections::HashMap;

use crate::semantic::graph::SemanticGraph;
use crate::semantic::model::Metric;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    Gray,
    Black,
}

struct CycleSearch<'g> {
    graph: &'g SemanticGraph,
    start: &'g Metric,
    start_name: String,
    colors: HashMap<String, Color>,
    path: Vec<String>,
}

/// Canonical name of `metric` when declared on `context_model`.
pub(crate) fn canonical_name(metric: &Metric, context_model: Option<&str>) -> String {
    match context_model {
        Some(model) => format!("{}.{}", model, metric.name),
        None => metric.name.clone(),
    }
}

/// Canonical name of a dependency written inside a metric on `context_model`.
pub(crate) fn dependency_name(
    graph: &SemanticGraph,
    dependency: &str,
    context_model: Option<&str>,
) -> String {
    if let Some(name) = graph.canonical_metric_name(dependency, context_model) {
        return name;
    }
    match context_model {
        Some(model) if !dependency.contains('.') => format!("{}.{}", model, dependency),
        _ => dependency.to_string(),
    }
}

/// First dependency cycle reachable from `metric`, e.g. `["a", "b", "a"]`.
pub fn find_cycle(
    graph: &SemanticGraph,
    metric: &Metric,
    context_model: Option<&str>,
) -> Option<Vec<String>> {
    let start_name = canonical_name(metric, context_model);
    let mut search = CycleSearch {
        graph,
        start: metric,
        start_name: start_name.clone(),
        colors: HashMap::new(),
        path: Vec::new(),
    };
    search.visit(&start_name, metric, context_model.map(str::to_string))
}

impl<'g> CycleSearch<'g> {
    fn visit(
        &mut self,
        name: &str,
        metric: &'g Metric,
        context_model: Option<String>,
    ) -> Option<Vec<String>> {
        self.colors.insert(name.to_string(), Color::Gray);
        self.path.push(name.to_string());

        let graph = self.graph;
        for dependency in graph.metric_dependencies(metric, context_model.as_deref()) {
            let dep_name = dependency_name(graph, &dependency, context_model.as_deref());

            match self.colors.get(&dep_name) {
                Some(Color::Gray) => {
                    let start = self.path.iter().position(|n| *n == dep_name).unwrap_or(0);
                    let mut cycle = self.path[start..].to_vec();
                    cycle.push(dep_name);
                    return Some(cycle);
                }
                Some(Color::Black) => continue,
                None => {}
            }

            let next = if dep_name == self.start_name {
                Some((self.start, context_model.clone()))
            } else {
                graph
                    .resolve_metric(&dependency, context_model.as_deref())
                    .ok()
                    .map(|resolved| (resolved.metric, resolved.model_name().map(str::to_string)))
            };

            // Unknown dependencies are reported separately.
            if let Some((dep_metric, dep_context)) = next {
                if let Some(cycle) = self.visit(&dep_name, dep_metric, dep_context) {
                    return Some(cycle);
                }
            }
        }

        self.path.pop();
        self.colors.insert(name.to_string(), Color::Black);
        None
    }
}
