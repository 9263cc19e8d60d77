//! SemanticGraph - registry of models, graph-level metrics and parameters.
//!
//! Models are kept in insertion order. Relationships between models are
//! mirrored into a petgraph `DiGraph` (the join graph) that is rebuilt by
//! [`SemanticGraph::build_adjacency`] whenever the model set changes.
//!
//! The module is organized into submodules:
//! - `path`: join path and join tree search over the join graph
//! - `dependencies`: metric references inside formulas

mod dependencies;
mod path;

pub use dependencies::{formula_references, rewrite_references, substitute_references, FormulaRef};

use std::collections::{HashMap, HashSet};

use petgraph::graph::{DiGraph, NodeIndex};
use tracing::{debug, info};

use super::error::{SemanticError, SemanticResult};
use super::model::{Dimension, Metric, Model, Relationship, RelationshipType, Segment};
use super::reference::{FieldRef, Granularity};
use crate::params::Parameter;
use crate::validation::{validate_metric, validate_model};

/// Join graph edge: the key columns on each side and the cardinality as
/// seen from the source model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinEdge {
    pub from_key: String,
    pub to_key: String,
    pub relationship: RelationshipType,
}

impl JoinEdge {
    fn reversed(&self) -> Self {
        Self {
            from_key: self.to_key.clone(),
            to_key: self.from_key.clone(),
            relationship: self.relationship.reversed(),
        }
    }
}

/// One hop of a join path: `from_model.from_key = to_model.to_key`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinStep {
    pub from_model: String,
    pub to_model: String,
    pub from_key: String,
    pub to_key: String,
    pub relationship: RelationshipType,
}

impl JoinStep {
    /// Joining along this step can repeat rows of `from_model`.
    pub fn causes_fanout(&self) -> bool {
        self.relationship == RelationshipType::OneToMany
    }
}

/// A sequence of joins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JoinPath {
    pub steps: Vec<JoinStep>,
}

impl JoinPath {
    pub fn new() -> Self {
        Self { steps: vec![] }
    }

    pub fn causes_fanout(&self) -> bool {
        self.steps.iter().any(JoinStep::causes_fanout)
    }

    /// Every model on the path, start first.
    pub fn models(&self) -> Vec<&str> {
        let mut result: Vec<&str> = Vec::new();
        for step in &self.steps {
            if !result.contains(&step.from_model.as_str()) {
                result.push(&step.from_model);
            }
            if !result.contains(&step.to_model.as_str()) {
                result.push(&step.to_model);
            }
        }
        result
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// A metric reference resolved against the graph.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedMetric<'a> {
    /// Owning model; `None` for graph-level metrics.
    pub model: Option<&'a Model>,
    pub metric: &'a Metric,
}

impl ResolvedMetric<'_> {
    /// `model.metric` for model-scoped metrics, the bare name otherwise.
    pub fn canonical_name(&self) -> String {
        match self.model {
            Some(model) => format!("{}.{}", model.name, self.metric.name),
            None => self.metric.name.clone(),
        }
    }

    pub fn model_name(&self) -> Option<&str> {
        self.model.map(|m| m.name.as_str())
    }
}

/// A dimension reference resolved against the graph.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedDimension<'a> {
    pub model: &'a Model,
    pub dimension: &'a Dimension,
    pub granularity: Option<Granularity>,
}

impl ResolvedDimension<'_> {
    /// Output column name: `dimension` or `dimension__grain`.
    pub fn alias(&self) -> String {
        match self.granularity {
            Some(g) => format!("{}__{}", self.dimension.name, g),
            None => self.dimension.name.clone(),
        }
    }
}

/// The semantic graph.
///
/// Mutation happens during loading through `&mut self`; compilation only
/// borrows the graph, so a fully loaded graph can be shared across threads.
#[derive(Debug, Clone, Default)]
pub struct SemanticGraph {
    models: Vec<Model>,
    model_index: HashMap<String, usize>,

    metrics: Vec<Metric>,
    metric_index: HashMap<String, usize>,

    parameters: Vec<Parameter>,
    parameter_index: HashMap<String, usize>,

    /// Relationship graph: one node per model, one edge per join direction.
    join_graph: DiGraph<String, JoinEdge>,

    /// Index: model name -> NodeIndex
    node_indices: HashMap<String, NodeIndex>,
}

impl SemanticGraph {
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Register a model.
    ///
    /// Re-adding an identical definition is a no-op; a different model with
    /// the same name is rejected, as is an invalid model.
    pub fn add_model(&mut self, model: Model) -> SemanticResult<()> {
        if let Some(existing) = self.model_index.get(&model.name) {
            if self.models[*existing] == model {
                return Ok(());
            }
            return Err(SemanticError::Duplicate {
                kind: "Model",
                name: model.name,
            });
        }

        validate_model(&model)?;

        info!(model = %model.name, "registering model");
        self.model_index
            .insert(model.name.clone(), self.models.len());
        self.models.push(model);
        self.build_adjacency();
        Ok(())
    }

    /// Register a graph-level metric after validating it against the graph.
    pub fn add_metric(&mut self, metric: Metric) -> SemanticResult<()> {
        if let Some(existing) = self.metric_index.get(&metric.name) {
            if self.metrics[*existing] == metric {
                return Ok(());
            }
            return Err(SemanticError::Duplicate {
                kind: "Metric",
                name: metric.name,
            });
        }

        validate_metric(self, &metric, None)?;

        info!(metric = %metric.name, "registering metric");
        self.metric_index
            .insert(metric.name.clone(), self.metrics.len());
        self.metrics.push(metric);
        Ok(())
    }

    pub fn add_parameter(&mut self, parameter: Parameter) -> SemanticResult<()> {
        if let Some(existing) = self.parameter_index.get(&parameter.name) {
            if self.parameters[*existing] == parameter {
                return Ok(());
            }
            return Err(SemanticError::Duplicate {
                kind: "Parameter",
                name: parameter.name,
            });
        }

        parameter.validate()?;

        debug!(parameter = %parameter.name, "registering parameter");
        self.parameter_index
            .insert(parameter.name.clone(), self.parameters.len());
        self.parameters.push(parameter);
        Ok(())
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    pub fn get_model(&self, name: &str) -> SemanticResult<&Model> {
        self.model_index
            .get(name)
            .map(|&i| &self.models[i])
            .ok_or_else(|| SemanticError::ModelNotFound(name.to_string()))
    }

    /// Graph-level metric by name.
    pub fn get_metric(&self, name: &str) -> SemanticResult<&Metric> {
        self.metric_index
            .get(name)
            .map(|&i| &self.metrics[i])
            .ok_or_else(|| SemanticError::MetricNotFound(name.to_string()))
    }

    pub fn get_parameter(&self, name: &str) -> SemanticResult<&Parameter> {
        self.parameter_index
            .get(name)
            .map(|&i| &self.parameters[i])
            .ok_or_else(|| SemanticError::ParameterNotFound(name.to_string()))
    }

    pub fn has_model(&self, name: &str) -> bool {
        self.model_index.contains_key(name)
    }

    /// Models in insertion order.
    pub fn models(&self) -> impl Iterator<Item = &Model> {
        self.models.iter()
    }

    /// Graph-level metrics in insertion order.
    pub fn metrics(&self) -> impl Iterator<Item = &Metric> {
        self.metrics.iter()
    }

    pub fn parameters(&self) -> impl Iterator<Item = &Parameter> {
        self.parameters.iter()
    }

    // =========================================================================
    // Reference resolution
    // =========================================================================

    /// Resolve `model.metric` or a bare name.
    ///
    /// Bare names are looked up on `context_model` first, then among the
    /// graph-level metrics. A graph-level metric whose whole body is a
    /// `model.metric` reference resolves to that metric.
    pub fn resolve_metric(
        &self,
        reference: &str,
        context_model: Option<&str>,
    ) -> SemanticResult<ResolvedMetric<'_>> {
        let reference = reference.trim();
        if let Some((model_name, metric_name)) = reference.split_once('.') {
            let model = self.get_model(model_name)?;
            let metric = model
                .get_metric(metric_name)
                .ok_or_else(|| SemanticError::MetricNotFound(reference.to_string()))?;
            return Ok(ResolvedMetric {
                model: Some(model),
                metric,
            });
        }

        if let Some(model) = context_model.and_then(|name| self.get_model(name).ok()) {
            if let Some(metric) = model.get_metric(reference) {
                return Ok(ResolvedMetric {
                    model: Some(model),
                    metric,
                });
            }
        }

        let metric = self.get_metric(reference)?;
        if let Some(target) = self.passthrough_target(metric) {
            return Ok(target);
        }
        Ok(ResolvedMetric {
            model: None,
            metric,
        })
    }

    fn passthrough_target(&self, metric: &Metric) -> Option<ResolvedMetric<'_>> {
        if !metric.is_formula() || !metric.filters.is_empty() || metric.fill_nulls_with.is_some() {
            return None;
        }
        let body = metric.sql.as_deref()?.trim();
        let (model_name, metric_name) = body.split_once('.')?;
        let is_identifier = |s: &str| {
            !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        };
        if !is_identifier(model_name) || !is_identifier(metric_name) {
            return None;
        }
        let model = self.get_model(model_name).ok()?;
        let target = model.get_metric(metric_name)?;
        Some(ResolvedMetric {
            model: Some(model),
            metric: target,
        })
    }

    /// Resolve `model.dimension` or `model.time_dimension__grain`.
    pub fn resolve_dimension(&self, reference: &str) -> SemanticResult<ResolvedDimension<'_>> {
        let field = FieldRef::parse(reference)?;
        let model_name = field.model.as_deref().ok_or_else(|| {
            SemanticError::InvalidReference(format!(
                "dimension '{}' must be of the form model.dimension",
                reference
            ))
        })?;
        let model = self.get_model(model_name)?;
        let dimension =
            model
                .get_dimension(&field.field)
                .ok_or_else(|| SemanticError::DimensionNotFound {
                    model: model_name.to_string(),
                    dimension: field.field.clone(),
                })?;

        if field.granularity.is_some() && !dimension.is_time() {
            return Err(SemanticError::InvalidReference(format!(
                "granularity suffix on non-time dimension '{}'",
                reference
            )));
        }

        Ok(ResolvedDimension {
            model,
            dimension,
            granularity: field.granularity,
        })
    }

    /// Resolve `model.segment`.
    pub fn resolve_segment(&self, reference: &str) -> SemanticResult<(&Model, &Segment)> {
        let (model_name, segment_name) = reference.trim().split_once('.').ok_or_else(|| {
            SemanticError::InvalidReference(format!(
                "segment '{}' must be of the form model.segment",
                reference
            ))
        })?;
        let model = self.get_model(model_name)?;
        let segment = model
            .get_segment(segment_name)
            .ok_or_else(|| SemanticError::SegmentNotFound(reference.to_string()))?;
        Ok((model, segment))
    }

    // =========================================================================
    // Adjacency
    // =========================================================================

    /// Rebuild the join graph from every model's relationships.
    ///
    /// Declared edges are added first, in model order; each then gets a
    /// reciprocal edge unless the target declares that direction itself.
    /// Relationships to models that aren't registered yet are skipped.
    pub fn build_adjacency(&mut self) {
        let mut graph: DiGraph<String, JoinEdge> = DiGraph::new();
        let mut nodes: HashMap<String, NodeIndex> = HashMap::new();
        for model in &self.models {
            nodes.insert(model.name.clone(), graph.add_node(model.name.clone()));
        }

        let mut declared: HashSet<(String, String)> = HashSet::new();
        let mut reciprocals: Vec<(NodeIndex, NodeIndex, String, String, JoinEdge)> = Vec::new();

        for model in &self.models {
            for relationship in &model.relationships {
                let Some(target) = self
                    .model_index
                    .get(&relationship.name)
                    .map(|&i| &self.models[i])
                else {
                    debug!(
                        model = %model.name,
                        target = %relationship.name,
                        "relationship target not registered yet"
                    );
                    continue;
                };
                let (Some(&from), Some(&to)) = (nodes.get(&model.name), nodes.get(&target.name))
                else {
                    continue;
                };

                let edge = declared_edge(model, relationship, target);
                reciprocals.push((to, from, target.name.clone(), model.name.clone(), edge.reversed()));
                declared.insert((model.name.clone(), target.name.clone()));
                graph.add_edge(from, to, edge);
            }
        }

        for (from, to, from_name, to_name, edge) in reciprocals {
            if declared.insert((from_name, to_name)) {
                graph.add_edge(from, to, edge);
            }
        }

        debug!(
            models = graph.node_count(),
            edges = graph.edge_count(),
            "rebuilt join graph"
        );
        self.join_graph = graph;
        self.node_indices = nodes;
    }
}

/// Edge for a relationship as declared on `model`.
fn declared_edge(model: &Model, relationship: &Relationship, target: &Model) -> JoinEdge {
    let foreign_key = relationship.foreign_key_column(&model.name);
    match relationship.relationship_type {
        RelationshipType::ManyToOne => JoinEdge {
            from_key: foreign_key,
            to_key: relationship
                .primary_key
                .clone()
                .unwrap_or_else(|| target.primary_key.clone()),
            relationship: RelationshipType::ManyToOne,
        },
        kind @ (RelationshipType::OneToMany | RelationshipType::OneToOne) => JoinEdge {
            from_key: relationship
                .primary_key
                .clone()
                .unwrap_or_else(|| model.primary_key.clone()),
            to_key: foreign_key,
            relationship: kind,
        },
    }
}
