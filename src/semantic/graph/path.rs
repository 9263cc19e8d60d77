//! Path finding over the join graph.

use std::collections::{HashMap, HashSet, VecDeque};

use petgraph::graph::{EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;

use super::{JoinPath, JoinStep, SemanticGraph};
use crate::semantic::error::{SemanticError, SemanticResult};

/// Parent information for path reconstruction.
/// Stores the parent node and the edge used to reach the current node.
struct ParentInfo {
    parent: NodeIndex,
    edge_idx: EdgeIndex,
}

impl SemanticGraph {
    /// Shortest chain of joins from `from` to `to` (BFS).
    ///
    /// Among equally short paths the one using earlier-added edges wins:
    /// models in insertion order, declared relationships before their
    /// reciprocals.
    pub fn find_relationship_path(&self, from: &str, to: &str) -> SemanticResult<JoinPath> {
        let from_idx = self.node_index(from)?;
        let to_idx = self.node_index(to)?;

        if from == to {
            return Ok(JoinPath::new());
        }

        let mut visited: HashSet<NodeIndex> = HashSet::new();
        let mut parents: HashMap<NodeIndex, ParentInfo> = HashMap::new();
        let mut queue: VecDeque<NodeIndex> = VecDeque::new();

        queue.push_back(from_idx);
        visited.insert(from_idx);

        while let Some(current) = queue.pop_front() {
            // petgraph yields outgoing edges newest first
            let mut edges: Vec<_> = self.join_graph.edges(current).collect();
            edges.sort_by_key(|e| e.id());

            for edge_ref in edges {
                let neighbor = edge_ref.target();
                if !visited.insert(neighbor) {
                    continue;
                }

                parents.insert(
                    neighbor,
                    ParentInfo {
                        parent: current,
                        edge_idx: edge_ref.id(),
                    },
                );

                if neighbor == to_idx {
                    return Ok(self.reconstruct_path(from_idx, neighbor, &parents));
                }
                queue.push_back(neighbor);
            }
        }

        Err(SemanticError::NoPath {
            from: from.into(),
            to: to.into(),
        })
    }

    fn node_index(&self, model: &str) -> SemanticResult<NodeIndex> {
        self.node_indices
            .get(model)
            .copied()
            .ok_or_else(|| SemanticError::ModelNotFound(model.to_string()))
    }

    fn reconstruct_path(
        &self,
        from_idx: NodeIndex,
        to_idx: NodeIndex,
        parents: &HashMap<NodeIndex, ParentInfo>,
    ) -> JoinPath {
        let mut steps = Vec::new();
        let mut current = to_idx;

        while current != from_idx {
            let Some(info) = parents.get(&current) else {
                break;
            };
            let edge = &self.join_graph[info.edge_idx];
            steps.push(JoinStep {
                from_model: self.join_graph[info.parent].clone(),
                to_model: self.join_graph[current].clone(),
                from_key: edge.from_key.clone(),
                to_key: edge.to_key.clone(),
                relationship: edge.relationship,
            });
            current = info.parent;
        }

        steps.reverse();
        JoinPath { steps }
    }

    pub fn has_path(&self, from: &str, to: &str) -> bool {
        self.find_relationship_path(from, to).is_ok()
    }

    /// Joins needed to reach every target from `root`.
    ///
    /// The union of the shortest paths, each model joined once, in the
    /// order the models are first reached.
    pub fn find_join_tree(&self, root: &str, targets: &[&str]) -> SemanticResult<JoinPath> {
        let mut steps: Vec<JoinStep> = vec![];
        let mut reached: HashSet<String> = HashSet::new();
        reached.insert(root.to_string());

        for target in targets {
            if reached.contains(*target) {
                continue;
            }
            let path = self.find_relationship_path(root, target)?;
            for step in path.steps {
                if reached.insert(step.to_model.clone()) {
                    steps.push(step);
                }
            }
        }

        Ok(JoinPath { steps })
    }
}
