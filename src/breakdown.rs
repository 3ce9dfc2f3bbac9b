//! The task-breakdown collaborator: an opaque service that turns a task
//! label into suggested subtasks plus dependency edges between them. On any
//! failure the service returns an empty suggestion list; callers treat an
//! empty result as "nothing to add" and never see an error path.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::graph::{Graph, NodeId, NodeKind, NodeSeed, Point};
use crate::{LEVEL_SPACING, NODE_SPACING};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BreakdownMode {
    /// Children form a chain below the parent.
    Vertical,
    /// Children fan out side by side below the parent.
    Horizontal,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakdownRequest {
    pub label: String,
    pub context_labels: Vec<String>,
    pub language: String,
    pub mode: BreakdownMode,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestedTask {
    pub label: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestedDependency {
    pub from_index: usize,
    pub to_index: usize,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakdownResponse {
    pub subtasks: Vec<SuggestedTask>,
    #[serde(default)]
    pub dependencies: Vec<SuggestedDependency>,
}

pub trait BreakdownService {
    /// Must uphold the empty-on-failure contract: missing credentials,
    /// network errors, and malformed replies all come back as an empty
    /// `subtasks` list, never as an error.
    fn breakdown(&self, request: BreakdownRequest) -> impl Future<Output = BreakdownResponse> + Send;
}

/// Service used when no collaborator is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullBreakdown;

impl BreakdownService for NullBreakdown {
    async fn breakdown(&self, _request: BreakdownRequest) -> BreakdownResponse {
        BreakdownResponse::default()
    }
}

/// Materializes a suggestion list as children of `parent`: one task node per
/// subtask (contained under the parent), plus edges for the suggested
/// dependencies. Indices out of range are skipped. Returns the created node
/// ids in suggestion order.
pub fn apply_breakdown(
    graph: &mut Graph,
    parent: NodeId,
    response: &BreakdownResponse,
    mode: BreakdownMode,
) -> Vec<NodeId> {
    let Some(origin) = graph.node(parent).map(|node| node.position) else {
        return Vec::new();
    };
    if response.subtasks.is_empty() {
        return Vec::new();
    }

    let mut created = Vec::with_capacity(response.subtasks.len());
    for (index, subtask) in response.subtasks.iter().enumerate() {
        let position = match mode {
            BreakdownMode::Vertical => Point::new(
                origin.x,
                origin.y + LEVEL_SPACING * (index as f32 + 1.0),
            ),
            BreakdownMode::Horizontal => {
                let span = NODE_SPACING * (response.subtasks.len().saturating_sub(1) as f32);
                Point::new(
                    origin.x - span / 2.0 + NODE_SPACING * index as f32,
                    origin.y + LEVEL_SPACING,
                )
            }
        };
        let mut seed = NodeSeed::new(NodeKind::Task, subtask.label.clone())
            .at(position)
            .inside(parent);
        seed.description = subtask.description.clone();
        created.push(graph.add_node(seed).id);
    }

    // Vertical mode implies a chain when the service sent no explicit
    // dependencies.
    if response.dependencies.is_empty() && mode == BreakdownMode::Vertical {
        for pair in created.windows(2) {
            graph.add_edge(pair[0], pair[1]);
        }
    } else {
        for dependency in &response.dependencies {
            let (Some(&from), Some(&to)) = (
                created.get(dependency.from_index),
                created.get(dependency.to_index),
            ) else {
                continue;
            };
            graph.add_edge(from, to);
        }
    }

    created
}

/// One outstanding breakdown call per node: `begin` gates re-entry, `finish`
/// releases the slot whatever the outcome was.
#[derive(Debug, Clone, Default)]
pub struct BreakdownGate {
    in_flight: HashSet<NodeId>,
}

impl BreakdownGate {
    pub fn begin(&mut self, node: NodeId) -> bool {
        self.in_flight.insert(node)
    }

    pub fn finish(&mut self, node: NodeId) {
        self.in_flight.remove(&node);
    }

    pub fn is_processing(&self, node: NodeId) -> bool {
        self.in_flight.contains(&node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(labels: &[&str], deps: &[(usize, usize)]) -> BreakdownResponse {
        BreakdownResponse {
            subtasks: labels
                .iter()
                .map(|label| SuggestedTask {
                    label: label.to_string(),
                    description: String::new(),
                })
                .collect(),
            dependencies: deps
                .iter()
                .map(|(from, to)| SuggestedDependency {
                    from_index: *from,
                    to_index: *to,
                })
                .collect(),
        }
    }

    #[test]
    fn creates_children_under_parent_with_dependencies() {
        let mut graph = Graph::new();
        let parent = graph.add_node(NodeSeed::new(NodeKind::Task, "parent")).id;
        let created = apply_breakdown(
            &mut graph,
            parent,
            &response(&["one", "two", "three"], &[(0, 1), (1, 2), (7, 0)]),
            BreakdownMode::Horizontal,
        );
        assert_eq!(created.len(), 3);
        assert!(
            created
                .iter()
                .all(|id| graph.node(*id).unwrap().parent_id == Some(parent))
        );
        // The out-of-range (7, 0) dependency is skipped.
        assert_eq!(graph.edges.len(), 2);
    }

    #[test]
    fn vertical_mode_chains_when_no_dependencies_given() {
        let mut graph = Graph::new();
        let parent = graph.add_node(NodeSeed::new(NodeKind::Task, "parent")).id;
        let created = apply_breakdown(
            &mut graph,
            parent,
            &response(&["a", "b"], &[]),
            BreakdownMode::Vertical,
        );
        assert_eq!(graph.edges.len(), 1);
        assert_eq!(graph.edges[0].source, created[0]);
        assert_eq!(graph.edges[0].target, created[1]);
    }

    #[test]
    fn missing_parent_and_empty_result_are_noops() {
        let mut graph = Graph::new();
        assert!(
            apply_breakdown(
                &mut graph,
                NodeId::new(),
                &response(&["a"], &[]),
                BreakdownMode::Vertical
            )
            .is_empty()
        );
        let parent = graph.add_node(NodeSeed::new(NodeKind::Task, "parent")).id;
        assert!(
            apply_breakdown(
                &mut graph,
                parent,
                &BreakdownResponse::default(),
                BreakdownMode::Vertical
            )
            .is_empty()
        );
    }

    #[test]
    fn gate_blocks_reentry_until_finished() {
        let mut gate = BreakdownGate::default();
        let node = NodeId::new();
        assert!(!gate.is_processing(node));
        assert!(gate.begin(node));
        assert!(gate.is_processing(node));
        assert!(!gate.begin(node));
        gate.finish(node);
        assert!(!gate.is_processing(node));
        assert!(gate.begin(node));
    }
}
