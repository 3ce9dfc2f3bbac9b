//! Pure breadth-first utilities over the graph store: downstream closure,
//! collapse-driven hiding, and scope visibility.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::graph::{Edge, Graph, NodeId};

/// Forward adjacency (source -> targets), built once per traversal so the
/// walks stay O(V+E).
pub fn adjacency(graph: &Graph) -> HashMap<NodeId, Vec<NodeId>> {
    let mut map: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
    for edge in &graph.edges {
        map.entry(edge.source).or_default().push(edge.target);
    }
    map
}

/// Reflexive-transitive closure following edges source -> target. The seeds
/// are included in the result; the visited set keeps cyclic graphs from
/// looping.
pub fn downstream<I>(graph: &Graph, seeds: I) -> HashSet<NodeId>
where
    I: IntoIterator<Item = NodeId>,
{
    let adjacency = adjacency(graph);
    let mut visited: HashSet<NodeId> = HashSet::new();
    let mut queue: VecDeque<NodeId> = VecDeque::new();

    for seed in seeds {
        if graph.contains_node(seed) && visited.insert(seed) {
            queue.push_back(seed);
        }
    }

    while let Some(current) = queue.pop_front() {
        if let Some(targets) = adjacency.get(&current) {
            for &target in targets {
                if visited.insert(target) {
                    queue.push_back(target);
                }
            }
        }
    }

    visited
}

/// Nodes hidden because some collapsed node lies upstream of them. The
/// collapsed node itself stays visible; only its strict downstream is
/// hidden. Recomputed from scratch on every graph change.
pub fn hidden_by_collapse(graph: &Graph) -> HashSet<NodeId> {
    let adjacency = adjacency(graph);
    let mut hidden: HashSet<NodeId> = HashSet::new();
    let mut queue: VecDeque<NodeId> = VecDeque::new();

    for node in graph.nodes.values() {
        if node.collapsed {
            if let Some(targets) = adjacency.get(&node.id) {
                for &target in targets {
                    if hidden.insert(target) {
                        queue.push_back(target);
                    }
                }
            }
        }
    }

    while let Some(current) = queue.pop_front() {
        if let Some(targets) = adjacency.get(&current) {
            for &target in targets {
                if hidden.insert(target) {
                    queue.push_back(target);
                }
            }
        }
    }

    hidden
}

/// Nodes visible in a containment scope: direct children of the scope node,
/// or parentless nodes at the root.
pub fn visible_in_scope(graph: &Graph, scope: Option<NodeId>) -> Vec<NodeId> {
    graph
        .nodes_ordered()
        .filter(|node| node.parent_id == scope)
        .map(|node| node.id)
        .collect()
}

/// Edges whose endpoints are both in the visible set.
pub fn visible_edges<'a>(graph: &'a Graph, visible: &HashSet<NodeId>) -> Vec<&'a Edge> {
    graph
        .edges
        .iter()
        .filter(|edge| visible.contains(&edge.source) && visible.contains(&edge.target))
        .collect()
}
