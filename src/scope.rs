//! Containment-scope helpers: breadcrumb paths along the `parent_id` chain
//! and scope repair after deletions.

use crate::graph::{Graph, NodeId};

/// Ancestor chain from the root down to (and including) `scope`. Walks
/// `parent_id` links with a hop budget of the node count; a longer walk can
/// only mean a corrupted cyclic chain, so we log and return the partial path
/// rather than hang.
pub fn breadcrumb_path(graph: &Graph, scope: Option<NodeId>) -> Vec<NodeId> {
    let mut path = Vec::new();
    let mut current = scope;
    let budget = graph.nodes.len();

    while let Some(id) = current {
        let Some(node) = graph.node(id) else {
            break;
        };
        if path.len() > budget {
            tracing::warn!(%id, "cycle detected in parent chain; truncating breadcrumb");
            break;
        }
        path.push(id);
        current = node.parent_id;
    }

    path.reverse();
    path
}

/// A valid scope for the current graph: the given scope if it still exists,
/// otherwise the nearest surviving ancestor, otherwise root.
pub fn resolve_scope(graph: &Graph, scope: Option<NodeId>, fallback: Option<NodeId>) -> Option<NodeId> {
    match scope {
        Some(id) if graph.contains_node(id) => Some(id),
        Some(_) => match fallback {
            Some(parent) if graph.contains_node(parent) => Some(parent),
            _ => None,
        },
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{NodeKind, NodeSeed};

    #[test]
    fn breadcrumb_runs_root_first() {
        let mut graph = Graph::new();
        let root = graph.add_node(NodeSeed::new(NodeKind::Task, "root")).id;
        let mid = graph
            .add_node(NodeSeed::new(NodeKind::Task, "mid").inside(root))
            .id;
        let leaf = graph
            .add_node(NodeSeed::new(NodeKind::Task, "leaf").inside(mid))
            .id;
        assert_eq!(breadcrumb_path(&graph, Some(leaf)), vec![root, mid, leaf]);
        assert!(breadcrumb_path(&graph, None).is_empty());
    }

    #[test]
    fn breadcrumb_survives_corrupted_cycle() {
        let mut graph = Graph::new();
        let a = graph.add_node(NodeSeed::new(NodeKind::Task, "a")).id;
        let b = graph.add_node(NodeSeed::new(NodeKind::Task, "b")).id;
        // Corrupt the forest directly; update_node would refuse this.
        graph.node_mut(a).unwrap().parent_id = Some(b);
        graph.node_mut(b).unwrap().parent_id = Some(a);
        let path = breadcrumb_path(&graph, Some(a));
        assert!(path.len() <= graph.nodes.len() + 1);
    }

    #[test]
    fn scope_falls_back_to_parent_then_root() {
        let mut graph = Graph::new();
        let root = graph.add_node(NodeSeed::new(NodeKind::Task, "root")).id;
        let inner = graph
            .add_node(NodeSeed::new(NodeKind::Task, "inner").inside(root))
            .id;
        let parent = graph.node(inner).unwrap().parent_id;
        graph.remove_node(inner);
        assert_eq!(resolve_scope(&graph, Some(inner), parent), Some(root));
        graph.remove_node(root);
        assert_eq!(resolve_scope(&graph, Some(inner), parent), None);
    }
}
