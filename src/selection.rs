//! Topology-aware selection set operations.

use std::collections::HashSet;

use crate::graph::{Graph, NodeId};
use crate::traversal;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    nodes: HashSet<NodeId>,
}

impl Selection {
    pub fn new() -> Self {
        Selection::default()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.iter().copied()
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
    }

    /// Plain click: the selection becomes just this node.
    pub fn click(&mut self, id: NodeId) {
        self.nodes.clear();
        self.nodes.insert(id);
    }

    /// Modifier-click: toggle membership.
    pub fn toggle(&mut self, id: NodeId) {
        if !self.nodes.remove(&id) {
            self.nodes.insert(id);
        }
    }

    /// Alt-click: union the node's downstream closure into the selection.
    pub fn select_downstream(&mut self, graph: &Graph, id: NodeId) {
        self.nodes.extend(traversal::downstream(graph, [id]));
    }

    /// Grow gesture: pull in every direct edge-target of a selected node.
    pub fn expand_frontier(&mut self, graph: &Graph) {
        let additions: Vec<NodeId> = graph
            .edges
            .iter()
            .filter(|edge| self.nodes.contains(&edge.source) && !self.nodes.contains(&edge.target))
            .map(|edge| edge.target)
            .collect();
        self.nodes.extend(additions);
    }

    /// Shrink gesture: peel off every selected node whose outgoing edges all
    /// leave the selection. Suppressed entirely if it would clear the whole
    /// selection in one step, so a stray gesture can't wipe it out.
    pub fn shrink_frontier(&mut self, graph: &Graph) {
        let peeled: HashSet<NodeId> = self
            .nodes
            .iter()
            .copied()
            .filter(|id| {
                !graph
                    .edges
                    .iter()
                    .any(|edge| edge.source == *id && self.nodes.contains(&edge.target))
            })
            .collect();
        if peeled.len() == self.nodes.len() {
            return;
        }
        for id in peeled {
            self.nodes.remove(&id);
        }
    }

    /// Deleted nodes must not linger in the selection.
    pub fn retain_existing(&mut self, graph: &Graph) {
        self.nodes.retain(|id| graph.contains_node(*id));
    }
}

impl FromIterator<NodeId> for Selection {
    fn from_iter<T: IntoIterator<Item = NodeId>>(iter: T) -> Self {
        Selection {
            nodes: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{NodeKind, NodeSeed};

    fn chain(n: usize) -> (Graph, Vec<NodeId>) {
        let mut graph = Graph::new();
        let ids: Vec<NodeId> = (0..n)
            .map(|i| {
                graph
                    .add_node(NodeSeed::new(NodeKind::Task, format!("n{i}")))
                    .id
            })
            .collect();
        for pair in ids.windows(2) {
            graph.add_edge(pair[0], pair[1]);
        }
        (graph, ids)
    }

    #[test]
    fn click_replaces_and_toggle_flips() {
        let (_, ids) = chain(3);
        let mut selection = Selection::new();
        selection.click(ids[0]);
        selection.click(ids[1]);
        assert_eq!(selection.len(), 1);
        assert!(selection.contains(ids[1]));

        selection.toggle(ids[0]);
        selection.toggle(ids[1]);
        assert_eq!(selection.len(), 1);
        assert!(selection.contains(ids[0]));
    }

    #[test]
    fn alt_click_unions_downstream() {
        let (graph, ids) = chain(4);
        let mut selection = Selection::new();
        selection.toggle(ids[0]);
        selection.select_downstream(&graph, ids[1]);
        assert_eq!(selection.len(), 4);
    }

    #[test]
    fn expand_adds_direct_targets_only() {
        let (graph, ids) = chain(4);
        let mut selection = Selection::new();
        selection.click(ids[0]);
        selection.expand_frontier(&graph);
        assert!(selection.contains(ids[1]));
        assert!(!selection.contains(ids[2]));
    }

    #[test]
    fn shrink_peels_leaf_edge_of_selection() {
        let (graph, ids) = chain(4);
        let mut selection: Selection = ids[..3].iter().copied().collect();
        selection.shrink_frontier(&graph);
        // n2's only outgoing edge leaves the selection, so it peels off.
        assert_eq!(selection.len(), 2);
        assert!(!selection.contains(ids[2]));
    }

    #[test]
    fn shrink_never_empties_selection() {
        let (graph, ids) = chain(2);
        let mut selection = Selection::new();
        selection.click(ids[1]);
        selection.shrink_frontier(&graph);
        assert_eq!(selection.len(), 1);

        // Two unconnected selected nodes would both peel: suppressed too.
        let mut graph2 = Graph::new();
        let a = graph2.add_node(NodeSeed::new(NodeKind::Task, "a")).id;
        let b = graph2.add_node(NodeSeed::new(NodeKind::Task, "b")).id;
        let mut selection: Selection = [a, b].into_iter().collect();
        selection.shrink_frontier(&graph2);
        assert_eq!(selection.len(), 2);
    }

    #[test]
    fn retain_existing_drops_deleted_nodes() {
        let (mut graph, ids) = chain(2);
        let mut selection: Selection = ids.iter().copied().collect();
        graph.remove_node(ids[0]);
        selection.retain_existing(&graph);
        assert_eq!(selection.len(), 1);
    }
}
