//! Auto-align: layered layout by topological depth, restricted to a target
//! subset of the graph. Rows are centered on the centroid of the targets'
//! previous positions so the redrawn subset stays where the user was
//! looking.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use crate::graph::{Graph, NodeId, Point};
use crate::{LEVEL_SPACING, NODE_SPACING};

/// Computes new positions for every node in `targets`. Only edges with both
/// endpoints in the subset participate. Nodes outside the subset are never
/// part of the returned mapping; an empty subset yields an empty map.
pub fn auto_align(graph: &Graph, targets: &HashSet<NodeId>) -> HashMap<NodeId, Point> {
    let ordered: Vec<NodeId> = graph
        .order
        .iter()
        .copied()
        .filter(|id| targets.contains(id) && graph.contains_node(*id))
        .collect();
    if ordered.is_empty() {
        return HashMap::new();
    }

    let subset: HashSet<NodeId> = ordered.iter().copied().collect();
    let relevant: Vec<(NodeId, NodeId)> = graph
        .edges
        .iter()
        .filter(|edge| subset.contains(&edge.source) && subset.contains(&edge.target))
        .map(|edge| (edge.source, edge.target))
        .collect();

    let depths = assign_depths(&ordered, &relevant);

    let mut layers: BTreeMap<usize, Vec<NodeId>> = BTreeMap::new();
    for id in &ordered {
        let depth = depths.get(id).copied().unwrap_or(0);
        layers.entry(depth).or_default().push(*id);
    }

    // Anchor the whole block on the average of where the targets were.
    let centroid = {
        let (sum_x, sum_y) = ordered
            .iter()
            .filter_map(|id| graph.node(*id))
            .fold((0.0_f32, 0.0_f32), |acc, node| {
                (acc.0 + node.position.x, acc.1 + node.position.y)
            });
        let count = ordered.len() as f32;
        Point::new(sum_x / count, sum_y / count)
    };

    let level_count = layers.len().max(1);
    let total_height = LEVEL_SPACING * ((level_count - 1) as f32);
    let start_y = centroid.y - total_height / 2.0;

    let mut positions = HashMap::new();
    for (row, nodes) in layers.values().enumerate() {
        let y = start_y + row as f32 * LEVEL_SPACING;
        let span = NODE_SPACING * (nodes.len().saturating_sub(1) as f32);
        let start_x = centroid.x - span / 2.0;
        for (column, id) in nodes.iter().enumerate() {
            let x = start_x + column as f32 * NODE_SPACING;
            positions.insert(*id, Point::new(x, y));
        }
    }

    positions
}

/// Depth per node: zero-in-degree roots at 0, every hop adds one, and a node
/// reached along several paths keeps the maximum so it lands below all its
/// dependencies. When the subset has no root at all (everything sits on a
/// cycle) one arbitrary node is promoted to a synthetic root, trading the
/// max-depth guarantee for guaranteed progress.
fn assign_depths(ordered: &[NodeId], edges: &[(NodeId, NodeId)]) -> HashMap<NodeId, usize> {
    let mut indegree: HashMap<NodeId, usize> = ordered.iter().map(|id| (*id, 0)).collect();
    for (_, target) in edges {
        if let Some(count) = indegree.get_mut(target) {
            *count += 1;
        }
    }

    let roots: Vec<NodeId> = ordered
        .iter()
        .copied()
        .filter(|id| indegree.get(id).copied().unwrap_or(0) == 0)
        .collect();

    if roots.is_empty() {
        // Fully cyclic subset: plain visited-guarded BFS from one node.
        let mut depths: HashMap<NodeId, usize> = HashMap::new();
        let mut queue = VecDeque::new();
        depths.insert(ordered[0], 0);
        queue.push_back(ordered[0]);
        while let Some(current) = queue.pop_front() {
            let next_depth = depths[&current] + 1;
            for (source, target) in edges {
                if *source == current && !depths.contains_key(target) {
                    depths.insert(*target, next_depth);
                    queue.push_back(*target);
                }
            }
        }
        for id in ordered {
            depths.entry(*id).or_insert(0);
        }
        return depths;
    }

    let mut depths: HashMap<NodeId, usize> = ordered.iter().map(|id| (*id, 0)).collect();
    let mut queue: VecDeque<NodeId> = roots.into_iter().collect();
    let mut visited: HashSet<NodeId> = HashSet::new();

    while let Some(current) = queue.pop_front() {
        visited.insert(current);
        let level = depths.get(&current).copied().unwrap_or(0);
        for (source, target) in edges {
            if *source != current {
                continue;
            }
            let entry = depths.entry(*target).or_insert(0);
            if *entry < level + 1 {
                *entry = level + 1;
            }
            if let Some(remaining) = indegree.get_mut(target) {
                if *remaining > 0 {
                    *remaining -= 1;
                    if *remaining == 0 {
                        queue.push_back(*target);
                    }
                }
            }
        }
    }

    // Members of cycles hanging off the DAG never reach in-degree zero; seat
    // them one level below their deepest settled predecessor.
    if visited.len() != ordered.len() {
        for id in ordered {
            if visited.contains(id) {
                continue;
            }
            let mut level = 0;
            for (source, target) in edges {
                if target == id {
                    level = level.max(depths.get(source).copied().unwrap_or(0) + 1);
                }
            }
            depths.insert(*id, level);
        }
    }

    depths
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{NodeKind, NodeSeed};

    fn add(graph: &mut Graph, label: &str) -> NodeId {
        graph.add_node(NodeSeed::new(NodeKind::Task, label)).id
    }

    fn depth_of(positions: &HashMap<NodeId, Point>, id: NodeId, start_y: f32) -> usize {
        ((positions[&id].y - start_y) / LEVEL_SPACING).round() as usize
    }

    #[test]
    fn empty_targets_is_noop() {
        let graph = Graph::new();
        assert!(auto_align(&graph, &HashSet::new()).is_empty());
    }

    #[test]
    fn linear_chain_gets_three_rows() {
        let mut graph = Graph::new();
        let a = add(&mut graph, "a");
        let b = add(&mut graph, "b");
        let c = add(&mut graph, "c");
        graph.add_edge(a, b);
        graph.add_edge(b, c);

        let targets = HashSet::from([a, b, c]);
        let positions = auto_align(&graph, &targets);
        assert_eq!(positions.len(), 3);

        let top = positions[&a].y;
        assert_eq!(depth_of(&positions, a, top), 0);
        assert_eq!(depth_of(&positions, b, top), 1);
        assert_eq!(depth_of(&positions, c, top), 2);
        // Single-node rows sit centered over each other.
        assert_eq!(positions[&a].x, positions[&b].x);
        assert_eq!(positions[&b].x, positions[&c].x);
    }

    #[test]
    fn diamond_bottom_takes_longest_path() {
        let mut graph = Graph::new();
        let a = add(&mut graph, "a");
        let b = add(&mut graph, "b");
        let c = add(&mut graph, "c");
        let d = add(&mut graph, "d");
        graph.add_edge(a, b);
        graph.add_edge(a, c);
        graph.add_edge(b, d);
        graph.add_edge(c, d);

        let targets = HashSet::from([a, b, c, d]);
        let positions = auto_align(&graph, &targets);
        let top = positions[&a].y;
        assert_eq!(depth_of(&positions, d, top), 2);
        assert_eq!(depth_of(&positions, b, top), 1);
        assert_eq!(depth_of(&positions, c, top), 1);
    }

    #[test]
    fn depths_are_monotone_along_edges() {
        let mut graph = Graph::new();
        let ids: Vec<NodeId> = (0..5).map(|i| add(&mut graph, &format!("n{i}"))).collect();
        graph.add_edge(ids[0], ids[1]);
        graph.add_edge(ids[0], ids[2]);
        graph.add_edge(ids[1], ids[3]);
        graph.add_edge(ids[2], ids[3]);
        graph.add_edge(ids[3], ids[4]);

        let targets: HashSet<NodeId> = ids.iter().copied().collect();
        let positions = auto_align(&graph, &targets);
        for edge in &graph.edges {
            assert!(
                positions[&edge.target].y >= positions[&edge.source].y + LEVEL_SPACING - 0.5,
                "edge target should sit at least one level below its source"
            );
        }
    }

    #[test]
    fn full_cycle_uses_synthetic_root() {
        let mut graph = Graph::new();
        let a = add(&mut graph, "a");
        let b = add(&mut graph, "b");
        let c = add(&mut graph, "c");
        graph.add_edge(a, b);
        graph.add_edge(b, c);
        graph.add_edge(c, a);

        let targets = HashSet::from([a, b, c]);
        let positions = auto_align(&graph, &targets);
        assert_eq!(positions.len(), 3);
        let mut rows: Vec<i64> = positions.values().map(|p| p.y.round() as i64).collect();
        rows.sort_unstable();
        rows.dedup();
        assert_eq!(rows.len(), 3, "cycle members still spread over rows");
    }

    #[test]
    fn disconnected_island_lands_in_top_row() {
        let mut graph = Graph::new();
        let a = add(&mut graph, "a");
        let b = add(&mut graph, "b");
        let island = add(&mut graph, "island");
        graph.add_edge(a, b);

        let targets = HashSet::from([a, b, island]);
        let positions = auto_align(&graph, &targets);
        assert_eq!(positions[&island].y, positions[&a].y);
    }

    #[test]
    fn untargeted_nodes_are_untouched() {
        let mut graph = Graph::new();
        let a = add(&mut graph, "a");
        let b = add(&mut graph, "b");
        graph.add_edge(a, b);
        let positions = auto_align(&graph, &HashSet::from([a]));
        assert!(positions.contains_key(&a));
        assert!(!positions.contains_key(&b));
    }
}
