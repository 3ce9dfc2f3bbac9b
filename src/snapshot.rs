//! Flat snapshot persistence: export/import of the whole board plus the
//! timed autosave context.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::connect::Viewport;
use crate::graph::{Edge, Graph, Node, NodeId};

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    /// The payload parsed as JSON but does not carry a `nodes` array. The
    /// importing side must reject it and leave current state untouched.
    #[error("snapshot is missing a 'nodes' array")]
    Malformed,
    #[error("snapshot is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to access snapshot file: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    #[serde(default)]
    pub viewport: Viewport,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_scope_id: Option<NodeId>,
    pub timestamp: DateTime<Utc>,
}

impl Snapshot {
    pub fn capture(graph: &Graph, viewport: Viewport, scope: Option<NodeId>) -> Self {
        Snapshot {
            nodes: graph.nodes_ordered().cloned().collect(),
            edges: graph.edges.clone(),
            viewport,
            current_scope_id: scope,
            timestamp: Utc::now(),
        }
    }

    /// Parses a snapshot, validating the shape before deserializing so a
    /// malformed payload is reported as such rather than as a field error.
    pub fn parse(raw: &str) -> Result<Self, SnapshotError> {
        let value: serde_json::Value = serde_json::from_str(raw)?;
        if !value.get("nodes").map(|nodes| nodes.is_array()).unwrap_or(false) {
            return Err(SnapshotError::Malformed);
        }
        Ok(serde_json::from_value(value)?)
    }

    pub fn to_json(&self) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn load(path: &Path) -> Result<Self, SnapshotError> {
        let raw = fs::read_to_string(path)?;
        Self::parse(&raw)
    }

    pub fn save(&self, path: &Path) -> Result<(), SnapshotError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Rebuilds a graph from the snapshot. Edges referencing missing nodes
    /// and dangling parent links are dropped silently; the referential
    /// invariants hold on the result no matter what the file said.
    pub fn into_graph(self) -> Graph {
        let mut nodes: HashMap<NodeId, Node> = HashMap::new();
        let mut order = Vec::with_capacity(self.nodes.len());
        for node in self.nodes {
            if nodes.contains_key(&node.id) {
                continue;
            }
            order.push(node.id);
            nodes.insert(node.id, node);
        }
        let ids: Vec<NodeId> = order.clone();
        for node in nodes.values_mut() {
            if let Some(parent) = node.parent_id {
                if !ids.contains(&parent) || parent == node.id {
                    node.parent_id = None;
                }
            }
        }
        let edges: Vec<Edge> = self
            .edges
            .into_iter()
            .filter(|edge| {
                edge.source != edge.target
                    && nodes.contains_key(&edge.source)
                    && nodes.contains_key(&edge.target)
            })
            .collect();
        Graph {
            nodes,
            order,
            edges,
        }
    }
}

/// Owns the autosave file and cadence explicitly instead of a module-level
/// timer: built at startup, ticked by the owner, flushed once more at
/// teardown.
#[derive(Debug)]
pub struct AutosaveContext {
    path: PathBuf,
    interval_ms: f64,
    last_flush_ms: Option<f64>,
}

impl AutosaveContext {
    pub fn new(path: PathBuf, interval_ms: f64) -> Self {
        AutosaveContext {
            path,
            interval_ms,
            last_flush_ms: None,
        }
    }

    /// Default location under the user data dir, falling back to the
    /// working directory when the platform offers none.
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("", "", "flowboard")
            .map(|dirs| dirs.data_dir().join("autosave.json"))
            .unwrap_or_else(|| PathBuf::from("flowboard-autosave.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the interval has elapsed since the last flush. Callers use
    /// this to skip building a snapshot on frames that would not write.
    pub fn is_due(&self, now_ms: f64) -> bool {
        match self.last_flush_ms {
            Some(last) => now_ms - last >= self.interval_ms,
            None => true,
        }
    }

    /// Flushes if the interval has elapsed; returns whether a write
    /// happened.
    pub fn maybe_flush(&mut self, snapshot: &Snapshot, now_ms: f64) -> Result<bool, SnapshotError> {
        if !self.is_due(now_ms) {
            return Ok(false);
        }
        self.flush(snapshot)?;
        self.last_flush_ms = Some(now_ms);
        Ok(true)
    }

    pub fn flush(&self, snapshot: &Snapshot) -> Result<(), SnapshotError> {
        snapshot.save(&self.path)?;
        tracing::info!(path = %self.path.display(), "autosave flushed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{NodeKind, NodeSeed};

    fn sample_graph() -> Graph {
        let mut graph = Graph::new();
        let a = graph.add_node(NodeSeed::new(NodeKind::Task, "a")).id;
        let b = graph.add_node(NodeSeed::new(NodeKind::Oscillator, "b")).id;
        graph.add_edge(a, b);
        graph
    }

    #[test]
    fn round_trip_preserves_graph() {
        let graph = sample_graph();
        let snapshot = Snapshot::capture(&graph, Viewport::default(), None);
        let json = snapshot.to_json().unwrap();
        let restored = Snapshot::parse(&json).unwrap().into_graph();
        assert_eq!(restored.nodes.len(), 2);
        assert_eq!(restored.edges.len(), 1);
        assert_eq!(restored.order, graph.order);
    }

    #[test]
    fn parse_rejects_payload_without_nodes_array() {
        assert!(matches!(
            Snapshot::parse(r#"{"foo": 1}"#),
            Err(SnapshotError::Malformed)
        ));
        assert!(matches!(
            Snapshot::parse(r#"{"nodes": 3}"#),
            Err(SnapshotError::Malformed)
        ));
        assert!(matches!(
            Snapshot::parse("not json"),
            Err(SnapshotError::Json(_))
        ));
    }

    #[test]
    fn into_graph_drops_dangling_references() {
        let graph = sample_graph();
        let mut snapshot = Snapshot::capture(&graph, Viewport::default(), None);
        let ghost = NodeId::new();
        snapshot.edges.push(Edge {
            id: crate::graph::EdgeId::new(),
            source: snapshot.nodes[0].id,
            target: ghost,
        });
        snapshot.nodes[1].parent_id = Some(ghost);
        let restored = snapshot.into_graph();
        assert_eq!(restored.edges.len(), 1);
        assert!(
            restored
                .nodes_ordered()
                .all(|node| node.parent_id.is_none())
        );
    }

    #[test]
    fn autosave_respects_interval() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("autosave.json");
        let mut autosave = AutosaveContext::new(path.clone(), 1000.0);
        let snapshot = Snapshot::capture(&sample_graph(), Viewport::default(), None);

        assert!(autosave.is_due(0.0));
        assert!(autosave.maybe_flush(&snapshot, 0.0).unwrap());
        assert!(!autosave.is_due(500.0));
        assert!(!autosave.maybe_flush(&snapshot, 500.0).unwrap());
        assert!(autosave.is_due(1500.0));
        assert!(autosave.maybe_flush(&snapshot, 1500.0).unwrap());
        assert!(Snapshot::load(&path).is_ok());
    }
}
