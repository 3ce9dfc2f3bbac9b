use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(Uuid);

impl NodeId {
    pub fn new() -> Self {
        NodeId(Uuid::new_v4())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for NodeId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(NodeId(Uuid::parse_str(s)?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EdgeId(Uuid);

impl EdgeId {
    pub fn new() -> Self {
        EdgeId(Uuid::new_v4())
    }
}

impl Default for EdgeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EdgeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for EdgeId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(EdgeId(Uuid::parse_str(s)?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Task,
    Oscillator,
    Timer,
    Display,
    Api,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Task => "task",
            NodeKind::Oscillator => "oscillator",
            NodeKind::Timer => "timer",
            NodeKind::Display => "display",
            NodeKind::Api => "api",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Pending,
    Completed,
}

impl NodeStatus {
    pub fn toggled(self) -> Self {
        match self {
            NodeStatus::Pending => NodeStatus::Completed,
            NodeStatus::Completed => NodeStatus::Pending,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }
}

/// Kind-specific settings. One variant per node kind keeps the oscillator
/// frequency away from api urls instead of sharing one open bag; the fetched
/// payload itself stays dynamic in `Node::value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum NodeConfig {
    Task {},
    Oscillator {
        frequency: f64,
    },
    Timer {
        #[serde(rename = "intervalSecs")]
        interval_secs: f64,
    },
    Display {},
    Api {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
        method: HttpMethod,
        #[serde(default, rename = "jsonPath", skip_serializing_if = "Option::is_none")]
        json_path: Option<String>,
        #[serde(default, rename = "isFetching")]
        is_fetching: bool,
        #[serde(default, rename = "lastSignalHigh")]
        last_signal_high: bool,
        #[serde(default, rename = "lastError", skip_serializing_if = "Option::is_none")]
        last_error: Option<String>,
    },
}

impl NodeConfig {
    pub fn default_for(kind: NodeKind) -> Self {
        match kind {
            NodeKind::Task => NodeConfig::Task {},
            NodeKind::Oscillator => NodeConfig::Oscillator { frequency: 1.0 },
            NodeKind::Timer => NodeConfig::Timer { interval_secs: 1.0 },
            NodeKind::Display => NodeConfig::Display {},
            NodeKind::Api => NodeConfig::Api {
                url: None,
                method: HttpMethod::Get,
                json_path: None,
                is_fetching: false,
                last_signal_high: false,
                last_error: None,
            },
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            NodeConfig::Task {} => NodeKind::Task,
            NodeConfig::Oscillator { .. } => NodeKind::Oscillator,
            NodeConfig::Timer { .. } => NodeKind::Timer,
            NodeConfig::Display {} => NodeKind::Display,
            NodeConfig::Api { .. } => NodeKind::Api,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Point { x, y }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: NodeId,
    pub label: String,
    #[serde(default)]
    pub description: String,
    pub status: NodeStatus,
    pub position: Point,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub measured_height: Option<f32>,
    #[serde(default)]
    pub collapsed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<NodeId>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
    pub config: NodeConfig,
}

impl Node {
    pub fn kind(&self) -> NodeKind {
        self.config.kind()
    }

    /// Numeric view of the current value, for signal math. JSON payloads
    /// that are not numbers read as absent.
    pub fn signal(&self) -> Option<f64> {
        self.value.as_ref().and_then(serde_json::Value::as_f64)
    }
}

/// Everything a caller may choose at node-creation time; the store fills in
/// the id, timestamp, and kind-default config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSeed {
    pub kind: NodeKind,
    pub label: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub position: Point,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<NodeId>,
}

impl NodeSeed {
    pub fn new(kind: NodeKind, label: impl Into<String>) -> Self {
        NodeSeed {
            kind,
            label: label.into(),
            description: String::new(),
            position: Point::default(),
            parent_id: None,
        }
    }

    pub fn at(mut self, position: Point) -> Self {
        self.position = position;
        self
    }

    pub fn describing(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn inside(mut self, parent: NodeId) -> Self {
        self.parent_id = Some(parent);
        self
    }
}

/// Partial update applied through `Graph::update_node`. Absent fields leave
/// the node untouched; double-`Option` fields can clear an optional value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodePatch {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<NodeStatus>,
    #[serde(default)]
    pub position: Option<Point>,
    #[serde(default, deserialize_with = "double_option")]
    pub measured_height: Option<Option<f32>>,
    #[serde(default)]
    pub collapsed: Option<bool>,
    #[serde(default, deserialize_with = "double_option")]
    pub parent_id: Option<Option<NodeId>>,
    #[serde(default, deserialize_with = "double_option")]
    pub value: Option<Option<serde_json::Value>>,
    #[serde(default)]
    pub config: Option<NodeConfig>,
}

/// Keeps an explicit JSON `null` distinguishable from an absent field: a
/// present value, null included, lands in the outer `Some`.
fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: serde::Deserializer<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
}

/// The canonical node/edge store. Nodes live in a map with a separate
/// insertion order so derived views stay stable across runs; edges are a
/// flat list. All mutations are synchronous and leave no partially applied
/// state observable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Graph {
    pub nodes: HashMap<NodeId, Node>,
    pub order: Vec<NodeId>,
    pub edges: Vec<Edge>,
}

impl Graph {
    pub fn new() -> Self {
        Graph::default()
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    pub fn contains_node(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn edge(&self, id: EdgeId) -> Option<&Edge> {
        self.edges.iter().find(|edge| edge.id == id)
    }

    /// Nodes in insertion order.
    pub fn nodes_ordered(&self) -> impl Iterator<Item = &Node> {
        self.order.iter().filter_map(|id| self.nodes.get(id))
    }

    pub fn add_node(&mut self, seed: NodeSeed) -> Node {
        let node = Node {
            id: NodeId::new(),
            label: seed.label,
            description: seed.description,
            status: NodeStatus::Pending,
            position: seed.position,
            measured_height: None,
            collapsed: false,
            parent_id: seed.parent_id.filter(|parent| self.contains_node(*parent)),
            created_at: Utc::now(),
            value: None,
            config: NodeConfig::default_for(seed.kind),
        };
        self.order.push(node.id);
        self.nodes.insert(node.id, node.clone());
        node
    }

    /// Adds a directed edge. Self-loops, duplicate (source, target) pairs,
    /// and endpoints missing from the store are silent no-ops: callers are
    /// internal and the contract is defensive-by-default.
    pub fn add_edge(&mut self, source: NodeId, target: NodeId) -> Option<Edge> {
        if source == target {
            return None;
        }
        if !self.contains_node(source) || !self.contains_node(target) {
            return None;
        }
        if self
            .edges
            .iter()
            .any(|edge| edge.source == source && edge.target == target)
        {
            return None;
        }
        let edge = Edge {
            id: EdgeId::new(),
            source,
            target,
        };
        self.edges.push(edge.clone());
        Some(edge)
    }

    /// Removes a node and every edge touching it. The edge cascade is
    /// computed before anything is applied so no dangling edge is ever
    /// observable. Containment children are re-parented to the removed
    /// node's parent; `remove_subtree` deletes them instead.
    pub fn remove_node(&mut self, id: NodeId) -> bool {
        let Some(removed) = self.nodes.remove(&id) else {
            return false;
        };
        self.order.retain(|other| *other != id);
        self.edges
            .retain(|edge| edge.source != id && edge.target != id);
        for node in self.nodes.values_mut() {
            if node.parent_id == Some(id) {
                node.parent_id = removed.parent_id;
            }
        }
        true
    }

    /// Removes a node together with its containment descendants and all
    /// edges touching any of them.
    pub fn remove_subtree(&mut self, id: NodeId) -> bool {
        if !self.contains_node(id) {
            return false;
        }
        let mut doomed = vec![id];
        let mut index = 0;
        while index < doomed.len() {
            let current = doomed[index];
            index += 1;
            for node in self.nodes.values() {
                if node.parent_id == Some(current) && !doomed.contains(&node.id) {
                    doomed.push(node.id);
                }
            }
        }
        for victim in &doomed {
            self.nodes.remove(victim);
        }
        self.order.retain(|other| !doomed.contains(other));
        self.edges
            .retain(|edge| !doomed.contains(&edge.source) && !doomed.contains(&edge.target));
        true
    }

    pub fn remove_edge(&mut self, id: EdgeId) -> bool {
        let before = self.edges.len();
        self.edges.retain(|edge| edge.id != id);
        before != self.edges.len()
    }

    pub fn update_node(&mut self, id: NodeId, patch: NodePatch) -> bool {
        // Re-parenting must not introduce a containment cycle; validate
        // against the current forest before we take the mutable borrow.
        let parent_update = match patch.parent_id {
            Some(Some(parent)) => {
                if parent == id || !self.contains_node(parent) || self.is_ancestor(id, parent) {
                    None
                } else {
                    Some(Some(parent))
                }
            }
            other => other,
        };

        let Some(node) = self.nodes.get_mut(&id) else {
            return false;
        };
        if let Some(label) = patch.label {
            node.label = label;
        }
        if let Some(description) = patch.description {
            node.description = description;
        }
        if let Some(status) = patch.status {
            node.status = status;
        }
        if let Some(position) = patch.position {
            node.position = position;
        }
        if let Some(measured_height) = patch.measured_height {
            node.measured_height = measured_height;
        }
        if let Some(collapsed) = patch.collapsed {
            node.collapsed = collapsed;
        }
        if let Some(parent_id) = parent_update {
            node.parent_id = parent_id;
        }
        if let Some(value) = patch.value {
            node.value = value;
        }
        if let Some(config) = patch.config {
            // A node's kind is fixed at creation; a config for another kind
            // is ignored rather than silently changing behavior.
            if config.kind() == node.config.kind() {
                node.config = config;
            }
        }
        true
    }

    /// Whether `ancestor` appears on `node`'s parent chain. Iteration is
    /// bounded by node count so a corrupted cyclic chain cannot hang us.
    pub fn is_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = self.nodes.get(&node).and_then(|n| n.parent_id);
        let mut hops = 0;
        while let Some(parent) = current {
            if parent == ancestor {
                return true;
            }
            hops += 1;
            if hops > self.nodes.len() {
                return false;
            }
            current = self.nodes.get(&parent).and_then(|n| n.parent_id);
        }
        false
    }
}
