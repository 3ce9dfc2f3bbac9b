//! The application context: one explicitly constructed object owning the
//! graph and every piece of interactive state, ticked by the frame loop and
//! driven by input handlers. Components never capture ambient state; they
//! read the latest committed graph and write through the store's mutation
//! primitives.

use anyhow::Result;
use serde::Serialize;

use crate::breakdown::{BreakdownGate, BreakdownMode, BreakdownRequest, BreakdownResponse};
use crate::connect::{ConnectionResolution, ConnectionState, Port, Viewport};
use crate::graph::{Edge, Graph, Node, NodeId, NodeKind, NodePatch, NodeSeed, Point};
use crate::propagate::{Clock, Engine, FetchCompletion, FetchRequest, SystemClock};
use crate::scope;
use crate::selection::Selection;
use crate::snapshot::{AutosaveContext, Snapshot, SnapshotError};
use crate::sync::SyncStatus;
use crate::traversal;

#[derive(Debug, Clone, Copy, Default)]
pub struct PointerModifiers {
    pub ctrl_or_cmd: bool,
    pub shift: bool,
    pub alt: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreadcrumbItem {
    pub id: NodeId,
    pub label: String,
}

/// Everything the rendering layer needs for one frame, derived from the
/// committed graph state. The renderer never mutates the graph through this.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewModel {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub hidden: Vec<NodeId>,
    pub selection: Vec<NodeId>,
    pub breadcrumb: Vec<BreadcrumbItem>,
    pub viewport: Viewport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<NodeId>,
    pub sync_status: SyncStatus,
}

pub struct Editor {
    pub graph: Graph,
    pub selection: Selection,
    pub viewport: Viewport,
    pub connection: ConnectionState,
    scope: Option<NodeId>,
    engine: Engine,
    clock: Box<dyn Clock>,
    autosave: Option<AutosaveContext>,
    breakdown_gate: BreakdownGate,
    sync_status: SyncStatus,
}

impl Default for Editor {
    fn default() -> Self {
        Self::new()
    }
}

impl Editor {
    pub fn new() -> Self {
        Editor {
            graph: Graph::new(),
            selection: Selection::new(),
            viewport: Viewport::default(),
            connection: ConnectionState::Idle,
            scope: None,
            engine: Engine::new(),
            clock: Box::new(SystemClock),
            autosave: None,
            breakdown_gate: BreakdownGate::default(),
            sync_status: SyncStatus::default(),
        }
    }

    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_autosave(mut self, autosave: AutosaveContext) -> Self {
        self.autosave = Some(autosave);
        self
    }

    pub fn scope(&self) -> Option<NodeId> {
        self.scope
    }

    // ----- scope navigation -----

    pub fn enter_scope(&mut self, node: NodeId) -> bool {
        if !self.graph.contains_node(node) {
            return false;
        }
        self.scope = Some(node);
        self.reset_view();
        true
    }

    /// Breadcrumb navigation; `None` returns to the root.
    pub fn exit_to(&mut self, node: Option<NodeId>) {
        self.scope = match node {
            Some(id) if self.graph.contains_node(id) => Some(id),
            _ => None,
        };
        self.reset_view();
    }

    fn reset_view(&mut self) {
        self.selection.clear();
        self.viewport = Viewport::default();
        self.connection.cancel();
    }

    // ----- store mutations with bookkeeping -----

    /// A node created through the editor lands in the current scope.
    pub fn add_node(&mut self, kind: NodeKind, label: impl Into<String>, position: Point) -> Node {
        self.add_seed(NodeSeed::new(kind, label).at(position))
    }

    /// Full-seed variant: a seed without an explicit parent lands in the
    /// current scope, with every other seed field kept as given.
    pub fn add_seed(&mut self, mut seed: NodeSeed) -> Node {
        if seed.parent_id.is_none() {
            seed.parent_id = self.scope;
        }
        self.graph.add_node(seed)
    }

    pub fn delete_node(&mut self, id: NodeId) -> bool {
        let parent = self.graph.node(id).and_then(|node| node.parent_id);
        if !self.graph.remove_node(id) {
            return false;
        }
        self.selection.retain_existing(&self.graph);
        self.scope = scope::resolve_scope(&self.graph, self.scope, parent);
        true
    }

    pub fn delete_selection(&mut self) {
        let doomed: Vec<NodeId> = self.selection.ids().collect();
        for id in doomed {
            self.delete_node(id);
        }
    }

    pub fn toggle_status(&mut self, id: NodeId) -> bool {
        let Some(status) = self.graph.node(id).map(|node| node.status) else {
            return false;
        };
        self.graph.update_node(
            id,
            NodePatch {
                status: Some(status.toggled()),
                ..NodePatch::default()
            },
        )
    }

    // ----- selection input -----

    pub fn pointer_click_node(&mut self, id: NodeId, modifiers: PointerModifiers) {
        if !self.graph.contains_node(id) {
            return;
        }
        if modifiers.alt {
            self.selection.select_downstream(&self.graph, id);
        } else if modifiers.ctrl_or_cmd || modifiers.shift {
            self.selection.toggle(id);
        } else {
            self.selection.click(id);
        }
    }

    pub fn expand_selection(&mut self) {
        self.selection.expand_frontier(&self.graph);
    }

    pub fn shrink_selection(&mut self) {
        self.selection.shrink_frontier(&self.graph);
    }

    // ----- connection gesture -----

    pub fn pointer_down_on_port(&mut self, node: NodeId, port: Port, screen: Point) -> bool {
        if !self.graph.contains_node(node) {
            return false;
        }
        self.connection
            .pointer_down_on_port(node, port, screen, &self.viewport)
    }

    pub fn pointer_move(&mut self, screen: Point) {
        self.connection.pointer_move(screen, &self.viewport);
    }

    pub fn pointer_up_on_port(&mut self, node: NodeId, port: Port) -> Option<Edge> {
        match self.connection.pointer_up_on_port(node, port) {
            ConnectionResolution::NewEdge { source, target } => self.graph.add_edge(source, target),
            _ => None,
        }
    }

    /// Dropping a source-port drag on empty canvas spawns a task node at the
    /// drop point, already wired to the anchor.
    pub fn pointer_up_on_canvas(&mut self, screen: Point) -> Option<Node> {
        match self.connection.pointer_up_on_canvas(screen, &self.viewport) {
            ConnectionResolution::CreateNodeAt { source, position } => {
                let node = self.add_node(NodeKind::Task, "New task", position);
                self.graph.add_edge(source, node.id);
                Some(node)
            }
            _ => None,
        }
    }

    pub fn cancel_connection(&mut self) {
        self.connection.cancel();
    }

    // ----- layout -----

    /// Auto-aligns the selection, or the whole current scope when nothing is
    /// selected. Only nodes in the computed mapping move.
    pub fn align_selection(&mut self) {
        let targets: std::collections::HashSet<NodeId> = if self.selection.is_empty() {
            traversal::visible_in_scope(&self.graph, self.scope)
                .into_iter()
                .collect()
        } else {
            self.selection.ids().collect()
        };
        for (id, position) in crate::layout::auto_align(&self.graph, &targets) {
            self.graph.update_node(
                id,
                NodePatch {
                    position: Some(position),
                    ..NodePatch::default()
                },
            );
        }
    }

    // ----- simulation -----

    /// Runs one simulation frame and commits its patch. Returns the fetches
    /// the caller must execute; their completions come back through
    /// [`Editor::completion_sender`].
    pub fn tick(&mut self) -> Vec<FetchRequest> {
        let now = self.clock.now_ms();
        let output = self.engine.tick(&self.graph, now);
        if let Some(patch) = output.patch {
            patch.apply(&mut self.graph);
        }
        if let Some(autosave) = &mut self.autosave
            && autosave.is_due(now)
        {
            let snapshot = Snapshot::capture(&self.graph, self.viewport, self.scope);
            if let Err(error) = autosave.maybe_flush(&snapshot, now) {
                tracing::warn!(%error, "autosave failed");
            }
        }
        output.fetches
    }

    pub fn completion_sender(&self) -> std::sync::mpsc::Sender<FetchCompletion> {
        self.engine.completion_sender()
    }

    /// Teardown hook: writes a final snapshot if autosave is configured.
    pub fn flush_autosave(&self) {
        if let Some(autosave) = &self.autosave {
            let snapshot = Snapshot::capture(&self.graph, self.viewport, self.scope);
            if let Err(error) = autosave.flush(&snapshot) {
                tracing::warn!(%error, "final autosave flush failed");
            }
        }
    }

    // ----- persistence -----

    pub fn snapshot(&self) -> Snapshot {
        Snapshot::capture(&self.graph, self.viewport, self.scope)
    }

    pub fn apply_snapshot(&mut self, snapshot: Snapshot) {
        let viewport = snapshot.viewport;
        let scope = snapshot.current_scope_id;
        self.graph = snapshot.into_graph();
        self.viewport = viewport;
        self.scope = match scope {
            Some(id) if self.graph.contains_node(id) => Some(id),
            _ => None,
        };
        self.selection.clear();
        self.connection.cancel();
    }

    /// Imports a serialized snapshot. On any parse failure the current state
    /// is left untouched and the error is returned for the caller to surface
    /// as a blocking message.
    pub fn import_json(&mut self, raw: &str) -> Result<(), SnapshotError> {
        let snapshot = Snapshot::parse(raw)?;
        self.apply_snapshot(snapshot);
        Ok(())
    }

    // ----- remote sync lifecycle -----

    pub fn sync_status(&self) -> SyncStatus {
        self.sync_status
    }

    /// Marks a push or pull as in flight. The editor stays fully editable
    /// while the transfer runs; the status only feeds the rendering layer.
    pub fn begin_sync(&mut self) {
        self.sync_status = SyncStatus::Syncing;
    }

    pub fn finish_sync(&mut self, outcome: &Result<()>) {
        self.sync_status = match outcome {
            Ok(()) => SyncStatus::Success,
            Err(_) => SyncStatus::Error,
        };
    }

    // ----- breakdown collaborator -----

    /// Builds the request for the suggestion service, or `None` when a call
    /// for this node is already outstanding. `finish_breakdown` must be
    /// called once the response (even an empty one) has been handled.
    pub fn begin_breakdown(
        &mut self,
        node: NodeId,
        mode: BreakdownMode,
        language: impl Into<String>,
    ) -> Option<BreakdownRequest> {
        let label = self.graph.node(node)?.label.clone();
        if !self.breakdown_gate.begin(node) {
            return None;
        }
        let context_labels = scope::breadcrumb_path(&self.graph, self.scope)
            .into_iter()
            .filter_map(|id| self.graph.node(id).map(|n| n.label.clone()))
            .collect();
        Some(BreakdownRequest {
            label,
            context_labels,
            language: language.into(),
            mode,
        })
    }

    pub fn finish_breakdown(
        &mut self,
        node: NodeId,
        response: &BreakdownResponse,
        mode: BreakdownMode,
    ) -> Vec<NodeId> {
        self.breakdown_gate.finish(node);
        crate::breakdown::apply_breakdown(&mut self.graph, node, response, mode)
    }

    // ----- derived views -----

    pub fn view_model(&self) -> ViewModel {
        let visible = traversal::visible_in_scope(&self.graph, self.scope);
        let visible_set: std::collections::HashSet<NodeId> = visible.iter().copied().collect();
        let hidden = traversal::hidden_by_collapse(&self.graph);

        let nodes: Vec<Node> = visible
            .iter()
            .filter(|id| !hidden.contains(id))
            .filter_map(|id| self.graph.node(*id))
            .cloned()
            .collect();
        let shown: std::collections::HashSet<NodeId> = nodes.iter().map(|node| node.id).collect();
        let edges: Vec<Edge> = traversal::visible_edges(&self.graph, &visible_set)
            .into_iter()
            .filter(|edge| shown.contains(&edge.source) && shown.contains(&edge.target))
            .cloned()
            .collect();

        let breadcrumb = scope::breadcrumb_path(&self.graph, self.scope)
            .into_iter()
            .filter_map(|id| {
                self.graph.node(id).map(|node| BreadcrumbItem {
                    id,
                    label: node.label.clone(),
                })
            })
            .collect();

        ViewModel {
            nodes,
            edges,
            hidden: hidden.into_iter().collect(),
            selection: self.selection.ids().collect(),
            breadcrumb,
            viewport: self.viewport,
            scope: self.scope,
            sync_status: self.sync_status,
        }
    }
}
