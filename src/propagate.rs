//! Per-tick signal simulation: producer nodes (oscillators, timers) advance
//! from wall-clock time, values flow along edges to displays and api nodes,
//! and rising-edge signals trigger debounced external fetches.
//!
//! The engine never performs I/O itself. A tick returns the fetches it wants
//! started; the caller runs them and posts each `FetchCompletion` back
//! through the engine's mailbox, where it is consumed at the start of the
//! next tick and applied as a keyed update against whatever the graph looks
//! like *then*. In-flight fetches therefore cannot clobber frame updates.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::Value;

use crate::graph::{Graph, HttpMethod, Node, NodeConfig, NodeId, NodeKind};
use crate::{SIGNAL_THRESHOLD, TIMER_PULSE_MS, VALUE_EPSILON};

/// Delay used to simulate a fetch cycle on api nodes with no URL configured.
pub const SIMULATED_FETCH_DELAY_MS: u64 = 300;

/// Time source for the simulation. Production uses [`SystemClock`]; tests
/// drive ticks with hand-picked timestamps.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> f64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as f64)
            .unwrap_or(0.0)
    }
}

/// A fetch the engine wants started on behalf of an api node.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub node_id: NodeId,
    pub url: Option<String>,
    pub method: HttpMethod,
    pub json_path: Option<String>,
}

/// Outcome of a fetch, posted back into the engine's mailbox. Completions
/// whose node has since been deleted are silently dropped.
#[derive(Debug, Clone)]
pub struct FetchCompletion {
    pub node_id: NodeId,
    pub result: Result<Value, String>,
}

/// Keyed partial update for a single node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeUpdate {
    pub value: Option<Option<Value>>,
    pub config: Option<NodeConfig>,
}

impl NodeUpdate {
    fn is_empty(&self) -> bool {
        self.value.is_none() && self.config.is_none()
    }
}

/// The set of node updates produced by one tick. Applying a patch touches
/// only the nodes it names; everything else keeps its previous state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphPatch {
    pub nodes: HashMap<NodeId, NodeUpdate>,
}

impl GraphPatch {
    pub fn is_empty(&self) -> bool {
        self.nodes.values().all(NodeUpdate::is_empty)
    }

    pub fn apply(self, graph: &mut Graph) {
        for (id, update) in self.nodes {
            let Some(node) = graph.node_mut(id) else {
                continue;
            };
            if let Some(value) = update.value {
                node.value = value;
            }
            if let Some(config) = update.config {
                node.config = config;
            }
        }
    }

    fn node(&mut self, id: NodeId) -> &mut NodeUpdate {
        self.nodes.entry(id).or_default()
    }
}

#[derive(Debug)]
pub struct TickOutput {
    pub patch: Option<GraphPatch>,
    pub fetches: Vec<FetchRequest>,
}

pub struct Engine {
    completions_tx: Sender<FetchCompletion>,
    // Receiver is !Sync; the mutex makes the engine shareable behind a lock
    // without changing the single-consumer discipline.
    completions_rx: Mutex<Receiver<FetchCompletion>>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        let (completions_tx, completions_rx) = mpsc::channel();
        Engine {
            completions_tx,
            completions_rx: Mutex::new(completions_rx),
        }
    }

    /// Sender handed to whatever task executes a [`FetchRequest`].
    pub fn completion_sender(&self) -> Sender<FetchCompletion> {
        self.completions_tx.clone()
    }

    /// Runs one simulation frame against the current graph. Within a frame,
    /// fetch completions land first, then producers advance, then values
    /// propagate across edges, so a source's new value reaches its consumers
    /// in the same frame it changed. Returns `patch: None` when nothing
    /// actually changed.
    ///
    /// When several edges feed one display node, the last edge in list order
    /// wins; that order carries no guarantee and nothing may rely on it.
    pub fn tick(&mut self, graph: &Graph, now_ms: f64) -> TickOutput {
        let mut patch = GraphPatch::default();
        let mut fetches = Vec::new();

        self.drain_completions(graph, &mut patch);

        for node in graph.nodes_ordered() {
            match node.config {
                NodeConfig::Oscillator { frequency } => {
                    let next = (f64::sin(now_ms * 0.001 * frequency) + 1.0) / 2.0;
                    let current = effective_signal(graph, &patch, node.id);
                    let changed = match current {
                        Some(value) => (next - value).abs() > VALUE_EPSILON,
                        None => true,
                    };
                    if changed {
                        patch.node(node.id).value = Some(Some(json_number(next)));
                    }
                }
                NodeConfig::Timer { interval_secs } => {
                    let period = interval_secs * 1000.0;
                    if period <= 0.0 {
                        continue;
                    }
                    let phase = now_ms.rem_euclid(period);
                    let next = if phase < TIMER_PULSE_MS { 1.0 } else { 0.0 };
                    if effective_signal(graph, &patch, node.id) != Some(next) {
                        patch.node(node.id).value = Some(Some(json_number(next)));
                    }
                }
                _ => {}
            }
        }

        for edge in &graph.edges {
            let Some(source_value) = effective_value(graph, &patch, edge.source) else {
                continue;
            };
            let Some(target) = graph.node(edge.target) else {
                continue;
            };
            match target.kind() {
                NodeKind::Display => {
                    if effective_value(graph, &patch, edge.target).as_ref() != Some(&source_value) {
                        patch.node(edge.target).value = Some(Some(source_value));
                    }
                }
                NodeKind::Api => {
                    let signal = source_value.as_f64().unwrap_or(0.0);
                    self.drive_api(target, signal, &mut patch, &mut fetches);
                }
                _ => {}
            }
        }

        let patch = if patch.is_empty() { None } else { Some(patch) };
        TickOutput { patch, fetches }
    }

    /// Rising-edge fetch gating: a low-to-high transition while not already
    /// mid-fetch starts exactly one cycle; a held-high signal never
    /// re-triggers. The observed level is recorded every frame either way.
    fn drive_api(
        &self,
        target: &Node,
        signal: f64,
        patch: &mut GraphPatch,
        fetches: &mut Vec<FetchRequest>,
    ) {
        let current = patch
            .nodes
            .get(&target.id)
            .and_then(|update| update.config.clone())
            .unwrap_or_else(|| target.config.clone());
        let NodeConfig::Api {
            url,
            method,
            json_path,
            is_fetching,
            last_signal_high,
            last_error,
        } = current
        else {
            return;
        };

        let high = signal > SIGNAL_THRESHOLD;
        let mut next_fetching = is_fetching;

        if high && !last_signal_high && !is_fetching {
            next_fetching = true;
            tracing::debug!(node = %target.id, "rising edge; dispatching fetch");
            fetches.push(FetchRequest {
                node_id: target.id,
                url: url.clone(),
                method,
                json_path: json_path.clone(),
            });
        }

        if next_fetching != is_fetching || high != last_signal_high {
            patch.node(target.id).config = Some(NodeConfig::Api {
                url,
                method,
                json_path,
                is_fetching: next_fetching,
                last_signal_high: high,
                last_error,
            });
        }
    }

    fn drain_completions(&mut self, graph: &Graph, patch: &mut GraphPatch) {
        let Ok(receiver) = self.completions_rx.get_mut() else {
            return;
        };
        while let Ok(completion) = receiver.try_recv() {
            let Some(node) = graph.node(completion.node_id) else {
                tracing::debug!(node = %completion.node_id, "dropping completion for deleted node");
                continue;
            };
            let NodeConfig::Api {
                url,
                method,
                json_path,
                last_signal_high,
                ..
            } = node.config.clone()
            else {
                continue;
            };
            let update = patch.node(completion.node_id);
            let error = match completion.result {
                Ok(value) => {
                    update.value = Some(Some(value));
                    None
                }
                Err(message) => {
                    tracing::debug!(node = %completion.node_id, error = %message, "fetch failed");
                    Some(message)
                }
            };
            update.config = Some(NodeConfig::Api {
                url,
                method,
                json_path,
                is_fetching: false,
                last_signal_high,
                last_error: error,
            });
        }
    }
}

/// This frame's view of a node's value: the pending patch wins over the
/// stored value so consumers see producer output from the same tick.
fn effective_value(graph: &Graph, patch: &GraphPatch, id: NodeId) -> Option<Value> {
    if let Some(update) = patch.nodes.get(&id) {
        if let Some(value) = &update.value {
            return value.clone();
        }
    }
    graph.node(id).and_then(|node| node.value.clone())
}

fn effective_signal(graph: &Graph, patch: &GraphPatch, id: NodeId) -> Option<f64> {
    effective_value(graph, patch, id).and_then(|value| value.as_f64())
}

fn json_number(value: f64) -> Value {
    serde_json::Number::from_f64(value)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

/// Walks a dot-separated path (object keys and array indices) into a fetched
/// payload. An empty or missing path returns the payload unchanged; a path
/// that does not resolve yields `None`.
pub fn extract_json_path(value: &Value, path: Option<&str>) -> Option<Value> {
    let Some(path) = path.filter(|p| !p.trim().is_empty()) else {
        return Some(value.clone());
    };
    let mut current = value;
    for segment in path.split('.') {
        let segment = segment.trim();
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current.clone())
}

/// Executes a fetch request to completion. Api nodes with no URL get a
/// simulated cycle: wait a fixed delay, then complete with a placeholder.
#[cfg(feature = "server")]
pub async fn execute_fetch(request: FetchRequest) -> FetchCompletion {
    let result = match &request.url {
        Some(url) => fetch_url(url, request.method, request.json_path.as_deref()).await,
        None => {
            tokio::time::sleep(std::time::Duration::from_millis(SIMULATED_FETCH_DELAY_MS)).await;
            Ok(serde_json::json!({ "simulated": true }))
        }
    };
    FetchCompletion {
        node_id: request.node_id,
        result,
    }
}

#[cfg(feature = "server")]
async fn fetch_url(
    url: &str,
    method: HttpMethod,
    json_path: Option<&str>,
) -> Result<Value, String> {
    let client = reqwest::Client::new();
    let request = match method {
        HttpMethod::Get => client.get(url),
        HttpMethod::Post => client.post(url),
    };
    let response = request.send().await.map_err(|err| err.to_string())?;
    let status = response.status();
    if !status.is_success() {
        return Err(format!("request failed with status {status}"));
    }
    let body: Value = response.json().await.map_err(|err| err.to_string())?;
    extract_json_path(&body, json_path)
        .ok_or_else(|| format!("path '{}' not found in response", json_path.unwrap_or_default()))
}
