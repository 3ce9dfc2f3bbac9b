use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::{Path as AxumPath, State};
use axum::http::StatusCode;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use clap::Parser;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;

use crate::editor::{Editor, PointerModifiers, ViewModel};
use crate::graph::{Edge, EdgeId, HttpMethod, Node, NodeId, NodePatch, NodeSeed};
use crate::propagate::execute_fetch;
use crate::snapshot::{AutosaveContext, Snapshot, SnapshotError};
use crate::sync::{HttpSyncProvider, SyncProvider, SyncStatus};

const TICK_INTERVAL_MS: u64 = 16;
const AUTOSAVE_INTERVAL_MS: f64 = 5_000.0;

/// Arguments for running the flowboard editing server
#[derive(Debug, Clone, Parser)]
#[command(
    name = "flowboard serve",
    about = "Start the flowboard board-editing API server."
)]
pub struct ServeArgs {
    /// Path to the board snapshot that should be served and kept saved.
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,

    /// Address to bind the HTTP server to.
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 5171)]
    pub port: u16,
}

struct ServeState {
    editor: RwLock<Editor>,
}

#[derive(Debug, Deserialize)]
struct EdgeRequest {
    source: NodeId,
    target: NodeId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScopeRequest {
    #[serde(default)]
    scope: Option<NodeId>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", tag = "op")]
enum SelectionRequest {
    Click {
        node_id: NodeId,
        #[serde(default)]
        toggle: bool,
        #[serde(default)]
        downstream: bool,
    },
    Expand,
    Shrink,
    Clear,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", tag = "op")]
enum SyncRequest {
    Push { endpoint: String },
    Pull { endpoint: String },
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct AlignRequest {
    #[serde(default)]
    node_ids: Option<Vec<NodeId>>,
}

pub async fn run_serve(args: ServeArgs) -> Result<()> {
    let mut editor = Editor::new()
        .with_autosave(AutosaveContext::new(args.input.clone(), AUTOSAVE_INTERVAL_MS));
    if args.input.exists() {
        let snapshot = Snapshot::load(&args.input)
            .with_context(|| format!("failed to load '{}'", args.input.display()))?;
        editor.apply_snapshot(snapshot);
    }
    let completion_sender = editor.completion_sender();

    let state = Arc::new(ServeState {
        editor: RwLock::new(editor),
    });

    // Frame loop: advance the simulation and hand each dispatched fetch its
    // own task. Completions flow back through the engine mailbox and land at
    // the start of a later tick, against whatever the graph looks like then.
    let tick_state = Arc::clone(&state);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(TICK_INTERVAL_MS));
        loop {
            interval.tick().await;
            let fetches = tick_state.editor.write().await.tick();
            for request in fetches {
                let sender = completion_sender.clone();
                tokio::spawn(async move {
                    let completion = execute_fetch(request).await;
                    let _ = sender.send(completion);
                });
            }
        }
    });

    let app = Router::new()
        .route("/api/board", get(get_board))
        .route("/api/board/snapshot", get(get_snapshot).put(put_snapshot))
        .route("/api/board/nodes", post(post_node))
        .route(
            "/api/board/nodes/:id",
            patch(patch_node).delete(delete_node),
        )
        .route("/api/board/edges", post(post_edge))
        .route("/api/board/edges/:id", axum::routing::delete(delete_edge))
        .route("/api/board/align", post(post_align))
        .route("/api/board/scope", post(post_scope))
        .route("/api/board/selection", post(post_selection))
        .route("/api/board/sync", post(post_sync))
        .with_state(Arc::clone(&state))
        .layer(CorsLayer::permissive());

    let addr = format!("{}:{}", args.host, args.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind HTTP server to {addr}"))?;

    println!("flowboard server listening on http://{addr}");
    println!("Press Ctrl+C to stop.");

    let shutdown_state = Arc::clone(&state);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            shutdown_state.editor.read().await.flush_autosave();
        })
        .await
        .context("HTTP server error")?;

    Ok(())
}

async fn get_board(State(state): State<Arc<ServeState>>) -> Json<ViewModel> {
    Json(state.editor.read().await.view_model())
}

async fn get_snapshot(State(state): State<Arc<ServeState>>) -> Json<Snapshot> {
    Json(state.editor.read().await.snapshot())
}

async fn put_snapshot(
    State(state): State<Arc<ServeState>>,
    body: String,
) -> Result<StatusCode, (StatusCode, String)> {
    let mut editor = state.editor.write().await;
    match editor.import_json(&body) {
        Ok(()) => Ok(StatusCode::NO_CONTENT),
        Err(error @ (SnapshotError::Malformed | SnapshotError::Json(_))) => {
            Err((StatusCode::BAD_REQUEST, error.to_string()))
        }
        Err(error) => Err(internal_error(anyhow::Error::new(error))),
    }
}

async fn post_node(State(state): State<Arc<ServeState>>, Json(seed): Json<NodeSeed>) -> Json<Node> {
    let mut editor = state.editor.write().await;
    Json(editor.add_seed(seed))
}

async fn patch_node(
    State(state): State<Arc<ServeState>>,
    AxumPath(id): AxumPath<String>,
    Json(update): Json<NodePatch>,
) -> Result<StatusCode, (StatusCode, String)> {
    let id = parse_node_id(&id)?;
    let mut editor = state.editor.write().await;
    if editor.graph.update_node(id, update) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err((StatusCode::NOT_FOUND, format!("node '{id}' not found")))
    }
}

async fn delete_node(
    State(state): State<Arc<ServeState>>,
    AxumPath(id): AxumPath<String>,
) -> Result<StatusCode, (StatusCode, String)> {
    let id = parse_node_id(&id)?;
    let mut editor = state.editor.write().await;
    if editor.delete_node(id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err((StatusCode::NOT_FOUND, format!("node '{id}' not found")))
    }
}

/// Self-loops, duplicates, and unknown endpoints are no-ops by the store's
/// contract; the body just reflects whether an edge was created.
async fn post_edge(
    State(state): State<Arc<ServeState>>,
    Json(request): Json<EdgeRequest>,
) -> Json<Option<Edge>> {
    let mut editor = state.editor.write().await;
    Json(editor.graph.add_edge(request.source, request.target))
}

async fn delete_edge(
    State(state): State<Arc<ServeState>>,
    AxumPath(id): AxumPath<String>,
) -> Result<StatusCode, (StatusCode, String)> {
    let id: EdgeId = id
        .parse()
        .map_err(|_| (StatusCode::BAD_REQUEST, format!("invalid edge id '{id}'")))?;
    let mut editor = state.editor.write().await;
    if editor.graph.remove_edge(id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err((StatusCode::NOT_FOUND, format!("edge '{id}' not found")))
    }
}

async fn post_align(
    State(state): State<Arc<ServeState>>,
    Json(request): Json<AlignRequest>,
) -> StatusCode {
    let mut editor = state.editor.write().await;
    match request.node_ids {
        Some(ids) => {
            let targets = ids.into_iter().collect();
            for (id, position) in crate::layout::auto_align(&editor.graph, &targets) {
                editor.graph.update_node(
                    id,
                    NodePatch {
                        position: Some(position),
                        ..NodePatch::default()
                    },
                );
            }
        }
        None => editor.align_selection(),
    }
    StatusCode::NO_CONTENT
}

async fn post_scope(
    State(state): State<Arc<ServeState>>,
    Json(request): Json<ScopeRequest>,
) -> Result<StatusCode, (StatusCode, String)> {
    let mut editor = state.editor.write().await;
    match request.scope {
        Some(id) => {
            if editor.enter_scope(id) {
                Ok(StatusCode::NO_CONTENT)
            } else {
                Err((StatusCode::NOT_FOUND, format!("node '{id}' not found")))
            }
        }
        None => {
            editor.exit_to(None);
            Ok(StatusCode::NO_CONTENT)
        }
    }
}

async fn post_selection(
    State(state): State<Arc<ServeState>>,
    Json(request): Json<SelectionRequest>,
) -> StatusCode {
    let mut editor = state.editor.write().await;
    match request {
        SelectionRequest::Click {
            node_id,
            toggle,
            downstream,
        } => editor.pointer_click_node(
            node_id,
            PointerModifiers {
                ctrl_or_cmd: toggle,
                shift: false,
                alt: downstream,
            },
        ),
        SelectionRequest::Expand => editor.expand_selection(),
        SelectionRequest::Shrink => editor.shrink_selection(),
        SelectionRequest::Clear => editor.selection.clear(),
    }
    StatusCode::NO_CONTENT
}

/// Pushes or pulls the board against a remote endpoint. The editor lock is
/// released for the duration of the transfer, so the board stays editable;
/// the resulting status lands on the next view model.
async fn post_sync(
    State(state): State<Arc<ServeState>>,
    Json(request): Json<SyncRequest>,
) -> Json<SyncStatus> {
    match request {
        SyncRequest::Push { endpoint } => {
            let snapshot = {
                let mut editor = state.editor.write().await;
                editor.begin_sync();
                editor.snapshot()
            };
            let provider = HttpSyncProvider::new(endpoint, HttpMethod::Post);
            let outcome = provider.save(&snapshot).await;
            let mut editor = state.editor.write().await;
            editor.finish_sync(&outcome);
            Json(editor.sync_status())
        }
        SyncRequest::Pull { endpoint } => {
            state.editor.write().await.begin_sync();
            let provider = HttpSyncProvider::new(endpoint, HttpMethod::Get);
            let pulled = provider.load().await;
            let mut editor = state.editor.write().await;
            match pulled {
                Ok(snapshot) => {
                    editor.apply_snapshot(snapshot);
                    editor.finish_sync(&Ok(()));
                }
                Err(error) => editor.finish_sync(&Err(error)),
            }
            Json(editor.sync_status())
        }
    }
}

fn parse_node_id(raw: &str) -> Result<NodeId, (StatusCode, String)> {
    raw.parse()
        .map_err(|_| (StatusCode::BAD_REQUEST, format!("invalid node id '{raw}'")))
}

fn internal_error(err: anyhow::Error) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}
