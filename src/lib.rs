pub mod breakdown;
pub mod connect;
pub mod editor;
pub mod graph;
pub mod layout;
pub mod propagate;
pub mod scope;
pub mod selection;
#[cfg(feature = "server")]
pub mod serve;
pub mod snapshot;
pub mod sync;
pub mod traversal;

pub use anyhow::{Context, Result, anyhow, bail};
pub use serde::{Deserialize, Serialize};

pub use breakdown::{BreakdownMode, BreakdownRequest, BreakdownResponse, BreakdownService};
pub use connect::{ConnectionResolution, ConnectionState, Port, Viewport};
pub use editor::{Editor, PointerModifiers, ViewModel};
pub use graph::{
    Edge, EdgeId, Graph, HttpMethod, Node, NodeConfig, NodeId, NodeKind, NodePatch, NodeSeed,
    NodeStatus, Point,
};
pub use layout::auto_align;
pub use propagate::{Clock, Engine, FetchCompletion, FetchRequest, GraphPatch, SystemClock};
pub use selection::Selection;
pub use snapshot::{AutosaveContext, Snapshot, SnapshotError};
pub use sync::{HttpSyncProvider, SyncProvider, SyncStatus};

pub const NODE_SPACING: f32 = 160.0;
pub const LEVEL_SPACING: f32 = 140.0;

/// Oscillator updates below this delta are suppressed to avoid churning
/// downstream consumers on imperceptible changes.
pub const VALUE_EPSILON: f64 = 0.01;

/// Width of the high pulse a timer node emits at the start of each period.
pub const TIMER_PULSE_MS: f64 = 200.0;

/// Signal level above which an api node considers its input "high".
pub const SIGNAL_THRESHOLD: f64 = 0.5;
