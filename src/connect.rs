//! The edge-drawing gesture: a pointer grabs a node port, drags a pending
//! connection across the canvas, and releases either on a complementary
//! port (new edge) or on empty canvas (cancel, or spawn a node when the
//! anchor was a source port).

use serde::{Deserialize, Serialize};

use crate::graph::{NodeId, Point};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Port {
    Source,
    Target,
}

/// Pan/zoom transform between screen and world coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Viewport {
    pub offset: Point,
    pub zoom: f32,
}

impl Default for Viewport {
    fn default() -> Self {
        Viewport {
            offset: Point::default(),
            zoom: 1.0,
        }
    }
}

impl Viewport {
    pub fn screen_to_world(&self, screen: Point) -> Point {
        Point::new(
            (screen.x - self.offset.x) / self.zoom,
            (screen.y - self.offset.y) / self.zoom,
        )
    }

    pub fn world_to_screen(&self, world: Point) -> Point {
        Point::new(
            world.x * self.zoom + self.offset.x,
            world.y * self.zoom + self.offset.y,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting {
        anchor_node: NodeId,
        anchor_port: Port,
        pointer_world: Point,
    },
}

/// What a finished gesture resolved to. `NewEdge` is already normalized to
/// run source -> target regardless of which end the user grabbed first.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionResolution {
    None,
    NewEdge { source: NodeId, target: NodeId },
    CreateNodeAt { source: NodeId, position: Point },
}

impl ConnectionState {
    pub fn is_connecting(&self) -> bool {
        matches!(self, ConnectionState::Connecting { .. })
    }

    /// A gesture can only start from `Idle`; at most one is ever active.
    pub fn pointer_down_on_port(
        &mut self,
        node: NodeId,
        port: Port,
        screen: Point,
        viewport: &Viewport,
    ) -> bool {
        if self.is_connecting() {
            return false;
        }
        *self = ConnectionState::Connecting {
            anchor_node: node,
            anchor_port: port,
            pointer_world: viewport.screen_to_world(screen),
        };
        true
    }

    pub fn pointer_move(&mut self, screen: Point, viewport: &Viewport) {
        if let ConnectionState::Connecting { pointer_world, .. } = self {
            *pointer_world = viewport.screen_to_world(screen);
        }
    }

    /// Release over another node's port. Only complementary ports on a
    /// different node produce an edge; everything else is a plain cancel.
    pub fn pointer_up_on_port(&mut self, node: NodeId, port: Port) -> ConnectionResolution {
        let ConnectionState::Connecting {
            anchor_node,
            anchor_port,
            ..
        } = *self
        else {
            return ConnectionResolution::None;
        };
        *self = ConnectionState::Idle;

        if node == anchor_node {
            return ConnectionResolution::None;
        }
        match (anchor_port, port) {
            (Port::Source, Port::Target) => ConnectionResolution::NewEdge {
                source: anchor_node,
                target: node,
            },
            (Port::Target, Port::Source) => ConnectionResolution::NewEdge {
                source: node,
                target: anchor_node,
            },
            _ => ConnectionResolution::None,
        }
    }

    /// Release over empty canvas. A source-port drag spawns a node at the
    /// drop point so the caller can wire an edge to it; a target-port drag
    /// has no sensible upstream to invent, so it just cancels.
    pub fn pointer_up_on_canvas(
        &mut self,
        screen: Point,
        viewport: &Viewport,
    ) -> ConnectionResolution {
        let ConnectionState::Connecting {
            anchor_node,
            anchor_port,
            ..
        } = *self
        else {
            return ConnectionResolution::None;
        };
        *self = ConnectionState::Idle;

        match anchor_port {
            Port::Source => ConnectionResolution::CreateNodeAt {
                source: anchor_node,
                position: viewport.screen_to_world(screen),
            },
            Port::Target => ConnectionResolution::None,
        }
    }

    pub fn cancel(&mut self) {
        *self = ConnectionState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start(port: Port) -> (ConnectionState, NodeId, Viewport) {
        let mut state = ConnectionState::Idle;
        let anchor = NodeId::new();
        let viewport = Viewport::default();
        assert!(state.pointer_down_on_port(anchor, port, Point::new(10.0, 10.0), &viewport));
        (state, anchor, viewport)
    }

    #[test]
    fn edge_is_normalized_in_both_drag_directions() {
        let (mut state, anchor, _) = start(Port::Source);
        let other = NodeId::new();
        assert_eq!(
            state.pointer_up_on_port(other, Port::Target),
            ConnectionResolution::NewEdge {
                source: anchor,
                target: other
            }
        );

        let (mut state, anchor, _) = start(Port::Target);
        let other = NodeId::new();
        assert_eq!(
            state.pointer_up_on_port(other, Port::Source),
            ConnectionResolution::NewEdge {
                source: other,
                target: anchor
            }
        );
    }

    #[test]
    fn matching_ports_and_same_node_cancel() {
        let (mut state, _, _) = start(Port::Source);
        assert_eq!(
            state.pointer_up_on_port(NodeId::new(), Port::Source),
            ConnectionResolution::None
        );

        let (mut state, anchor, _) = start(Port::Source);
        assert_eq!(
            state.pointer_up_on_port(anchor, Port::Target),
            ConnectionResolution::None
        );
        assert_eq!(state, ConnectionState::Idle);
    }

    #[test]
    fn second_gesture_cannot_start_while_active() {
        let (mut state, _, viewport) = start(Port::Source);
        assert!(!state.pointer_down_on_port(
            NodeId::new(),
            Port::Target,
            Point::default(),
            &viewport
        ));
    }

    #[test]
    fn viewport_transforms_invert_each_other() {
        let viewport = Viewport {
            offset: Point::new(100.0, -20.0),
            zoom: 2.0,
        };
        let world = Point::new(35.0, 60.0);
        assert_eq!(viewport.world_to_screen(world), Point::new(170.0, 100.0));
        assert_eq!(viewport.screen_to_world(viewport.world_to_screen(world)), world);
    }

    #[test]
    fn canvas_drop_spawns_node_only_from_source_port() {
        let viewport = Viewport {
            offset: Point::new(100.0, 0.0),
            zoom: 2.0,
        };
        let mut state = ConnectionState::Idle;
        let anchor = NodeId::new();
        state.pointer_down_on_port(anchor, Port::Source, Point::default(), &viewport);
        assert_eq!(
            state.pointer_up_on_canvas(Point::new(300.0, 80.0), &viewport),
            ConnectionResolution::CreateNodeAt {
                source: anchor,
                position: Point::new(100.0, 40.0)
            }
        );

        let (mut state, _, viewport) = start(Port::Target);
        assert_eq!(
            state.pointer_up_on_canvas(Point::default(), &viewport),
            ConnectionResolution::None
        );
    }

    #[test]
    fn escape_cancels_without_resolution() {
        let (mut state, _, _) = start(Port::Source);
        state.cancel();
        assert_eq!(state, ConnectionState::Idle);
    }
}
