//! The node/edge model shown on the flow diagram, and how it is derived from
//! the entity lists.
//!
//! [`reconcile_nodes`] and [`materialize_edges`] are pure: they never touch the
//! store, so running them again on the same input always yields the same graph.
//! [`GraphSession`] owns the entity lists and routes editing gestures back to
//! the store.

mod session;

pub use session::{GraphSession, Notice, NoticeLevel};

use std::collections::HashMap;

use crate::models::*;

/// Horizontal start of the fallback row for unplaced nodes.
const FALLBACK_ORIGIN_X: f64 = 150.0;
/// Horizontal distance between unplaced nodes of the same kind.
const FALLBACK_SPACING_X: f64 = 250.0;
const TASK_ROW_Y: f64 = 100.0;
const DELIVERABLE_ROW_Y: f64 = 300.0;

/// The entity a node stands for.
#[derive(Debug, Clone)]
pub enum NodeData {
    Task(Task),
    Deliverable(Deliverable),
}

impl NodeData {
    pub fn name(&self) -> &str {
        match self {
            Self::Task(task) => &task.name,
            Self::Deliverable(deliverable) => &deliverable.name,
        }
    }

    pub fn stored_position(&self) -> Option<Position> {
        match self {
            Self::Task(task) => task.position(),
            Self::Deliverable(deliverable) => deliverable.position(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FlowNode {
    pub id: NodeId,
    pub position: Position,
    pub data: NodeData,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlowEdge {
    /// Diagram key of the edge, `connection-<id>`.
    pub id: String,
    pub source: NodeId,
    pub target: NodeId,
    /// Store record this edge was drawn from. `None` for edges the store never saw.
    pub connection_id: Option<i64>,
}

impl FlowEdge {
    pub fn from_connection(connection: &Connection) -> Option<Self> {
        let (source, target) = connection.endpoints()?;
        Some(Self {
            id: format!("connection-{}", connection.id),
            source,
            target,
            connection_id: Some(connection.id),
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct FlowGraph {
    pub nodes: Vec<FlowNode>,
    pub edges: Vec<FlowEdge>,
}

impl FlowGraph {
    pub fn node(&self, id: NodeId) -> Option<&FlowNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut FlowNode> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }

    pub fn positions(&self) -> HashMap<NodeId, Position> {
        self.nodes.iter().map(|n| (n.id, n.position)).collect()
    }
}

/// The `index`-th slot of the fallback row for `kind`.
///
/// Each kind gets its own row; each slot sits one spacing step to the right of
/// the previous one.
pub fn fallback_position(kind: NodeKind, index: usize) -> Position {
    let y = match kind {
        NodeKind::Task => TASK_ROW_Y,
        NodeKind::Deliverable => DELIVERABLE_ROW_Y,
    };
    Position::new(FALLBACK_ORIGIN_X + index as f64 * FALLBACK_SPACING_X, y)
}

/// Build the node list for the current entity lists.
///
/// A node already on the diagram keeps its position, whatever the store says.
/// A new node takes its stored position, or else the first slot of its kind's
/// fallback row that no other node sits on. Tasks come first, then
/// deliverables, each in list order.
pub fn reconcile_nodes(
    previous: &[FlowNode],
    tasks: &[Task],
    deliverables: &[Deliverable],
) -> Vec<FlowNode> {
    let placed: HashMap<NodeId, Position> = previous.iter().map(|n| (n.id, n.position)).collect();

    let entities: Vec<(NodeId, NodeData)> = tasks
        .iter()
        .map(|task| (NodeId::task(task.id), NodeData::Task(task.clone())))
        .chain(deliverables.iter().map(|deliverable| {
            (
                NodeId::deliverable(deliverable.id),
                NodeData::Deliverable(deliverable.clone()),
            )
        }))
        .collect();

    // Known positions first, so a fallback never lands on a node listed later
    let known: Vec<Option<Position>> = entities
        .iter()
        .map(|(id, data)| placed.get(id).copied().or_else(|| data.stored_position()))
        .collect();
    let mut occupied: Vec<Position> = known.iter().flatten().copied().collect();

    entities
        .into_iter()
        .zip(known)
        .map(|((id, data), position)| {
            let position = position.unwrap_or_else(|| {
                let slot = (0..)
                    .map(|index| fallback_position(id.kind, index))
                    .find(|candidate| !occupied.contains(candidate))
                    .unwrap_or_else(|| fallback_position(id.kind, 0));
                occupied.push(slot);
                slot
            });
            FlowNode { id, position, data }
        })
        .collect()
}

/// One diagram edge per connection. Connections missing a kind tag are not drawn.
pub fn materialize_edges(connections: &[Connection]) -> Vec<FlowEdge> {
    connections
        .iter()
        .filter_map(|connection| {
            let edge = FlowEdge::from_connection(connection);
            if edge.is_none() {
                tracing::debug!("Not drawing connection {} without kind tags", connection.id);
            }
            edge
        })
        .collect()
}
