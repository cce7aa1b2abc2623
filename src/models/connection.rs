use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{NodeId, NodeKind};

/// A directed dependency edge between two diagram nodes.
///
/// The kind tags are optional because records written by older clients of the
/// key-value backend may lack them. Such records are never drawn and never
/// exported; see [`Connection::endpoints`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connection {
    pub id: i64,
    pub project_id: i64,
    pub source_type: Option<NodeKind>,
    pub source_id: i64,
    pub target_type: Option<NodeKind>,
    pub target_id: i64,
    pub created_at: DateTime<Utc>,
}

impl Connection {
    /// Source and target node identities, or `None` if either kind tag is missing.
    pub fn endpoints(&self) -> Option<(NodeId, NodeId)> {
        let source = NodeId::new(self.source_type?, self.source_id);
        let target = NodeId::new(self.target_type?, self.target_id);
        Some((source, target))
    }

    /// Whether either end of this connection is `node`.
    pub fn touches(&self, node: NodeId) -> bool {
        (self.source_type == Some(node.kind) && self.source_id == node.id)
            || (self.target_type == Some(node.kind) && self.target_id == node.id)
    }
}

/// Input for creating a connection. Both endpoints must exist in the project.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreateConnectionInput {
    pub source: NodeId,
    pub target: NodeId,
}
