use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The two kinds of entity that can appear as nodes on the flow diagram.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Task,
    Deliverable,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Task => "task",
            Self::Deliverable => "deliverable",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "task" => Some(Self::Task),
            "deliverable" => Some(Self::Deliverable),
            _ => None,
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a node on the flow diagram: an entity kind plus that entity's id.
///
/// The string form (`"task-12"`, `"deliverable-3"`) is what the diagram surface
/// uses as its node key. [`NodeId::encode`] and [`NodeId::decode`] are the only
/// places that produce or inspect it, and the mapping is reversible: distinct
/// entities never share a node key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    pub kind: NodeKind,
    pub id: i64,
}

impl NodeId {
    pub fn new(kind: NodeKind, id: i64) -> Self {
        Self { kind, id }
    }

    pub fn task(id: i64) -> Self {
        Self::new(NodeKind::Task, id)
    }

    pub fn deliverable(id: i64) -> Self {
        Self::new(NodeKind::Deliverable, id)
    }

    pub fn encode(&self) -> String {
        format!("{}-{}", self.kind.as_str(), self.id)
    }

    /// Parse a diagram node key.
    ///
    /// Returns `None` when the kind tag is unknown or the suffix is not a
    /// plain decimal id. Callers treat `None` as a no-op.
    pub fn decode(s: &str) -> Option<Self> {
        let (tag, digits) = s.split_once('-')?;
        let kind = NodeKind::from_str(tag)?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let id = digits.parse::<i64>().ok()?;
        Some(Self { kind, id })
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.kind.as_str(), self.id)
    }
}

impl FromStr for NodeId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s).ok_or_else(|| format!("invalid node id: {s}"))
    }
}

/// A point on the diagram canvas, in pixels. Marks the top-left corner of a node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Combine the nullable column pair stored on an entity. Both halves must be set.
    pub fn from_parts(x: Option<f64>, y: Option<f64>) -> Option<Self> {
        match (x, y) {
            (Some(x), Some(y)) => Some(Self { x, y }),
            _ => None,
        }
    }
}
