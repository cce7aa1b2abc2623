use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::Position;

/// Status reference used when none is given.
pub const DEFAULT_DELIVERABLE_STATUS: i64 = 1;

/// Deliverable type reference used when none is given.
pub const DEFAULT_DELIVERABLE_TYPE: i64 = 1;

/// An output artifact produced or consumed by tasks.
///
/// Deliverables share the diagram with tasks but have their own id space.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deliverable {
    pub id: i64,
    pub project_id: i64,
    pub name: String,
    pub description: String,
    /// Reference to a deliverable status defined in reference data.
    pub status: i64,
    /// Reference to a deliverable type defined in reference data.
    #[serde(rename = "type")]
    pub type_id: i64,
    pub due_date: Option<NaiveDate>,
    pub position_x: Option<f64>,
    pub position_y: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Deliverable {
    pub fn position(&self) -> Option<Position> {
        Position::from_parts(self.position_x, self.position_y)
    }
}

/// Input for creating a new deliverable in a project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDeliverableInput {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub status: i64,
    #[serde(rename = "type")]
    pub type_id: i64,
    pub due_date: Option<NaiveDate>,
    pub position: Option<Position>,
}

impl CreateDeliverableInput {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            status: DEFAULT_DELIVERABLE_STATUS,
            type_id: DEFAULT_DELIVERABLE_TYPE,
            due_date: None,
            position: None,
        }
    }
}

/// Input for updating a deliverable. All fields are optional for partial updates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateDeliverableInput {
    pub name: Option<String>,
    pub description: Option<String>,
    pub status: Option<i64>,
    #[serde(rename = "type")]
    pub type_id: Option<i64>,
    pub due_date: Option<NaiveDate>,
}
