use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::Position;

/// Status reference used when none is given. Status names and colors are
/// reference data owned outside this crate; tasks only carry the id.
pub const DEFAULT_TASK_STATUS: i64 = 1;

/// A unit of work, drawn as a node on the flow diagram.
///
/// `position_x`/`position_y` stay `None` until the node is first dragged or
/// auto-laid-out. Once set they are only changed by another drag or layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub project_id: i64,
    pub name: String,
    pub description: String,
    /// Reference to a task status defined in reference data.
    pub status: i64,
    pub priority: Priority,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub duration_days: Option<i64>,
    /// Reference to an assignee defined in reference data.
    pub assigned_to: Option<i64>,
    pub position_x: Option<f64>,
    pub position_y: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn position(&self) -> Option<Position> {
        Position::from_parts(self.position_x, self.position_y)
    }
}

/// How urgent a task is.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

/// Input for creating a new task in a project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTaskInput {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_task_status")]
    pub status: i64,
    #[serde(default)]
    pub priority: Priority,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub duration_days: Option<i64>,
    pub assigned_to: Option<i64>,
    /// Initial position. `None` leaves the node unplaced.
    pub position: Option<Position>,
}

impl CreateTaskInput {
    /// A task with only a name; everything else defaulted.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            status: DEFAULT_TASK_STATUS,
            priority: Priority::default(),
            start_date: None,
            end_date: None,
            duration_days: None,
            assigned_to: None,
            position: None,
        }
    }
}

/// Input for updating a task. All fields are optional for partial updates.
///
/// Positions are not updated here; see `EntityStore::update_task_position`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateTaskInput {
    pub name: Option<String>,
    pub description: Option<String>,
    pub status: Option<i64>,
    pub priority: Option<Priority>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub duration_days: Option<i64>,
    pub assigned_to: Option<i64>,
}

pub(crate) fn default_task_status() -> i64 {
    DEFAULT_TASK_STATUS
}
