//! Portable, versioned export and import of one project's graph.
//!
//! A snapshot carries the store ids of its tasks and deliverables only as
//! correlation keys. Importing creates fresh entities, remaps every connection
//! endpoint through a per-kind old-id to new-id table, and never reuses an id
//! from the file. The same file can be imported any number of times, into any
//! project.

pub mod markdown;

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::graph::{GraphSession, Notice};
use crate::models::*;
use crate::store::EntityStore;

/// The snapshot format this crate writes.
pub const SNAPSHOT_VERSION: &str = "1.0";

/// Versions [`import`] accepts.
const SUPPORTED_VERSIONS: &[&str] = &[SNAPSHOT_VERSION];

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("Unrecognized file: no project data block found")]
    UnrecognizedFile,

    #[error("Project data block is not valid: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Unsupported snapshot version: {0}")]
    UnsupportedVersion(String),

    #[error("Store call failed during import: {0:#}")]
    Store(anyhow::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: String,
    #[serde(rename = "exportDate")]
    pub export_date: Option<DateTime<Utc>>,
    pub project: ProjectRecord,
    #[serde(default)]
    pub tasks: Vec<TaskRecord>,
    #[serde(default)]
    pub deliverables: Vec<DeliverableRecord>,
    #[serde(default)]
    pub connections: Vec<ConnectionRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub id: Option<i64>,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// A task as written to a snapshot. Everything except `id` and `name` may be
/// missing from a file and is defaulted on import.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: i64,
    #[serde(default)]
    pub project_id: Option<i64>,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<i64>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub duration_days: Option<i64>,
    #[serde(default)]
    pub assigned_to: Option<i64>,
    #[serde(default)]
    pub position_x: Option<f64>,
    #[serde(default)]
    pub position_y: Option<f64>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliverableRecord {
    pub id: i64,
    #[serde(default)]
    pub project_id: Option<i64>,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<i64>,
    #[serde(rename = "type", default)]
    pub type_id: Option<i64>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub position_x: Option<f64>,
    #[serde(default)]
    pub position_y: Option<f64>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// A connection as an endpoint tuple. The connection's own id is not part of
/// a snapshot; its identity is the endpoint pair.
///
/// Kind tags are kept as strings so that one unknown or missing tag spoils
/// only its own record, not the whole file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectionRecord {
    #[serde(default)]
    pub source_type: Option<String>,
    #[serde(default)]
    pub source_id: Option<i64>,
    #[serde(default)]
    pub target_type: Option<String>,
    #[serde(default)]
    pub target_id: Option<i64>,
}

impl ConnectionRecord {
    fn kinds(&self) -> Option<(NodeKind, NodeKind)> {
        let source = NodeKind::from_str(self.source_type.as_deref()?)?;
        let target = NodeKind::from_str(self.target_type.as_deref()?)?;
        Some((source, target))
    }
}

impl From<&Task> for TaskRecord {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id,
            project_id: Some(task.project_id),
            name: task.name.clone(),
            description: Some(task.description.clone()),
            status: Some(task.status),
            priority: Some(task.priority),
            start_date: task.start_date,
            end_date: task.end_date,
            duration_days: task.duration_days,
            assigned_to: task.assigned_to,
            position_x: task.position_x,
            position_y: task.position_y,
            created_at: Some(task.created_at),
            updated_at: Some(task.updated_at),
        }
    }
}

impl From<&Deliverable> for DeliverableRecord {
    fn from(deliverable: &Deliverable) -> Self {
        Self {
            id: deliverable.id,
            project_id: Some(deliverable.project_id),
            name: deliverable.name.clone(),
            description: Some(deliverable.description.clone()),
            status: Some(deliverable.status),
            type_id: Some(deliverable.type_id),
            due_date: deliverable.due_date,
            position_x: deliverable.position_x,
            position_y: deliverable.position_y,
            created_at: Some(deliverable.created_at),
            updated_at: Some(deliverable.updated_at),
        }
    }
}

impl TaskRecord {
    fn to_input(&self) -> CreateTaskInput {
        CreateTaskInput {
            name: self.name.clone(),
            description: self.description.clone().unwrap_or_default(),
            status: self.status.unwrap_or(DEFAULT_TASK_STATUS),
            priority: self.priority.unwrap_or_default(),
            start_date: self.start_date,
            end_date: self.end_date,
            duration_days: self.duration_days,
            assigned_to: self.assigned_to,
            position: Position::from_parts(self.position_x, self.position_y),
        }
    }
}

impl DeliverableRecord {
    fn to_input(&self) -> CreateDeliverableInput {
        CreateDeliverableInput {
            name: self.name.clone(),
            description: self.description.clone().unwrap_or_default(),
            status: self.status.unwrap_or(DEFAULT_DELIVERABLE_STATUS),
            type_id: self.type_id.unwrap_or(DEFAULT_DELIVERABLE_TYPE),
            due_date: self.due_date,
            position: Position::from_parts(self.position_x, self.position_y),
        }
    }
}

impl Snapshot {
    /// Capture a project's graph. Connections missing a kind tag are left out.
    pub fn capture(
        project: &Project,
        tasks: &[Task],
        deliverables: &[Deliverable],
        connections: &[Connection],
    ) -> Self {
        let connections = connections
            .iter()
            .filter_map(|connection| {
                let Some((source, target)) = connection.endpoints() else {
                    tracing::warn!("Leaving connection {} out of export: missing kind tag", connection.id);
                    return None;
                };
                Some(ConnectionRecord {
                    source_type: Some(source.kind.as_str().to_string()),
                    source_id: Some(source.id),
                    target_type: Some(target.kind.as_str().to_string()),
                    target_id: Some(target.id),
                })
            })
            .collect();

        Self {
            version: SNAPSHOT_VERSION.to_string(),
            export_date: Some(Utc::now()),
            project: ProjectRecord {
                id: Some(project.id),
                name: project.name.clone(),
                description: project.description.clone(),
                created_at: Some(project.created_at),
            },
            tasks: tasks.iter().map(TaskRecord::from).collect(),
            deliverables: deliverables.iter().map(DeliverableRecord::from).collect(),
            connections,
        }
    }
}

/// Old snapshot ids to newly created ids, one table per kind.
#[derive(Debug, Default)]
struct IdRemap {
    tasks: HashMap<i64, i64>,
    deliverables: HashMap<i64, i64>,
}

impl IdRemap {
    fn resolve(&self, kind: NodeKind, old_id: i64) -> Option<i64> {
        match kind {
            NodeKind::Task => self.tasks.get(&old_id).copied(),
            NodeKind::Deliverable => self.deliverables.get(&old_id).copied(),
        }
    }
}

/// Counts of what an import did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub tasks_created: usize,
    pub deliverables_created: usize,
    pub connections_created: usize,
    pub connections_skipped: usize,
}

/// Snapshot of the session's current lists.
pub fn export<S: EntityStore>(session: &GraphSession<S>) -> Snapshot {
    Snapshot::capture(
        session.project(),
        session.tasks(),
        session.deliverables(),
        session.connections(),
    )
}

/// The session's graph as a complete Markdown export document.
pub fn export_document<S: EntityStore>(session: &GraphSession<S>) -> Result<String, SnapshotError> {
    let snapshot = export(session);
    let document = markdown::render_document(&snapshot)?;
    tracing::info!(
        "Exported {} tasks, {} deliverables, {} connections",
        snapshot.tasks.len(),
        snapshot.deliverables.len(),
        snapshot.connections.len()
    );
    Ok(document)
}

/// Locate, parse and version-check the data block of an export document.
pub fn parse_document(text: &str) -> Result<Snapshot, SnapshotError> {
    let block = markdown::extract_data_block(text).ok_or(SnapshotError::UnrecognizedFile)?;
    let value: serde_json::Value = serde_json::from_str(block)?;

    let version = value
        .get("version")
        .and_then(|v| v.as_str())
        .unwrap_or_default();
    if !SUPPORTED_VERSIONS.contains(&version) {
        return Err(SnapshotError::UnsupportedVersion(version.to_string()));
    }

    Ok(serde_json::from_value(value)?)
}

/// Import an export document into the session's project.
///
/// A missing or malformed data block, or an unsupported version, fails before
/// anything is written. Connection records with a missing kind tag or an
/// endpoint not present in the file are skipped one by one. A store failure
/// stops the import where it is; entities created so far stay and the session
/// is reloaded so it shows them.
pub fn import<S: EntityStore>(
    session: &mut GraphSession<S>,
    text: &str,
) -> Result<ImportReport, SnapshotError> {
    let snapshot = match parse_document(text) {
        Ok(snapshot) => snapshot,
        Err(e) => {
            tracing::warn!("Rejected import: {}", e);
            session.push_notice(Notice::error(e.to_string()));
            return Err(e);
        }
    };

    match apply_snapshot(session, &snapshot) {
        Ok(report) => {
            tracing::info!(
                "Imported {} tasks, {} deliverables, {} connections ({} skipped)",
                report.tasks_created,
                report.deliverables_created,
                report.connections_created,
                report.connections_skipped
            );
            session.push_notice(Notice::info("Import completed"));
            Ok(report)
        }
        Err(e) => {
            tracing::error!("Import failed: {:#}", e);
            let _ = session.reload_from_store();
            session.push_notice(Notice::error("Import failed"));
            Err(SnapshotError::Store(e))
        }
    }
}

fn apply_snapshot<S: EntityStore>(
    session: &mut GraphSession<S>,
    snapshot: &Snapshot,
) -> anyhow::Result<ImportReport> {
    let project_id = session.project().id;
    let mut remap = IdRemap::default();
    let mut report = ImportReport::default();

    for record in &snapshot.tasks {
        let task = session.store().create_task(project_id, record.to_input())?;
        remap.tasks.insert(record.id, task.id);
        report.tasks_created += 1;
    }

    for record in &snapshot.deliverables {
        let deliverable = session
            .store()
            .create_deliverable(project_id, record.to_input())?;
        remap.deliverables.insert(record.id, deliverable.id);
        report.deliverables_created += 1;
    }

    // Nodes must exist on the diagram before edges referencing them arrive
    let _ = session.reload_tasks();
    let _ = session.reload_deliverables();

    for record in &snapshot.connections {
        let Some((source_kind, target_kind)) = record.kinds() else {
            tracing::warn!("Skipping connection with missing kind tag: {:?}", record);
            report.connections_skipped += 1;
            continue;
        };

        let source = record
            .source_id
            .and_then(|old| remap.resolve(source_kind, old));
        let target = record
            .target_id
            .and_then(|old| remap.resolve(target_kind, old));
        let (Some(source), Some(target)) = (source, target) else {
            tracing::warn!("Skipping connection with unknown endpoint: {:?}", record);
            report.connections_skipped += 1;
            continue;
        };

        session.store().create_connection(
            project_id,
            CreateConnectionInput {
                source: NodeId::new(source_kind, source),
                target: NodeId::new(target_kind, target),
            },
        )?;
        report.connections_created += 1;
    }

    let _ = session.reload_connections();
    Ok(report)
}
