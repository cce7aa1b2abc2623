use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::EntityStore;
use crate::models::*;

/// Everything the key-value backend holds, in one serializable document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct MemoryState {
    #[serde(default)]
    next_ids: NextIds,
    #[serde(default)]
    projects: Vec<Project>,
    #[serde(default)]
    tasks: Vec<Task>,
    #[serde(default)]
    deliverables: Vec<Deliverable>,
    #[serde(default)]
    connections: Vec<Connection>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct NextIds {
    project: i64,
    task: i64,
    deliverable: i64,
    connection: i64,
}

impl Default for NextIds {
    fn default() -> Self {
        Self {
            project: 1,
            task: 1,
            deliverable: 1,
            connection: 1,
        }
    }
}

impl MemoryState {
    fn has_node(&self, project_id: i64, node: NodeId) -> bool {
        match node.kind {
            NodeKind::Task => self
                .tasks
                .iter()
                .any(|t| t.id == node.id && t.project_id == project_id),
            NodeKind::Deliverable => self
                .deliverables
                .iter()
                .any(|d| d.id == node.id && d.project_id == project_id),
        }
    }
}

fn take_id(counter: &mut i64) -> i64 {
    let id = *counter;
    *counter += 1;
    id
}

/// Key-value entity store.
///
/// State lives in memory. When opened with a path, the whole state is written
/// back to that JSON file after every mutation.
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    path: Option<PathBuf>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState::default())),
            path: None,
        }
    }

    /// Open a file-backed store, loading existing state if the file exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let state = if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read store file {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse store file {}", path.display()))?
        } else {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).context("Failed to create store directory")?;
            }
            MemoryState::default()
        };

        Ok(Self {
            state: Arc::new(Mutex::new(state)),
            path: Some(path),
        })
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().expect("store lock poisoned")
    }

    /// Apply `change` to a copy of the state, persist the copy, then install it.
    /// If the change or the write fails, the live state is left as it was.
    fn write<T>(&self, change: impl FnOnce(&mut MemoryState) -> Result<T>) -> Result<T> {
        let mut state = self.lock();
        let mut next = state.clone();
        let value = change(&mut next)?;
        self.flush(&next)?;
        *state = next;
        Ok(value)
    }

    fn flush(&self, state: &MemoryState) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let content = serde_json::to_string_pretty(state).context("Failed to serialize store")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write store file {}", path.display()))?;
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for MemoryStore {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            path: self.path.clone(),
        }
    }
}

impl EntityStore for MemoryStore {
    // ============================================================
    // Project operations
    // ============================================================

    fn list_projects(&self) -> Result<Vec<Project>> {
        let mut projects = self.lock().projects.clone();
        projects.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(projects)
    }

    fn get_project(&self, id: i64) -> Result<Option<Project>> {
        Ok(self.lock().projects.iter().find(|p| p.id == id).cloned())
    }

    fn create_project(&self, input: CreateProjectInput) -> Result<Project> {
        self.write(|state| {
            let now = Utc::now();
            let project = Project {
                id: take_id(&mut state.next_ids.project),
                name: input.name,
                description: input.description,
                created_at: now,
                updated_at: now,
            };
            state.projects.push(project.clone());
            Ok(project)
        })
    }

    fn update_project(&self, id: i64, input: UpdateProjectInput) -> Result<Option<Project>> {
        self.write(|state| {
            let Some(project) = state.projects.iter_mut().find(|p| p.id == id) else {
                return Ok(None);
            };
            if let Some(name) = input.name {
                project.name = name;
            }
            if input.description.is_some() {
                project.description = input.description;
            }
            project.updated_at = Utc::now();
            let updated = project.clone();
            Ok(Some(updated))
        })
    }

    fn delete_project(&self, id: i64) -> Result<bool> {
        self.write(|state| {
            let before = state.projects.len();
            state.projects.retain(|p| p.id != id);
            if state.projects.len() == before {
                return Ok(false);
            }
            state.tasks.retain(|t| t.project_id != id);
            state.deliverables.retain(|d| d.project_id != id);
            state.connections.retain(|c| c.project_id != id);
            Ok(true)
        })
    }

    // ============================================================
    // Task operations
    // ============================================================

    fn list_tasks(&self, project_id: i64) -> Result<Vec<Task>> {
        Ok(self
            .lock()
            .tasks
            .iter()
            .filter(|t| t.project_id == project_id)
            .cloned()
            .collect())
    }

    fn create_task(&self, project_id: i64, input: CreateTaskInput) -> Result<Task> {
        self.write(|state| {
            if !state.projects.iter().any(|p| p.id == project_id) {
                anyhow::bail!("Project not found");
            }
            let now = Utc::now();
            let task = Task {
                id: take_id(&mut state.next_ids.task),
                project_id,
                name: input.name,
                description: input.description,
                status: input.status,
                priority: input.priority,
                start_date: input.start_date,
                end_date: input.end_date,
                duration_days: input.duration_days,
                assigned_to: input.assigned_to,
                position_x: input.position.map(|p| p.x),
                position_y: input.position.map(|p| p.y),
                created_at: now,
                updated_at: now,
            };
            state.tasks.push(task.clone());
            Ok(task)
        })
    }

    fn update_task(&self, id: i64, input: UpdateTaskInput) -> Result<Option<Task>> {
        self.write(|state| {
            let Some(task) = state.tasks.iter_mut().find(|t| t.id == id) else {
                return Ok(None);
            };
            if let Some(name) = input.name {
                task.name = name;
            }
            if let Some(description) = input.description {
                task.description = description;
            }
            if let Some(status) = input.status {
                task.status = status;
            }
            if let Some(priority) = input.priority {
                task.priority = priority;
            }
            task.start_date = input.start_date.or(task.start_date);
            task.end_date = input.end_date.or(task.end_date);
            task.duration_days = input.duration_days.or(task.duration_days);
            task.assigned_to = input.assigned_to.or(task.assigned_to);
            task.updated_at = Utc::now();
            let updated = task.clone();
            Ok(Some(updated))
        })
    }

    fn update_task_position(&self, id: i64, position: Position) -> Result<()> {
        self.write(|state| {
            let task = state
                .tasks
                .iter_mut()
                .find(|t| t.id == id)
                .ok_or_else(|| anyhow::anyhow!("Task not found"))?;
            task.position_x = Some(position.x);
            task.position_y = Some(position.y);
            task.updated_at = Utc::now();
            Ok(())
        })
    }

    fn delete_task(&self, id: i64) -> Result<()> {
        self.write(|state| {
            state.tasks.retain(|t| t.id != id);
            Ok(())
        })
    }

    // ============================================================
    // Deliverable operations
    // ============================================================

    fn list_deliverables(&self, project_id: i64) -> Result<Vec<Deliverable>> {
        Ok(self
            .lock()
            .deliverables
            .iter()
            .filter(|d| d.project_id == project_id)
            .cloned()
            .collect())
    }

    fn create_deliverable(
        &self,
        project_id: i64,
        input: CreateDeliverableInput,
    ) -> Result<Deliverable> {
        self.write(|state| {
            if !state.projects.iter().any(|p| p.id == project_id) {
                anyhow::bail!("Project not found");
            }
            let now = Utc::now();
            let deliverable = Deliverable {
                id: take_id(&mut state.next_ids.deliverable),
                project_id,
                name: input.name,
                description: input.description,
                status: input.status,
                type_id: input.type_id,
                due_date: input.due_date,
                position_x: input.position.map(|p| p.x),
                position_y: input.position.map(|p| p.y),
                created_at: now,
                updated_at: now,
            };
            state.deliverables.push(deliverable.clone());
            Ok(deliverable)
        })
    }

    fn update_deliverable(
        &self,
        id: i64,
        input: UpdateDeliverableInput,
    ) -> Result<Option<Deliverable>> {
        self.write(|state| {
            let Some(deliverable) = state.deliverables.iter_mut().find(|d| d.id == id) else {
                return Ok(None);
            };
            if let Some(name) = input.name {
                deliverable.name = name;
            }
            if let Some(description) = input.description {
                deliverable.description = description;
            }
            if let Some(status) = input.status {
                deliverable.status = status;
            }
            if let Some(type_id) = input.type_id {
                deliverable.type_id = type_id;
            }
            deliverable.due_date = input.due_date.or(deliverable.due_date);
            deliverable.updated_at = Utc::now();
            let updated = deliverable.clone();
            Ok(Some(updated))
        })
    }

    fn update_deliverable_position(&self, id: i64, position: Position) -> Result<()> {
        self.write(|state| {
            let deliverable = state
                .deliverables
                .iter_mut()
                .find(|d| d.id == id)
                .ok_or_else(|| anyhow::anyhow!("Deliverable not found"))?;
            deliverable.position_x = Some(position.x);
            deliverable.position_y = Some(position.y);
            deliverable.updated_at = Utc::now();
            Ok(())
        })
    }

    fn delete_deliverable(&self, id: i64) -> Result<()> {
        self.write(|state| {
            state.deliverables.retain(|d| d.id != id);
            Ok(())
        })
    }

    // ============================================================
    // Connection operations
    // ============================================================

    fn list_connections(&self, project_id: i64) -> Result<Vec<Connection>> {
        Ok(self
            .lock()
            .connections
            .iter()
            .filter(|c| c.project_id == project_id)
            .cloned()
            .collect())
    }

    fn create_connection(
        &self,
        project_id: i64,
        input: CreateConnectionInput,
    ) -> Result<Connection> {
        self.write(|state| {
            if !state.has_node(project_id, input.source) {
                anyhow::bail!("Source node {} not found in project", input.source);
            }
            if !state.has_node(project_id, input.target) {
                anyhow::bail!("Target node {} not found in project", input.target);
            }

            let existing = state.connections.iter().find(|c| {
                c.project_id == project_id && c.endpoints() == Some((input.source, input.target))
            });
            if let Some(existing) = existing {
                return Ok(existing.clone());
            }

            let connection = Connection {
                id: take_id(&mut state.next_ids.connection),
                project_id,
                source_type: Some(input.source.kind),
                source_id: input.source.id,
                target_type: Some(input.target.kind),
                target_id: input.target.id,
                created_at: Utc::now(),
            };
            state.connections.push(connection.clone());
            Ok(connection)
        })
    }

    fn delete_connection(&self, id: i64) -> Result<()> {
        self.write(|state| {
            state.connections.retain(|c| c.id != id);
            Ok(())
        })
    }

    fn delete_connections_for_node(&self, node: NodeId) -> Result<()> {
        self.write(|state| {
            state.connections.retain(|c| !c.touches(node));
            Ok(())
        })
    }
}
