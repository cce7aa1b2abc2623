//! The entity store contract consumed by the graph session.
//!
//! Two backends implement [`EntityStore`]:
//!
//! - [`crate::db::Database`]: SQLite, the default for the CLI.
//! - [`MemoryStore`]: a key-value store held in memory and optionally mirrored
//!   to a JSON file.
//!
//! Both behave identically as far as the core is concerned: creates return the
//! persisted record with its store-assigned id, list calls return records in
//! creation order, and creating a connection whose ordered endpoint pair already
//! exists in the project returns the existing record instead of a new one.

mod memory;

pub use memory::MemoryStore;

use anyhow::Result;

use crate::models::*;

pub trait EntityStore {
    // Projects

    fn list_projects(&self) -> Result<Vec<Project>>;
    fn get_project(&self, id: i64) -> Result<Option<Project>>;
    fn create_project(&self, input: CreateProjectInput) -> Result<Project>;
    fn update_project(&self, id: i64, input: UpdateProjectInput) -> Result<Option<Project>>;
    /// Deletes the project together with everything partitioned under it.
    fn delete_project(&self, id: i64) -> Result<bool>;

    // Tasks

    fn list_tasks(&self, project_id: i64) -> Result<Vec<Task>>;
    fn create_task(&self, project_id: i64, input: CreateTaskInput) -> Result<Task>;
    fn update_task(&self, id: i64, input: UpdateTaskInput) -> Result<Option<Task>>;
    fn update_task_position(&self, id: i64, position: Position) -> Result<()>;
    fn delete_task(&self, id: i64) -> Result<()>;

    // Deliverables

    fn list_deliverables(&self, project_id: i64) -> Result<Vec<Deliverable>>;
    fn create_deliverable(
        &self,
        project_id: i64,
        input: CreateDeliverableInput,
    ) -> Result<Deliverable>;
    fn update_deliverable(
        &self,
        id: i64,
        input: UpdateDeliverableInput,
    ) -> Result<Option<Deliverable>>;
    fn update_deliverable_position(&self, id: i64, position: Position) -> Result<()>;
    fn delete_deliverable(&self, id: i64) -> Result<()>;

    // Connections

    fn list_connections(&self, project_id: i64) -> Result<Vec<Connection>>;
    /// Create a connection, or return the existing one with the same endpoints.
    ///
    /// Fails if either endpoint does not exist in `project_id`.
    fn create_connection(&self, project_id: i64, input: CreateConnectionInput)
        -> Result<Connection>;
    fn delete_connection(&self, id: i64) -> Result<()>;
    /// Delete every connection with `node` at either end.
    fn delete_connections_for_node(&self, node: NodeId) -> Result<()>;

    /// Route a position update to the right entity collection.
    fn update_position(&self, node: NodeId, position: Position) -> Result<()> {
        match node.kind {
            NodeKind::Task => self.update_task_position(node.id, position),
            NodeKind::Deliverable => self.update_deliverable_position(node.id, position),
        }
    }

    /// Route an entity delete to the right collection. Connections are untouched.
    fn delete_entity(&self, node: NodeId) -> Result<()> {
        match node.kind {
            NodeKind::Task => self.delete_task(node.id),
            NodeKind::Deliverable => self.delete_deliverable(node.id),
        }
    }
}
