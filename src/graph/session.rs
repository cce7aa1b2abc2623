use anyhow::Result;

use super::{materialize_edges, reconcile_nodes, FlowEdge, FlowGraph};
use crate::layout::{compute_layout, LayoutConfig};
use crate::models::*;
use crate::store::EntityStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Error,
}

/// A message for the user. The front end drains these and shows each one until acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

/// The editing state for one project's diagram.
///
/// Holds the last entity lists read from the store and the diagram derived from
/// them. There are exactly two ways the diagram changes: [`apply_local`] for an
/// optimistic edge insert, and the `reload_*` family, which re-reads the store
/// and reconciles. Every editing command goes through one of them.
///
/// Multi-step commands are not transactional. When a step fails the command
/// stops, queues an error [`Notice`], and leaves earlier steps applied; a
/// reload shows the true state afterwards.
///
/// [`apply_local`]: GraphSession::apply_local
pub struct GraphSession<S> {
    store: S,
    project: Project,
    tasks: Vec<Task>,
    deliverables: Vec<Deliverable>,
    connections: Vec<Connection>,
    graph: FlowGraph,
    notices: Vec<Notice>,
}

impl<S: EntityStore> GraphSession<S> {
    /// Load a project and build its diagram.
    pub fn open(store: S, project_id: i64) -> Result<Self> {
        let project = store
            .get_project(project_id)?
            .ok_or_else(|| anyhow::anyhow!("Project not found"))?;

        let mut session = Self {
            store,
            project,
            tasks: Vec::new(),
            deliverables: Vec::new(),
            connections: Vec::new(),
            graph: FlowGraph::default(),
            notices: Vec::new(),
        };
        session.reload_from_store()?;
        Ok(session)
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn project(&self) -> &Project {
        &self.project
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn deliverables(&self) -> &[Deliverable] {
        &self.deliverables
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    pub fn graph(&self) -> &FlowGraph {
        &self.graph
    }

    /// Drain queued user notices, oldest first.
    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    pub(crate) fn push_notice(&mut self, notice: Notice) {
        self.notices.push(notice);
    }

    /// Log a failed store call and tell the user something went wrong.
    fn report_failure(&mut self, action: &str, error: &anyhow::Error) {
        tracing::error!("{}: {:#}", action, error);
        self.notices.push(Notice::error(action));
    }

    // ============================================================
    // Reconciliation
    // ============================================================

    pub fn reload_tasks(&mut self) -> Result<()> {
        match self.store.list_tasks(self.project.id) {
            Ok(tasks) => {
                self.tasks = tasks;
                self.reconcile_nodes();
                Ok(())
            }
            Err(e) => {
                tracing::error!("Failed to load tasks: {:#}", e);
                Err(e)
            }
        }
    }

    pub fn reload_deliverables(&mut self) -> Result<()> {
        match self.store.list_deliverables(self.project.id) {
            Ok(deliverables) => {
                self.deliverables = deliverables;
                self.reconcile_nodes();
                Ok(())
            }
            Err(e) => {
                tracing::error!("Failed to load deliverables: {:#}", e);
                Err(e)
            }
        }
    }

    pub fn reload_connections(&mut self) -> Result<()> {
        match self.store.list_connections(self.project.id) {
            Ok(connections) => {
                self.connections = connections;
                self.graph.edges = materialize_edges(&self.connections);
                Ok(())
            }
            Err(e) => {
                tracing::error!("Failed to load connections: {:#}", e);
                Err(e)
            }
        }
    }

    /// Re-read all three lists. A failed list keeps its previous contents.
    pub fn reload_from_store(&mut self) -> Result<()> {
        let tasks = self.reload_tasks();
        let deliverables = self.reload_deliverables();
        let connections = self.reload_connections();
        tasks.and(deliverables).and(connections)
    }

    /// Reload after a command. Failures were already logged by the reload.
    fn refresh(&mut self) {
        let _ = self.reload_from_store();
    }

    fn reconcile_nodes(&mut self) {
        self.graph.nodes = reconcile_nodes(&self.graph.nodes, &self.tasks, &self.deliverables);
    }

    /// Add a connection the store just returned, without waiting for a reload.
    ///
    /// Applying the same connection twice is a no-op, which is what a coalesced
    /// duplicate create looks like.
    pub fn apply_local(&mut self, connection: Connection) {
        if self.connections.iter().any(|c| c.id == connection.id) {
            return;
        }
        if let Some(edge) = FlowEdge::from_connection(&connection) {
            self.graph.edges.push(edge);
        }
        self.connections.push(connection);
    }

    // ============================================================
    // Entity commands
    // ============================================================

    pub fn add_task(&mut self, input: CreateTaskInput) -> Result<Task> {
        let task = self
            .store
            .create_task(self.project.id, input)
            .inspect_err(|e| self.report_failure("Failed to create task", e))?;
        let _ = self.reload_tasks();
        Ok(task)
    }

    pub fn edit_task(&mut self, id: i64, input: UpdateTaskInput) -> Result<Option<Task>> {
        let task = self
            .store
            .update_task(id, input)
            .inspect_err(|e| self.report_failure("Failed to update task", e))?;
        let _ = self.reload_tasks();
        Ok(task)
    }

    pub fn add_deliverable(&mut self, input: CreateDeliverableInput) -> Result<Deliverable> {
        let deliverable = self
            .store
            .create_deliverable(self.project.id, input)
            .inspect_err(|e| self.report_failure("Failed to create deliverable", e))?;
        let _ = self.reload_deliverables();
        Ok(deliverable)
    }

    pub fn edit_deliverable(
        &mut self,
        id: i64,
        input: UpdateDeliverableInput,
    ) -> Result<Option<Deliverable>> {
        let deliverable = self
            .store
            .update_deliverable(id, input)
            .inspect_err(|e| self.report_failure("Failed to update deliverable", e))?;
        let _ = self.reload_deliverables();
        Ok(deliverable)
    }

    // ============================================================
    // Graph gestures
    // ============================================================

    /// Connect two diagram nodes by their keys.
    ///
    /// Returns `Ok(None)` without touching the store if either key does not decode.
    pub fn connect(&mut self, source: &str, target: &str) -> Result<Option<Connection>> {
        let (Some(source), Some(target)) = (NodeId::decode(source), NodeId::decode(target)) else {
            tracing::debug!("Ignoring connect between {:?} and {:?}", source, target);
            return Ok(None);
        };

        let connection = self
            .store
            .create_connection(self.project.id, CreateConnectionInput { source, target })
            .inspect_err(|e| self.report_failure("Failed to create connection", e))?;

        self.apply_local(connection.clone());
        Ok(Some(connection))
    }

    /// Delete the store records behind removed diagram edges, then reload edges.
    pub fn disconnect(&mut self, edges: &[FlowEdge]) -> Result<()> {
        let mut outcome = Ok(());
        for connection_id in edges.iter().filter_map(|e| e.connection_id) {
            if let Err(e) = self.store.delete_connection(connection_id) {
                self.report_failure("Failed to delete connection", &e);
                outcome = Err(e);
                break;
            }
        }
        let _ = self.reload_connections();
        outcome
    }

    /// Delete the connection with the given store id.
    pub fn disconnect_by_id(&mut self, connection_id: i64) -> Result<()> {
        let edges: Vec<FlowEdge> = self
            .graph
            .edges
            .iter()
            .filter(|e| e.connection_id == Some(connection_id))
            .cloned()
            .collect();
        if edges.is_empty() {
            tracing::debug!("No edge for connection {}", connection_id);
            return Ok(());
        }
        self.disconnect(&edges)
    }

    /// Delete the entities behind removed diagram nodes, plus every connection touching them.
    ///
    /// For each node both the entity delete and the connection cascade are
    /// issued even if the first fails. After a failing node, the remaining
    /// nodes are left alone. Keys that do not decode are skipped.
    pub fn delete_nodes<I, K>(&mut self, node_keys: I) -> Result<()>
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        let mut failure = None;
        for key in node_keys {
            let Some(node) = NodeId::decode(key.as_ref()) else {
                tracing::debug!("Ignoring delete of malformed node {:?}", key.as_ref());
                continue;
            };

            if let Err(e) = self.store.delete_entity(node) {
                self.report_failure(&format!("Failed to delete {}", node.kind), &e);
                failure.get_or_insert(e);
            }
            if let Err(e) = self.store.delete_connections_for_node(node) {
                self.report_failure("Failed to delete connections", &e);
                failure.get_or_insert(e);
            }
            if failure.is_some() {
                break;
            }
            tracing::debug!("Deleted {} and its connections", node);
        }

        self.refresh();
        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Move a node on the diagram only. Called for every intermediate drag frame.
    pub fn drag(&mut self, node_key: &str, position: Position) {
        let Some(node) = NodeId::decode(node_key) else {
            return;
        };
        if let Some(flow_node) = self.graph.node_mut(node) {
            flow_node.position = position;
        }
    }

    /// Persist the position a drag ended at. One store call per drag.
    pub fn drag_stop(&mut self, node_key: &str) -> Result<()> {
        let Some(node) = NodeId::decode(node_key) else {
            return Ok(());
        };
        self.persist_position(node)
    }

    /// A complete drag in one step: move, then persist.
    pub fn move_node(&mut self, node_key: &str, position: Position) -> Result<()> {
        self.drag(node_key, position);
        self.drag_stop(node_key)
    }

    fn persist_position(&mut self, node: NodeId) -> Result<()> {
        let Some(position) = self.graph.node(node).map(|n| n.position) else {
            return Ok(());
        };

        self.store
            .update_position(node, position)
            .inspect_err(|e| self.report_failure("Failed to save node position", e))?;
        self.record_position(node, position);
        Ok(())
    }

    /// Mirror a persisted position into the cached entity so exports see it.
    fn record_position(&mut self, node: NodeId, position: Position) {
        match node.kind {
            NodeKind::Task => {
                if let Some(task) = self.tasks.iter_mut().find(|t| t.id == node.id) {
                    task.position_x = Some(position.x);
                    task.position_y = Some(position.y);
                }
            }
            NodeKind::Deliverable => {
                if let Some(d) = self.deliverables.iter_mut().find(|d| d.id == node.id) {
                    d.position_x = Some(position.x);
                    d.position_y = Some(position.y);
                }
            }
        }
        if let Some(flow_node) = self.graph.node_mut(node) {
            flow_node.position = position;
        }
    }

    // ============================================================
    // Auto-layout
    // ============================================================

    /// Lay out every node from edge topology and persist the result.
    ///
    /// All positions are applied to the diagram first; persisting then stops at
    /// the first failed store call.
    pub fn auto_layout(&mut self, config: &LayoutConfig) -> Result<()> {
        let node_ids: Vec<NodeId> = self.graph.nodes.iter().map(|n| n.id).collect();
        let edges: Vec<(NodeId, NodeId)> = self
            .graph
            .edges
            .iter()
            .map(|e| (e.source, e.target))
            .collect();

        let placements = compute_layout(&node_ids, &edges, config);
        for (node, position) in &placements {
            if let Some(flow_node) = self.graph.node_mut(*node) {
                flow_node.position = *position;
            }
        }

        for (node, _) in &placements {
            self.persist_position(*node)?;
        }

        tracing::info!("Laid out {} nodes", placements.len());
        Ok(())
    }
}
