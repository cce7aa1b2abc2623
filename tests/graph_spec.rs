use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use anyhow::Result;
use speculate2::speculate;
use taskflow::graph::{GraphSession, NoticeLevel};
use taskflow::models::*;
use taskflow::snapshot::{self, SnapshotError};
use taskflow::store::{EntityStore, MemoryStore};

/// A store that records every call and fails the ones it is told to.
#[derive(Clone, Default)]
struct FlakyStore {
    inner: MemoryStore,
    failing: Rc<RefCell<HashSet<&'static str>>>,
    calls: Rc<RefCell<Vec<&'static str>>>,
}

impl FlakyStore {
    fn fail(&self, op: &'static str) {
        self.failing.borrow_mut().insert(op);
    }

    fn calls_to(&self, op: &str) -> usize {
        self.calls.borrow().iter().filter(|c| **c == op).count()
    }

    fn reset_calls(&self) {
        self.calls.borrow_mut().clear();
    }

    fn check(&self, op: &'static str) -> Result<()> {
        self.calls.borrow_mut().push(op);
        if self.failing.borrow().contains(op) {
            anyhow::bail!("{op} unavailable");
        }
        Ok(())
    }
}

impl EntityStore for FlakyStore {
    fn list_projects(&self) -> Result<Vec<Project>> {
        self.check("list_projects")?;
        self.inner.list_projects()
    }
    fn get_project(&self, id: i64) -> Result<Option<Project>> {
        self.check("get_project")?;
        self.inner.get_project(id)
    }
    fn create_project(&self, input: CreateProjectInput) -> Result<Project> {
        self.check("create_project")?;
        self.inner.create_project(input)
    }
    fn update_project(&self, id: i64, input: UpdateProjectInput) -> Result<Option<Project>> {
        self.check("update_project")?;
        self.inner.update_project(id, input)
    }
    fn delete_project(&self, id: i64) -> Result<bool> {
        self.check("delete_project")?;
        self.inner.delete_project(id)
    }
    fn list_tasks(&self, project_id: i64) -> Result<Vec<Task>> {
        self.check("list_tasks")?;
        self.inner.list_tasks(project_id)
    }
    fn create_task(&self, project_id: i64, input: CreateTaskInput) -> Result<Task> {
        self.check("create_task")?;
        self.inner.create_task(project_id, input)
    }
    fn update_task(&self, id: i64, input: UpdateTaskInput) -> Result<Option<Task>> {
        self.check("update_task")?;
        self.inner.update_task(id, input)
    }
    fn update_task_position(&self, id: i64, position: Position) -> Result<()> {
        self.check("update_task_position")?;
        self.inner.update_task_position(id, position)
    }
    fn delete_task(&self, id: i64) -> Result<()> {
        self.check("delete_task")?;
        self.inner.delete_task(id)
    }
    fn list_deliverables(&self, project_id: i64) -> Result<Vec<Deliverable>> {
        self.check("list_deliverables")?;
        self.inner.list_deliverables(project_id)
    }
    fn create_deliverable(&self, project_id: i64, input: CreateDeliverableInput) -> Result<Deliverable> {
        self.check("create_deliverable")?;
        self.inner.create_deliverable(project_id, input)
    }
    fn update_deliverable(&self, id: i64, input: UpdateDeliverableInput) -> Result<Option<Deliverable>> {
        self.check("update_deliverable")?;
        self.inner.update_deliverable(id, input)
    }
    fn update_deliverable_position(&self, id: i64, position: Position) -> Result<()> {
        self.check("update_deliverable_position")?;
        self.inner.update_deliverable_position(id, position)
    }
    fn delete_deliverable(&self, id: i64) -> Result<()> {
        self.check("delete_deliverable")?;
        self.inner.delete_deliverable(id)
    }
    fn list_connections(&self, project_id: i64) -> Result<Vec<Connection>> {
        self.check("list_connections")?;
        self.inner.list_connections(project_id)
    }
    fn create_connection(&self, project_id: i64, input: CreateConnectionInput) -> Result<Connection> {
        self.check("create_connection")?;
        self.inner.create_connection(project_id, input)
    }
    fn delete_connection(&self, id: i64) -> Result<()> {
        self.check("delete_connection")?;
        self.inner.delete_connection(id)
    }
    fn delete_connections_for_node(&self, node: NodeId) -> Result<()> {
        self.check("delete_connections_for_node")?;
        self.inner.delete_connections_for_node(node)
    }
}

fn seed(store: &FlakyStore) -> Project {
    let project = store
        .create_project(CreateProjectInput {
            name: "Launch".to_string(),
            description: None,
        })
        .expect("Failed to create project");
    store.create_task(project.id, CreateTaskInput::named("Write copy")).unwrap();
    store.create_task(project.id, CreateTaskInput::named("Review")).unwrap();
    store
        .create_deliverable(project.id, CreateDeliverableInput::named("Press kit"))
        .unwrap();
    project
}

fn node_keys<S: EntityStore>(session: &GraphSession<S>) -> Vec<String> {
    session.graph().nodes.iter().map(|n| n.id.encode()).collect()
}

speculate! {
    before {
        let store = FlakyStore::default();
        let project = seed(&store);
        let mut session = GraphSession::open(store.clone(), project.id).expect("Failed to open session");
        store.reset_calls();
    }

    describe "open" {
        it "fails for a missing project" {
            assert!(GraphSession::open(store.clone(), 999).is_err());
        }

        it "draws one node per entity, tasks first" {
            assert_eq!(node_keys(&session), vec!["task-1", "task-2", "deliverable-1"]);
            assert!(session.graph().edges.is_empty());
            assert!(session.take_notices().is_empty());
        }

        it "places unplaced nodes in a row per kind" {
            let graph = session.graph();
            assert_eq!(graph.node(NodeId::task(1)).unwrap().position, Position::new(150.0, 100.0));
            assert_eq!(graph.node(NodeId::task(2)).unwrap().position, Position::new(400.0, 100.0));
            assert_eq!(graph.node(NodeId::deliverable(1)).unwrap().position, Position::new(150.0, 300.0));
        }

        it "uses stored positions" {
            store.inner.update_task_position(2, Position::new(-20.0, 75.5)).unwrap();
            let reopened = GraphSession::open(store.clone(), project.id).unwrap();
            assert_eq!(
                reopened.graph().node(NodeId::task(2)).unwrap().position,
                Position::new(-20.0, 75.5)
            );
        }
    }

    describe "connect" {
        it "creates a connection and draws it immediately" {
            let connection = session.connect("task-1", "deliverable-1")
                .expect("Connect failed")
                .expect("Connect ignored");

            assert_eq!(connection.source_type, Some(NodeKind::Task));
            assert_eq!(connection.target_type, Some(NodeKind::Deliverable));
            assert_eq!(session.graph().edges.len(), 1);
            assert_eq!(session.graph().edges[0].id, format!("connection-{}", connection.id));
            assert_eq!(store.inner.list_connections(project.id).unwrap().len(), 1);
        }

        it "ignores malformed node keys without a store call" {
            for (source, target) in [("task-1", "milestone-1"), ("task-x", "task-2"), ("", "task-1"), ("task1", "task-2")] {
                assert!(session.connect(source, target).unwrap().is_none());
            }
            assert_eq!(store.calls_to("create_connection"), 0);
            assert!(session.graph().edges.is_empty());
        }

        it "does not draw a coalesced duplicate twice" {
            let first = session.connect("task-1", "task-2").unwrap().unwrap();
            let second = session.connect("task-1", "task-2").unwrap().unwrap();

            assert_eq!(first.id, second.id);
            assert_eq!(session.graph().edges.len(), 1);
            assert_eq!(session.connections().len(), 1);
        }

        it "keeps the diagram unchanged and queues an error when the store fails" {
            store.fail("create_connection");

            assert!(session.connect("task-1", "deliverable-1").is_err());
            assert!(session.graph().edges.is_empty());

            let notices = session.take_notices();
            assert_eq!(notices.len(), 1);
            assert_eq!(notices[0].level, NoticeLevel::Error);
            assert!(session.take_notices().is_empty());
        }

        it "allows a self-loop" {
            assert!(session.connect("task-1", "task-1").unwrap().is_some());
            assert_eq!(session.graph().edges.len(), 1);
        }
    }

    describe "disconnect" {
        before {
            let connection = session.connect("task-1", "deliverable-1").unwrap().unwrap();
            session.connect("task-2", "deliverable-1").unwrap();
        }

        it "removes the edge and the store record" {
            session.disconnect_by_id(connection.id).expect("Disconnect failed");

            assert_eq!(session.graph().edges.len(), 1);
            assert_eq!(session.graph().edges[0].source, NodeId::task(2));
            assert_eq!(store.inner.list_connections(project.id).unwrap().len(), 1);
        }

        it "deletes every removed edge" {
            let edges = session.graph().edges.clone();
            session.disconnect(&edges).expect("Disconnect failed");
            assert!(session.graph().edges.is_empty());
            assert_eq!(store.calls_to("delete_connection"), 2);
        }

        it "stops at the first failure and still reloads" {
            store.fail("delete_connection");
            let edges = session.graph().edges.clone();

            assert!(session.disconnect(&edges).is_err());
            assert_eq!(store.calls_to("delete_connection"), 1);
            assert_eq!(store.calls_to("list_connections"), 1);
            assert_eq!(session.graph().edges.len(), 2);
            assert_eq!(session.take_notices()[0].level, NoticeLevel::Error);
        }

        it "ignores an unknown connection id" {
            session.disconnect_by_id(999).expect("Disconnect failed");
            assert_eq!(store.calls_to("delete_connection"), 0);
            assert_eq!(session.graph().edges.len(), 2);
        }
    }

    describe "delete_nodes" {
        before {
            session.connect("task-1", "deliverable-1").unwrap();
            session.connect("task-2", "task-1").unwrap();
            session.connect("task-2", "deliverable-1").unwrap();
        }

        it "deletes the entity and every connection touching it" {
            session.delete_nodes(["task-1"]).expect("Delete failed");

            assert_eq!(node_keys(&session), vec!["task-2", "deliverable-1"]);
            assert_eq!(session.graph().edges.len(), 1);
            assert_eq!(session.graph().edges[0].source, NodeId::task(2));
            assert_eq!(session.graph().edges[0].target, NodeId::deliverable(1));
        }

        it "does not touch connections of a same-id node of the other kind" {
            session.delete_nodes(["deliverable-1"]).expect("Delete failed");

            let remaining = store.inner.list_connections(project.id).unwrap();
            assert_eq!(remaining.len(), 1);
            assert_eq!(remaining[0].endpoints(), Some((NodeId::task(2), NodeId::task(1))));
        }

        it "keeps surviving nodes where they were" {
            session.move_node("task-2", Position::new(900.0, 10.0)).unwrap();
            session.delete_nodes(["task-1"]).unwrap();
            assert_eq!(
                session.graph().node(NodeId::task(2)).unwrap().position,
                Position::new(900.0, 10.0)
            );
        }

        it "skips malformed keys" {
            session.delete_nodes(["bogus", "task-2"]).expect("Delete failed");
            assert_eq!(node_keys(&session), vec!["task-1", "deliverable-1"]);
        }

        it "still cascades when the entity delete fails, then stops" {
            store.fail("delete_task");

            assert!(session.delete_nodes(["task-1", "task-2"]).is_err());
            assert_eq!(store.calls_to("delete_task"), 1);
            assert_eq!(store.calls_to("delete_connections_for_node"), 1);

            // task-1 survives but its connections are gone; task-2 was never processed.
            assert_eq!(node_keys(&session), vec!["task-1", "task-2", "deliverable-1"]);
            assert_eq!(session.graph().edges.len(), 1);
            assert_eq!(session.take_notices().len(), 1);
        }
    }

    describe "drag" {
        it "moves the node without calling the store" {
            session.drag("task-1", Position::new(10.0, 10.0));
            session.drag("task-1", Position::new(20.0, 25.0));

            assert_eq!(session.graph().node(NodeId::task(1)).unwrap().position, Position::new(20.0, 25.0));
            assert_eq!(store.calls.borrow().len(), 0);
        }

        it "persists once when the drag stops" {
            session.drag("deliverable-1", Position::new(10.0, 10.0));
            session.drag("deliverable-1", Position::new(42.0, 7.0));
            session.drag_stop("deliverable-1").expect("Persist failed");

            assert_eq!(store.calls_to("update_deliverable_position"), 1);
            assert_eq!(store.calls_to("update_task_position"), 0);
            let stored = store.inner.list_deliverables(project.id).unwrap();
            assert_eq!(stored[0].position(), Some(Position::new(42.0, 7.0)));
        }

        it "survives a reload and an edit" {
            session.move_node("task-1", Position::new(333.0, 44.0)).unwrap();
            session.edit_task(1, UpdateTaskInput {
                name: Some("Write better copy".to_string()),
                ..Default::default()
            }).unwrap();
            session.reload_from_store().unwrap();

            let node = session.graph().node(NodeId::task(1)).unwrap();
            assert_eq!(node.position, Position::new(333.0, 44.0));
            assert_eq!(node.data.name(), "Write better copy");
        }

        it "reports a failed save" {
            store.fail("update_task_position");
            assert!(session.move_node("task-1", Position::new(1.0, 1.0)).is_err());
            assert_eq!(session.take_notices()[0].level, NoticeLevel::Error);
        }
    }

    describe "entity commands" {
        it "adds a task as a new unplaced node" {
            let task = session.add_task(CreateTaskInput::named("Ship")).expect("Create failed");

            let node = session.graph().node(NodeId::task(task.id)).unwrap();
            assert_eq!(node.position, Position::new(650.0, 100.0));
        }

        it "gives a new node a free slot after a delete" {
            session.delete_nodes(["task-1"]).unwrap();
            let task = session.add_task(CreateTaskInput::named("Ship")).unwrap();

            let graph = session.graph();
            assert_eq!(graph.node(NodeId::task(2)).unwrap().position, Position::new(400.0, 100.0));
            assert_eq!(graph.node(NodeId::task(task.id)).unwrap().position, Position::new(150.0, 100.0));
        }

        it "adds a deliverable at its given position" {
            let deliverable = session.add_deliverable(CreateDeliverableInput {
                position: Some(Position::new(5.0, 5.0)),
                ..CreateDeliverableInput::named("Site")
            }).unwrap();

            let node = session.graph().node(NodeId::deliverable(deliverable.id)).unwrap();
            assert_eq!(node.position, Position::new(5.0, 5.0));
        }

        it "reports a failed create" {
            store.fail("create_task");
            assert!(session.add_task(CreateTaskInput::named("Nope")).is_err());
            assert_eq!(session.tasks().len(), 2);
            assert_eq!(session.take_notices().len(), 1);
        }
    }

    describe "reload" {
        it "keeps the previous list when a load fails" {
            store.inner.create_task(project.id, CreateTaskInput::named("Added elsewhere")).unwrap();
            store.fail("list_tasks");

            assert!(session.reload_from_store().is_err());
            assert_eq!(session.tasks().len(), 2);
            assert_eq!(session.deliverables().len(), 1);
        }

        it "picks up entities created outside the session" {
            store.inner.create_task(project.id, CreateTaskInput::named("Added elsewhere")).unwrap();
            session.reload_tasks().unwrap();
            assert_eq!(node_keys(&session), vec!["task-1", "task-2", "task-3", "deliverable-1"]);
        }
    }

    describe "import" {
        it "shows what was created when the store fails midway" {
            let document = r#"```json
{"version": "1.0", "project": {"name": "Other"},
 "tasks": [{"id": 1, "name": "Imported"}],
 "deliverables": [{"id": 1, "name": "Never made"}]}
```
"#;
            store.fail("create_deliverable");

            let err = snapshot::import(&mut session, document).unwrap_err();

            assert!(matches!(err, SnapshotError::Store(_)));
            assert_eq!(session.tasks().len(), 3);
            assert_eq!(node_keys(&session), vec!["task-1", "task-2", "task-3", "deliverable-1"]);
            assert_eq!(session.take_notices()[0].level, NoticeLevel::Error);
        }
    }
}
