//! Domain models for taskflow.
//!
//! # Core Concepts
//!
//! - [`Project`]: Partition key for everything below. Deleting a project removes its graph.
//! - [`Task`]: A work item, drawn as a node on the flow diagram.
//! - [`Deliverable`]: An output artifact, also drawn as a node.
//! - [`Connection`]: A directed dependency edge between two nodes of either kind.
//! - [`NodeId`]: The `(kind, id)` pair that identifies a node on the diagram.
//!
//! Tasks and deliverables have independent id spaces. A task and a deliverable
//! may share the same numeric id, so an id is only meaningful together with its
//! [`NodeKind`].

mod connection;
mod deliverable;
mod node;
mod project;
mod task;

pub use connection::*;
pub use deliverable::*;
pub use node::*;
pub use project::*;
pub use task::*;
