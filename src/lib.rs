pub mod config;
pub mod db;
pub mod graph;
pub mod layout;
pub mod models;
pub mod snapshot;
pub mod store;
