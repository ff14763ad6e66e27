//! Core traits (interfaces) for the threat graph

pub mod graph_store;

pub use graph_store::{GraphStore, ATTACK_PATHS_LIMIT, RELATED_NODES_LIMIT};
