//! Core data structures for the threat intelligence graph

pub mod entities;
pub mod errors;
pub mod records;
pub mod types;

// Re-export all common types
pub use entities::{properties, AttackPath, Node, Properties, Relationship, UpsertOutcome};
pub use errors::{BackendError, GraphError};
pub use records::ThreatRecord;
pub use types::{GraphStatistics, Page, Severity, StoreMode};
