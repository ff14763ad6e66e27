//! Embedded storage backend: in-memory state, traversal and snapshot persistence

pub mod memory;
pub mod snapshot;
pub mod traversal;

pub use memory::EmbeddedGraphStore;
pub use snapshot::{GraphSnapshot, SnapshotFile};
