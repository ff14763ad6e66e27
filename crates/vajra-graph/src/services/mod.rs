//! Ingestion, query and seeding services over a shared `GraphStore`

pub mod client;
pub mod ingestion;
pub mod messages;
pub mod query;
pub mod seed;

// Re-exports
pub use client::GraphClient;
pub use ingestion::{IngestionReport, IngestionService};
pub use messages::{IngestionMessage, IngestionReply};
pub use query::QueryService;
pub use seed::seed_demo_graph;
