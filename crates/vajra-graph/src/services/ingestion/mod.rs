//! Upsert pipeline for external threat records

pub mod classification;
pub mod service;

pub use classification::{classify_source, normalize_severity, record_properties, DEFAULT_NODE_TYPE};
pub use service::{ingest_batch, IngestionReport, IngestionService};
