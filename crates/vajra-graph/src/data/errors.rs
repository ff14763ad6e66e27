//! Error types for the threat intelligence graph store

use std::time::Duration;
use thiserror::Error;

/// Base error type for store, ingestion and query operations.
#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Invalid input: {0}")]
    ValidationError(String),

    #[error("Graph backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Entity not found: type={entity_type} id={id}")]
    NotFound {
        entity_type: String,
        id: String,
    },

    #[error("Persistence error: {message}")]
    PersistenceError {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Batch ingested {new_records} new records but was not persisted")]
    BatchNotPersisted {
        new_records: usize,
        #[source]
        source: Box<GraphError>,
    },

    #[error("Serialization/Deserialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Internal system error: {0}")]
    Internal(String),
}

impl GraphError {
    /// Helper to create a persistence error wrapping an underlying cause
    pub fn persistence<E>(message: impl Into<String>, source: Option<E>) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        GraphError::PersistenceError {
            message: message.into(),
            source: source.map(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>),
        }
    }

    /// Helper to create a not found error
    pub fn not_found(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        GraphError::NotFound {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, GraphError::NotFound { .. })
    }
}

/// Specific error type for the live graph database backend.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Graph database connection error: {0}")]
    ConnectionError(String),
    #[error("Graph query execution error: {0}")]
    QueryError(String),
    #[error("Data mapping error from graph result: {0}")]
    MappingError(String),
    #[error("Graph operation '{operation}' timed out after {after:?}")]
    Timeout {
        operation: String,
        after: Duration,
    },
}
