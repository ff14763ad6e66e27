//! Message types for service communication

use tokio::sync::oneshot;
use uuid::Uuid;

use crate::data::{GraphError, ThreatRecord};

/// Reply channel for a batch: the number of newly created nodes.
pub type IngestionReply = oneshot::Sender<Result<usize, GraphError>>;

/// Message type for ingestion operations
#[derive(Debug)]
pub enum IngestionMessage {
    /// Upsert a batch of records and persist once at the end.
    Batch {
        batch_id: Uuid,
        records: Vec<ThreatRecord>,
        reply: Option<IngestionReply>,
    },
}

impl IngestionMessage {
    pub fn batch(records: Vec<ThreatRecord>, reply: Option<IngestionReply>) -> Self {
        IngestionMessage::Batch {
            batch_id: Uuid::new_v4(),
            records,
            reply,
        }
    }
}
