use tokio::sync::{mpsc, oneshot};

use crate::data::{GraphError, ThreatRecord};
use crate::services::messages::IngestionMessage;
use crate::services::query::QueryService;

/// Client handle for the graph services.
/// Ingestion goes through the `IngestionService` channel; reads go straight
/// to the shared store.
#[derive(Clone)]
pub struct GraphClient {
    ingestion_tx: mpsc::Sender<IngestionMessage>,
    queries: QueryService,
}

impl GraphClient {
    pub fn new(ingestion_tx: mpsc::Sender<IngestionMessage>, queries: QueryService) -> Self {
        GraphClient { ingestion_tx, queries }
    }

    /// Sends a batch and waits for the number of newly created nodes.
    pub async fn ingest(&self, records: Vec<ThreatRecord>) -> Result<usize, GraphError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.ingestion_tx
            .send(IngestionMessage::batch(records, Some(reply_tx)))
            .await
            .map_err(|_| GraphError::Internal("Ingestion channel closed".to_string()))?;

        reply_rx
            .await
            .map_err(|_| GraphError::Internal("Ingestion reply channel closed by service".to_string()))?
    }

    /// Queues a batch without waiting for its outcome.
    pub async fn submit(&self, records: Vec<ThreatRecord>) -> Result<(), GraphError> {
        self.ingestion_tx
            .send(IngestionMessage::batch(records, None))
            .await
            .map_err(|_| GraphError::Internal("Ingestion channel closed".to_string()))
    }

    pub fn queries(&self) -> &QueryService {
        &self.queries
    }
}
