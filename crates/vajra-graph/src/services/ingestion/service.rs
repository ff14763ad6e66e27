use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    data::{GraphError, ThreatRecord, UpsertOutcome},
    services::messages::IngestionMessage,
    traits::GraphStore,
};

use super::classification::{classify_source, record_properties};

/// Outcome counts for one ingested batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestionReport {
    pub new_records: usize,
    pub updated_records: usize,
    pub skipped_records: usize,
}

/// Service responsible for upserting external threat records into the graph.
///
/// Batches are applied one at a time, either directly through [`ingest`] or
/// from the message channel consumed by [`run`].
///
/// [`ingest`]: IngestionService::ingest
/// [`run`]: IngestionService::run
pub struct IngestionService {
    store: Arc<dyn GraphStore>,
    ingestion_rx: Option<mpsc::Receiver<IngestionMessage>>,
}

impl IngestionService {
    /// Creates a service without a message channel.
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self {
            store,
            ingestion_rx: None,
        }
    }

    /// Creates a service that will consume `ingestion_rx` when [`run`](Self::run) is called.
    pub fn with_receiver(store: Arc<dyn GraphStore>, ingestion_rx: mpsc::Receiver<IngestionMessage>) -> Self {
        Self {
            store,
            ingestion_rx: Some(ingestion_rx),
        }
    }

    /// Upserts `records` and returns how many of them created new nodes.
    pub async fn ingest(&self, records: &[ThreatRecord]) -> Result<usize, GraphError> {
        let report = ingest_batch(self.store.as_ref(), Uuid::new_v4(), records).await?;
        Ok(report.new_records)
    }

    /// Like [`ingest`](Self::ingest) but returns the full report.
    pub async fn ingest_with_report(&self, records: &[ThreatRecord]) -> Result<IngestionReport, GraphError> {
        ingest_batch(self.store.as_ref(), Uuid::new_v4(), records).await
    }

    /// Runs the service, processing messages from the channel until every
    /// sender is dropped.
    ///
    /// Messages are handled sequentially so that only one batch writes at a
    /// time and each batch ends with its own persist.
    pub async fn run(&mut self) -> Result<(), GraphError> {
        let mut ingestion_rx = self
            .ingestion_rx
            .take()
            .ok_or_else(|| GraphError::Internal("IngestionService has no message channel".to_string()))?;

        info!("IngestionService started");
        while let Some(msg) = ingestion_rx.recv().await {
            match msg {
                IngestionMessage::Batch {
                    batch_id,
                    records,
                    reply,
                } => {
                    let result = ingest_batch(self.store.as_ref(), batch_id, &records)
                        .await
                        .map(|report| report.new_records);
                    if let Err(e) = &result {
                        error!(batch_id = %batch_id, error = %e, "Failed to ingest batch");
                    }
                    if let Some(reply) = reply {
                        // It's OK if the client stopped waiting
                        let _ = reply.send(result);
                    }
                }
            }
        }

        info!("IngestionService channel closed, shutting down");
        Ok(())
    }
}

/// Upserts every record of a batch under its composite key, then persists once.
///
/// Records without a source or id are skipped. When the in-memory upsert
/// succeeded but the persist did not, the error still carries the new-record
/// count.
#[instrument(skip(store, records), fields(batch_id = %batch_id, records = records.len()))]
pub async fn ingest_batch(
    store: &dyn GraphStore,
    batch_id: Uuid,
    records: &[ThreatRecord],
) -> Result<IngestionReport, GraphError> {
    let ingested_at = Utc::now();
    let mut report = IngestionReport::default();

    for record in records {
        if record.source.trim().is_empty() || record.id.trim().is_empty() {
            warn!(
                source = %record.source,
                record_id = %record.id,
                "Skipping record without source or id"
            );
            report.skipped_records += 1;
            continue;
        }

        let node_id = record.composite_key();
        let node_type = classify_source(&record.source);
        let mut properties = record_properties(record, ingested_at);
        // Without a publication date `discovered` is the first-seen time
        if record.published.is_none() {
            let seen = store.get_node(&node_id).await?;
            if seen.map_or(false, |node| node.properties.contains_key("discovered")) {
                properties.remove("discovered");
            }
        }

        match store.upsert_node(&node_id, node_type, properties).await? {
            UpsertOutcome::Created => report.new_records += 1,
            UpsertOutcome::Updated => report.updated_records += 1,
        }
    }

    if let Err(e) = store.persist().await {
        error!(
            new_records = report.new_records,
            error = %e,
            "Batch applied but snapshot was not written"
        );
        return Err(GraphError::BatchNotPersisted {
            new_records: report.new_records,
            source: Box::new(e),
        });
    }

    info!(
        new_records = report.new_records,
        updated_records = report.updated_records,
        skipped_records = report.skipped_records,
        "Ingested batch"
    );
    Ok(report)
}
