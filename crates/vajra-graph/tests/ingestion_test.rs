//! Ingestion pipeline: composite keys, idempotent upsert, severity and
//! batch persistence.

use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::json;

use vajra_graph::{
    services::ingestion::{IngestionReport, IngestionService},
    test_utils::RecordingGraphStore,
    EmbeddedGraphStore, GraphError, GraphStore, GraphStoreConfig, ThreatRecord,
};

fn nvd(id: &str, cvss: &str) -> ThreatRecord {
    ThreatRecord::new("nvd", id, format!("{} in libfoo", id))
        .with_summary("Buffer overflow in libfoo")
        .with_url(format!("https://nvd.nist.gov/vuln/detail/{}", id))
        .with_metadata("cvss_score", cvss)
}

#[test_log::test(tokio::test)]
async fn test_same_record_twice_yields_one_node() {
    let store: Arc<dyn GraphStore> = Arc::new(EmbeddedGraphStore::in_memory());
    let service = IngestionService::new(Arc::clone(&store));

    assert_eq!(service.ingest(&[nvd("CVE-2024-0001", "5.0")]).await.unwrap(), 1);
    assert_eq!(service.ingest(&[nvd("CVE-2024-0001", "9.8")]).await.unwrap(), 0);

    let stats = store.get_statistics().await.unwrap();
    assert_eq!(stats.total_nodes, 1);
    let node = store.get_node("nvd:CVE-2024-0001").await.unwrap().unwrap();
    assert_eq!(node.node_type, "CVE");
    assert_eq!(node.property_str("severity"), Some("critical"));
    assert_eq!(node.properties["cvss_score"], json!("9.8"));
}

#[test_log::test(tokio::test)]
async fn test_sources_do_not_collide() {
    let store: Arc<dyn GraphStore> = Arc::new(EmbeddedGraphStore::in_memory());
    let service = IngestionService::new(Arc::clone(&store));

    let batch = vec![
        nvd("CVE-2024-0002", "7.5"),
        ThreatRecord::new("cisa_kev", "CVE-2024-0002", "Known exploited").with_severity("High"),
        ThreatRecord::new("reddit_netsec", "CVE-2024-0002", "Discussion thread"),
    ];
    assert_eq!(service.ingest(&batch).await.unwrap(), 3);

    let stats = store.get_statistics().await.unwrap();
    assert_eq!(stats.node_types.get("CVE"), Some(&2));
    assert_eq!(stats.node_types.get("Campaign"), Some(&1));

    let campaign = store.get_node("reddit_netsec:CVE-2024-0002").await.unwrap().unwrap();
    assert_eq!(campaign.property_str("severity"), Some("medium"));
}

#[tokio::test]
async fn test_batch_persists_once() {
    let store = Arc::new(RecordingGraphStore::new());
    let service = IngestionService::new(store.clone());

    let batch: Vec<_> = (0..20).map(|i| nvd(&format!("CVE-2024-{:04}", i), "4.0")).collect();
    let report = service.ingest_with_report(&batch).await.unwrap();

    assert_eq!(
        report,
        IngestionReport {
            new_records: 20,
            updated_records: 0,
            skipped_records: 0
        }
    );
    assert_eq!(store.upsert_calls(), 20);
    assert_eq!(store.persist_calls(), 1);
}

#[tokio::test]
async fn test_persist_failure_keeps_upserts_and_reports_count() {
    let store = Arc::new(RecordingGraphStore::new());
    store.fail_persist(true);
    let service = IngestionService::new(store.clone());

    let err = service
        .ingest(&[nvd("CVE-2024-0100", "8.1"), nvd("CVE-2024-0101", "3.1")])
        .await
        .unwrap_err();
    match err {
        GraphError::BatchNotPersisted { new_records, source } => {
            assert_eq!(new_records, 2);
            assert!(matches!(*source, GraphError::PersistenceError { .. }));
        }
        other => panic!("expected BatchNotPersisted, got {:?}", other),
    }
    assert!(store.get_node("nvd:CVE-2024-0100").await.unwrap().is_some());

    store.fail_persist(false);
    assert_eq!(service.ingest(&[nvd("CVE-2024-0100", "8.1")]).await.unwrap(), 0);
}

#[tokio::test]
async fn test_ingested_batch_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = GraphStoreConfig::embedded(dir.path().join("graph.json"));

    let store: Arc<dyn GraphStore> = Arc::new(EmbeddedGraphStore::from_config(&config).unwrap());
    IngestionService::new(Arc::clone(&store))
        .ingest(&[
            nvd("CVE-2024-0200", "9.1"),
            ThreatRecord::new("urlhaus", "u-77", "Emotet payload URL")
                .with_metadata("ai_risk_score", 0.93)
                .with_metadata("anomaly_score", -0.2),
        ])
        .await
        .unwrap();

    let reopened = EmbeddedGraphStore::from_config(&config).unwrap();
    let malware = reopened.get_node("urlhaus:u-77").await.unwrap().unwrap();
    assert_eq!(malware.node_type, "malware");
    assert_eq!(malware.properties["ai_risk_score"], json!(0.93));
    assert_eq!(malware.properties["anomaly_score"], json!(-0.2));
    assert!(malware.properties.contains_key("discovered"));
}
