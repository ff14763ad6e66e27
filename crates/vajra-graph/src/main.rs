use std::sync::Arc;

use anyhow::Context;
use tokio::sync::mpsc;

use vajra_graph::{
    connect_store, init_tracing, seed_demo_graph,
    services::{GraphClient, IngestionMessage, IngestionService, QueryService},
    GraphStore, GraphStoreConfig, ThreatRecord,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = GraphStoreConfig::from_env().context("loading graph store configuration")?;
    init_tracing();

    let store = connect_store(&config).await.context("opening graph store")?;
    println!("Graph store connected (mode: {})", store.mode());

    seed_demo_graph(store.as_ref())
        .await
        .context("seeding demo threat graph")?;

    // Wire the ingestion service the way a crawler would reach it
    let (ingestion_tx, ingestion_rx) = mpsc::channel::<IngestionMessage>(16);
    let mut ingestion_service = IngestionService::with_receiver(Arc::clone(&store), ingestion_rx);
    let ingestion_handle = tokio::spawn(async move {
        if let Err(e) = ingestion_service.run().await {
            tracing::error!("Ingestion service error: {:?}", e);
        }
    });
    let client = GraphClient::new(ingestion_tx, QueryService::new(Arc::clone(&store)));

    let new_records = client
        .ingest(vec![ThreatRecord::new("nvd", "CVE-2024-3400", "PAN-OS GlobalProtect command injection")
            .with_summary("OS command injection in the GlobalProtect gateway")
            .with_metadata("cvss_score", "10.0")])
        .await
        .context("ingesting sample record")?;
    println!("Ingested {} new record(s)", new_records);

    let queries = client.queries();
    let stats = queries.statistics().await?;
    println!("Graph statistics:");
    println!("  Total nodes: {}", stats.total_nodes);
    println!("  Total relationships: {}", stats.total_relationships);
    println!("  Node types:");
    for (node_type, count) in &stats.node_types {
        println!("    - {}: {}", node_type, count);
    }
    println!("  Relationship types:");
    for (rel_type, count) in &stats.relationship_types {
        println!("    - {}: {}", rel_type, count);
    }

    println!("Entities related to APT29:");
    for node in queries.related("APT29", None, 1).await? {
        println!("  - {} ({})", node.id, node.node_type);
    }

    println!("Attack paths APT29 -> C2-Server-Alpha:");
    for (i, path) in queries
        .attack_paths("APT29", "C2-Server-Alpha", 5)
        .await?
        .iter()
        .enumerate()
    {
        println!("  {}. {}", i + 1, path.join(" -> "));
    }

    drop(client);
    ingestion_handle
        .await
        .context("ingestion service task panicked")?;

    store.close().await.context("closing graph store")?;
    Ok(())
}
