//! Backend selection: an unreachable or silent live database never fails
//! or hangs construction.

use std::time::Duration;

use vajra_graph::{
    connect_store, BackendPreference, GraphStore, GraphStoreConfig, Neo4jConfig, StoreMode,
};

fn unreachable_config(dir: &std::path::Path, backend: BackendPreference) -> GraphStoreConfig {
    GraphStoreConfig {
        backend,
        neo4j: Neo4jConfig {
            // nothing listens on port 1
            uri: "neo4j://127.0.0.1:1".to_string(),
            connection_timeout: Duration::from_secs(2),
            query_timeout: Duration::from_secs(2),
            ..Neo4jConfig::default()
        },
        ..GraphStoreConfig::embedded(dir.join("graph.json"))
    }
}

#[test_log::test(tokio::test)]
async fn test_auto_falls_back_to_embedded() {
    let dir = tempfile::tempdir().unwrap();
    let store = connect_store(&unreachable_config(dir.path(), BackendPreference::Auto))
        .await
        .unwrap();
    assert_eq!(store.mode(), StoreMode::Embedded);
}

#[test_log::test(tokio::test)]
async fn test_live_preference_still_falls_back() {
    let dir = tempfile::tempdir().unwrap();
    let store = connect_store(&unreachable_config(dir.path(), BackendPreference::Live))
        .await
        .unwrap();
    assert_eq!(store.mode(), StoreMode::Embedded);
}

#[tokio::test]
async fn test_embedded_preference_never_probes() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = unreachable_config(dir.path(), BackendPreference::Embedded);
    config.neo4j.connection_timeout = Duration::from_secs(600);

    let store = tokio::time::timeout(Duration::from_secs(5), connect_store(&config))
        .await
        .expect("embedded construction must not wait on the network")
        .unwrap();
    assert_eq!(store.mode(), StoreMode::Embedded);
}

#[tokio::test]
async fn test_fallback_store_is_usable_and_persists() {
    let dir = tempfile::tempdir().unwrap();
    let config = unreachable_config(dir.path(), BackendPreference::Auto);
    let store = connect_store(&config).await.unwrap();

    vajra_graph::seed_demo_graph(store.as_ref()).await.unwrap();
    store.close().await.unwrap();
    assert!(config.snapshot_path.exists());

    let again = connect_store(&config).await.unwrap();
    assert_eq!(again.get_statistics().await.unwrap().total_nodes, 10);
}

/// A server that accepts connections and never answers the handshake.
async fn silent_server() -> (String, tokio::task::JoinHandle<()>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    (format!("neo4j://{}", addr), handle)
}

fn silent_config(dir: &std::path::Path, uri: String, backend: BackendPreference) -> GraphStoreConfig {
    let mut config = unreachable_config(dir, backend);
    config.neo4j.uri = uri;
    config.neo4j.connection_timeout = Duration::from_secs(1);
    config.neo4j.query_timeout = Duration::from_secs(1);
    config
}

#[cfg(feature = "neo4j")]
#[test_log::test(tokio::test)]
async fn test_silent_server_times_out_on_connect() {
    use vajra_graph::{BackendError, Neo4jGraphStore};

    let dir = tempfile::tempdir().unwrap();
    let (uri, server) = silent_server().await;
    let config = silent_config(dir.path(), uri, BackendPreference::Live);

    let result = tokio::time::timeout(
        Duration::from_secs(10),
        Neo4jGraphStore::connect(config.neo4j.clone(), false),
    )
    .await
    .expect("connect must give up on its own timeout");
    match result {
        Err(BackendError::Timeout { operation, after }) => {
            assert_eq!(operation, "connect");
            assert_eq!(after, Duration::from_secs(1));
        }
        Err(other) => panic!("expected a connect timeout, got {}", other),
        Ok(_) => panic!("a silent server must not yield a live store"),
    }
    server.abort();
}

#[test_log::test(tokio::test)]
async fn test_silent_server_falls_back_within_timeout() {
    let dir = tempfile::tempdir().unwrap();
    let (uri, server) = silent_server().await;

    for backend in [BackendPreference::Auto, BackendPreference::Live] {
        let config = silent_config(dir.path(), uri.clone(), backend);
        let store = tokio::time::timeout(Duration::from_secs(10), connect_store(&config))
            .await
            .expect("store construction must not hang on a silent server")
            .unwrap();
        assert_eq!(store.mode(), StoreMode::Embedded);
    }
    server.abort();
}
