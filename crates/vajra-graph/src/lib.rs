//! Vajra threat intelligence graph store
//!
//! One [`GraphStore`] contract served either by a live Neo4j database or by
//! the embedded in-process store with atomic snapshot persistence.

// Core modules
pub mod config;
pub mod data;
pub mod services;
pub mod storage;
pub mod traits;

// Live backend adapters
pub mod adapters;

// Testing utilities shared with the integration tests
pub mod test_utils;

use std::sync::Arc;

use tracing::info;
#[cfg(feature = "neo4j")]
use tracing::{error, warn};

// Re-export key types for convenient usage
pub use config::{BackendPreference, CorruptSnapshotPolicy, GraphStoreConfig, Neo4jConfig};
pub use data::{
    properties, AttackPath, BackendError, GraphError, GraphStatistics, Node, Page, Properties,
    Relationship, Severity, StoreMode, ThreatRecord, UpsertOutcome,
};
pub use storage::{EmbeddedGraphStore, GraphSnapshot, SnapshotFile};

// Re-export core traits
pub use traits::{GraphStore, ATTACK_PATHS_LIMIT, RELATED_NODES_LIMIT};

// Re-export core services
pub use services::{
    seed_demo_graph, GraphClient, IngestionMessage, IngestionReport, IngestionService,
    QueryService,
};

#[cfg(feature = "neo4j")]
pub use adapters::Neo4jGraphStore;

/// Initialize tracing for the graph store
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let builder = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    if json_log_format(std::env::var(LOG_FORMAT_VAR).ok().as_deref()) {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Set to `json` for one JSON object per log line.
pub const LOG_FORMAT_VAR: &str = "VAJRA_LOG_FORMAT";

fn json_log_format(value: Option<&str>) -> bool {
    value.map_or(false, |v| v.trim().eq_ignore_ascii_case("json"))
}

/// Creates the store the process will use for its whole lifetime.
///
/// Unless the configuration asks for embedded mode, the live backend is
/// probed first. A failed probe is never fatal: the embedded store is opened
/// instead and the failure is logged. Only an embedded snapshot that cannot
/// be opened (quarantined, unreadable) fails construction.
pub async fn connect_store(config: &GraphStoreConfig) -> Result<Arc<dyn GraphStore>, GraphError> {
    if config.backend != BackendPreference::Embedded {
        if let Some(live) = connect_live(config).await {
            return Ok(live);
        }
    }

    let store = EmbeddedGraphStore::from_config(config)?;
    info!(
        snapshot = %config.snapshot_path.display(),
        "Using embedded graph backend"
    );
    Ok(Arc::new(store))
}

#[cfg(feature = "neo4j")]
async fn connect_live(config: &GraphStoreConfig) -> Option<Arc<dyn GraphStore>> {
    match Neo4jGraphStore::connect(config.neo4j.clone(), config.enforce_referential_integrity).await {
        Ok(store) => {
            info!(uri = %config.neo4j.uri, "Using live Neo4j graph backend");
            Some(Arc::new(store))
        }
        Err(e) if config.backend == BackendPreference::Live => {
            error!(
                uri = %config.neo4j.uri,
                error = %e,
                "Live graph backend requested but unreachable, falling back to embedded store"
            );
            None
        }
        Err(e) => {
            warn!(
                uri = %config.neo4j.uri,
                error = %e,
                "Neo4j unavailable, falling back to embedded store"
            );
            None
        }
    }
}

#[cfg(not(feature = "neo4j"))]
async fn connect_live(config: &GraphStoreConfig) -> Option<Arc<dyn GraphStore>> {
    if config.backend == BackendPreference::Live {
        tracing::error!("Live graph backend requested but the neo4j feature is disabled");
    }
    None
}
