use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};

use crate::config::GraphStoreConfig;
use crate::data::{
    AttackPath, GraphError, GraphStatistics, Node, Properties, Relationship, StoreMode,
    UpsertOutcome,
};
use crate::storage::snapshot::{GraphSnapshot, SnapshotFile};
use crate::storage::traversal;
use crate::traits::graph_store::{node_matches_query, GraphStore, ATTACK_PATHS_LIMIT, RELATED_NODES_LIMIT};

/// Node mapping and relationship sequence, guarded together by one lock
/// because traversals read across both.
#[derive(Debug, Default)]
struct GraphState {
    nodes: HashMap<String, Node>,
    relationships: Vec<Relationship>,
}

impl GraphState {
    fn from_snapshot(snapshot: GraphSnapshot) -> Self {
        let mut nodes = HashMap::with_capacity(snapshot.nodes.len());
        for node in snapshot.nodes {
            if let Err(e) = node.validate() {
                warn!(error = %e, "Skipping invalid node in snapshot");
                continue;
            }
            nodes.insert(node.id.clone(), node);
        }
        let relationships = snapshot
            .relationships
            .into_iter()
            .filter(|rel| match rel.validate() {
                Ok(()) => true,
                Err(e) => {
                    warn!(error = %e, "Skipping invalid relationship in snapshot");
                    false
                }
            })
            .collect();
        Self { nodes, relationships }
    }

    fn to_snapshot(&self) -> GraphSnapshot {
        let mut nodes: Vec<Node> = self.nodes.values().cloned().collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        GraphSnapshot {
            nodes,
            relationships: self.relationships.clone(),
        }
    }
}

/// In-process graph store, optionally backed by a snapshot file.
///
/// Mutations take the write lock; reads share the read lock. Nothing is
/// written to disk until [`GraphStore::persist`] or [`GraphStore::close`].
pub struct EmbeddedGraphStore {
    state: Arc<RwLock<GraphState>>,
    snapshot: Option<SnapshotFile>,
    // Serializes snapshot writers so an older copy never lands after a newer one.
    save_lock: Mutex<()>,
    enforce_referential_integrity: bool,
}

impl EmbeddedGraphStore {
    /// A store with no snapshot file; `persist` is a no-op.
    pub fn in_memory() -> Self {
        Self {
            state: Arc::new(RwLock::new(GraphState::default())),
            snapshot: None,
            save_lock: Mutex::new(()),
            enforce_referential_integrity: false,
        }
    }

    /// Opens a store, loading `snapshot` if it exists.
    pub fn open(snapshot: SnapshotFile) -> Result<Self, GraphError> {
        let state = GraphState::from_snapshot(snapshot.load()?);
        info!(
            path = %snapshot.path().display(),
            nodes = state.nodes.len(),
            relationships = state.relationships.len(),
            "Opened embedded graph store"
        );
        Ok(Self {
            state: Arc::new(RwLock::new(state)),
            snapshot: Some(snapshot),
            save_lock: Mutex::new(()),
            enforce_referential_integrity: false,
        })
    }

    pub fn from_config(config: &GraphStoreConfig) -> Result<Self, GraphError> {
        let snapshot = SnapshotFile::new(&config.snapshot_path, config.corrupt_snapshot_policy);
        Ok(Self::open(snapshot)?.with_referential_integrity(config.enforce_referential_integrity))
    }

    /// Rejects relationships whose endpoints are not stored nodes.
    pub fn with_referential_integrity(mut self, enforce: bool) -> Self {
        self.enforce_referential_integrity = enforce;
        self
    }

    pub fn snapshot_path(&self) -> Option<&Path> {
        self.snapshot.as_ref().map(|s| s.path())
    }

    /// Consistent copy of the full state.
    pub async fn snapshot(&self) -> GraphSnapshot {
        self.state.read().await.to_snapshot()
    }
}

impl Default for EmbeddedGraphStore {
    fn default() -> Self {
        Self::in_memory()
    }
}

#[async_trait]
impl GraphStore for EmbeddedGraphStore {
    fn mode(&self) -> StoreMode {
        StoreMode::Embedded
    }

    #[instrument(skip(self, node), fields(node_id = %node.id))]
    async fn create_node(&self, node: Node) -> Result<(), GraphError> {
        node.validate()?;
        let mut state = self.state.write().await;
        state.nodes.insert(node.id.clone(), node);
        debug!("Created node");
        Ok(())
    }

    #[instrument(skip(self, properties))]
    async fn upsert_node(
        &self,
        id: &str,
        node_type: &str,
        properties: Properties,
    ) -> Result<UpsertOutcome, GraphError> {
        let incoming = Node::new(id, node_type, Properties::new())?;
        let mut state = self.state.write().await;
        match state.nodes.get_mut(id) {
            Some(existing) => {
                existing.node_type = incoming.node_type;
                existing.merge_properties(properties);
                Ok(UpsertOutcome::Updated)
            }
            None => {
                let mut node = incoming;
                node.properties = properties;
                state.nodes.insert(node.id.clone(), node);
                Ok(UpsertOutcome::Created)
            }
        }
    }

    #[instrument(skip(self, relationship), fields(
        source_id = %relationship.source_id,
        target_id = %relationship.target_id,
        rel_type = %relationship.relationship_type,
    ))]
    async fn create_relationship(&self, relationship: Relationship) -> Result<(), GraphError> {
        relationship.validate()?;
        let mut state = self.state.write().await;
        if self.enforce_referential_integrity {
            for endpoint in [&relationship.source_id, &relationship.target_id] {
                if !state.nodes.contains_key(endpoint) {
                    return Err(GraphError::ValidationError(format!(
                        "relationship endpoint '{}' does not exist",
                        endpoint
                    )));
                }
            }
        }
        state.relationships.push(relationship);
        debug!("Created relationship");
        Ok(())
    }

    async fn get_node(&self, id: &str) -> Result<Option<Node>, GraphError> {
        Ok(self.state.read().await.nodes.get(id).cloned())
    }

    #[instrument(skip(self))]
    async fn find_related_nodes(
        &self,
        id: &str,
        relationship_type: Option<&str>,
        max_depth: usize,
    ) -> Result<Vec<Node>, GraphError> {
        let state = self.state.read().await;
        if !state.nodes.contains_key(id) {
            debug!("Start node unknown, no related nodes");
            return Ok(Vec::new());
        }
        let ids = traversal::related_node_ids(
            &state.relationships,
            id,
            relationship_type,
            max_depth,
            RELATED_NODES_LIMIT,
            |candidate| state.nodes.contains_key(candidate),
        );
        Ok(ids
            .iter()
            .filter_map(|related| state.nodes.get(related).cloned())
            .collect())
    }

    #[instrument(skip(self))]
    async fn find_attack_paths(
        &self,
        source_id: &str,
        target_id: &str,
        max_length: usize,
    ) -> Result<Vec<AttackPath>, GraphError> {
        let state = self.state.read().await;
        if !state.nodes.contains_key(source_id) || !state.nodes.contains_key(target_id) {
            debug!("Attack path endpoint unknown, no paths");
            return Ok(Vec::new());
        }
        Ok(traversal::attack_paths(
            &state.relationships,
            source_id,
            target_id,
            max_length,
            ATTACK_PATHS_LIMIT,
        ))
    }

    async fn get_statistics(&self) -> Result<GraphStatistics, GraphError> {
        let state = self.state.read().await;
        let mut stats = GraphStatistics {
            total_nodes: state.nodes.len(),
            total_relationships: state.relationships.len(),
            ..Default::default()
        };
        for node in state.nodes.values() {
            *stats.node_types.entry(node.node_type.clone()).or_insert(0) += 1;
        }
        for rel in &state.relationships {
            *stats
                .relationship_types
                .entry(rel.relationship_type.clone())
                .or_insert(0) += 1;
        }
        Ok(stats)
    }

    async fn list_nodes(
        &self,
        node_types: Option<&[&str]>,
        offset: usize,
        limit: usize,
    ) -> Result<(Vec<Node>, usize), GraphError> {
        let state = self.state.read().await;
        let mut matching: Vec<&Node> = state
            .nodes
            .values()
            .filter(|n| node_types.map_or(true, |types| types.contains(&n.node_type.as_str())))
            .collect();
        matching.sort_by(|a, b| a.id.cmp(&b.id));
        let total = matching.len();
        let items = matching
            .into_iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect();
        Ok((items, total))
    }

    async fn search_nodes(&self, query: &str, limit: usize) -> Result<Vec<Node>, GraphError> {
        let needle = query.to_lowercase();
        let state = self.state.read().await;
        let mut matches: Vec<Node> = state
            .nodes
            .values()
            .filter(|n| node_matches_query(n, &needle))
            .cloned()
            .collect();
        matches.sort_by(|a, b| a.id.cmp(&b.id));
        matches.truncate(limit);
        Ok(matches)
    }

    #[instrument(skip(self))]
    async fn clear(&self) -> Result<(), GraphError> {
        let _guard = self.save_lock.lock().await;
        {
            let mut state = self.state.write().await;
            state.nodes.clear();
            state.relationships.clear();
        }
        warn!("Cleared embedded graph");
        if let Some(file) = &self.snapshot {
            file.remove()?;
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn persist(&self) -> Result<(), GraphError> {
        let Some(file) = self.snapshot.clone() else {
            return Ok(());
        };
        let _guard = self.save_lock.lock().await;
        // Copy under the read lock, write without it.
        let snapshot = self.snapshot().await;
        tokio::task::spawn_blocking(move || file.save(&snapshot))
            .await
            .map_err(|e| GraphError::Internal(format!("snapshot writer task failed: {}", e)))?
    }
}
