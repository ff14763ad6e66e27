use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::data::{
    AttackPath, GraphError, GraphStatistics, Node, Properties, Relationship, StoreMode,
    UpsertOutcome,
};
use crate::storage::EmbeddedGraphStore;
use crate::traits::GraphStore;

/// A `GraphStore` for tests: an in-memory embedded store that counts upsert
/// and persist calls, and can be told to fail persisting.
#[derive(Default)]
pub struct RecordingGraphStore {
    inner: EmbeddedGraphStore,
    upserts: AtomicUsize,
    persists: AtomicUsize,
    fail_persist: AtomicBool,
}

impl RecordingGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following `persist` fail with a `PersistenceError`.
    pub fn fail_persist(&self, fail: bool) {
        self.fail_persist.store(fail, Ordering::SeqCst);
    }

    pub fn upsert_calls(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }

    pub fn persist_calls(&self) -> usize {
        self.persists.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GraphStore for RecordingGraphStore {
    fn mode(&self) -> StoreMode {
        self.inner.mode()
    }

    async fn create_node(&self, node: Node) -> Result<(), GraphError> {
        self.inner.create_node(node).await
    }

    async fn upsert_node(
        &self,
        id: &str,
        node_type: &str,
        properties: Properties,
    ) -> Result<UpsertOutcome, GraphError> {
        self.upserts.fetch_add(1, Ordering::SeqCst);
        self.inner.upsert_node(id, node_type, properties).await
    }

    async fn create_relationship(&self, relationship: Relationship) -> Result<(), GraphError> {
        self.inner.create_relationship(relationship).await
    }

    async fn get_node(&self, id: &str) -> Result<Option<Node>, GraphError> {
        self.inner.get_node(id).await
    }

    async fn find_related_nodes(
        &self,
        id: &str,
        relationship_type: Option<&str>,
        max_depth: usize,
    ) -> Result<Vec<Node>, GraphError> {
        self.inner.find_related_nodes(id, relationship_type, max_depth).await
    }

    async fn find_attack_paths(
        &self,
        source_id: &str,
        target_id: &str,
        max_length: usize,
    ) -> Result<Vec<AttackPath>, GraphError> {
        self.inner.find_attack_paths(source_id, target_id, max_length).await
    }

    async fn get_statistics(&self) -> Result<GraphStatistics, GraphError> {
        self.inner.get_statistics().await
    }

    async fn list_nodes(
        &self,
        node_types: Option<&[&str]>,
        offset: usize,
        limit: usize,
    ) -> Result<(Vec<Node>, usize), GraphError> {
        self.inner.list_nodes(node_types, offset, limit).await
    }

    async fn search_nodes(&self, query: &str, limit: usize) -> Result<Vec<Node>, GraphError> {
        self.inner.search_nodes(query, limit).await
    }

    async fn clear(&self) -> Result<(), GraphError> {
        self.inner.clear().await
    }

    async fn persist(&self) -> Result<(), GraphError> {
        self.persists.fetch_add(1, Ordering::SeqCst);
        if self.fail_persist.load(Ordering::SeqCst) {
            return Err(GraphError::persistence(
                "simulated snapshot write failure",
                None::<std::io::Error>,
            ));
        }
        self.inner.persist().await
    }
}
