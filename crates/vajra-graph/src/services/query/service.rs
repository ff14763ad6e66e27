use std::sync::Arc;

use tracing::{debug, instrument};

use crate::{
    data::{AttackPath, GraphError, GraphStatistics, Node, Page, StoreMode},
    traits::GraphStore,
};

/// Node types returned by the threat listing.
pub const THREAT_NODE_TYPES: &[&str] = &["ThreatActor", "Malware", "malware", "Campaign"];

/// Default and maximum number of hits returned by [`QueryService::search`].
pub const DEFAULT_SEARCH_LIMIT: usize = 50;

/// Read-side views over the graph used by the presentation layer.
#[derive(Clone)]
pub struct QueryService {
    store: Arc<dyn GraphStore>,
}

impl QueryService {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { store }
    }

    pub fn mode(&self) -> StoreMode {
        self.store.mode()
    }

    pub async fn statistics(&self) -> Result<GraphStatistics, GraphError> {
        self.store.get_statistics().await
    }

    /// One page of threat nodes (actors, malware, campaigns), ordered by id.
    pub async fn list_threats(&self, page: usize, limit: usize) -> Result<Page<Node>, GraphError> {
        self.list_nodes(Some(THREAT_NODE_TYPES), page, limit).await
    }

    /// One page of nodes, optionally restricted to `node_types`. Pages start at 1.
    #[instrument(skip(self))]
    pub async fn list_nodes(
        &self,
        node_types: Option<&[&str]>,
        page: usize,
        limit: usize,
    ) -> Result<Page<Node>, GraphError> {
        if page == 0 || limit == 0 {
            return Err(GraphError::ValidationError(format!(
                "page and limit must be positive (page={}, limit={})",
                page, limit
            )));
        }
        let offset = (page - 1).saturating_mul(limit);
        let (items, total) = self.store.list_nodes(node_types, offset, limit).await?;
        debug!(returned = items.len(), total, "Listed nodes");
        Ok(Page {
            items,
            total,
            page,
            limit,
        })
    }

    /// Case-insensitive substring search over id, title, name and description.
    /// A blank query matches nothing.
    pub async fn search(&self, query: &str, limit: Option<usize>) -> Result<Vec<Node>, GraphError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let limit = limit
            .unwrap_or(DEFAULT_SEARCH_LIMIT)
            .clamp(1, DEFAULT_SEARCH_LIMIT);
        self.store.search_nodes(query, limit).await
    }

    /// Direct lookup; absence is a `NotFound` error.
    pub async fn get_threat(&self, id: &str) -> Result<Node, GraphError> {
        self.store
            .get_node(id)
            .await?
            .ok_or_else(|| GraphError::not_found("Node", id))
    }

    pub async fn related(
        &self,
        id: &str,
        relationship_type: Option<&str>,
        max_depth: usize,
    ) -> Result<Vec<Node>, GraphError> {
        self.store.find_related_nodes(id, relationship_type, max_depth).await
    }

    pub async fn attack_paths(
        &self,
        source_id: &str,
        target_id: &str,
        max_length: usize,
    ) -> Result<Vec<AttackPath>, GraphError> {
        self.store.find_attack_paths(source_id, target_id, max_length).await
    }
}
