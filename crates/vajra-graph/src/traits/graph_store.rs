//! GraphStore trait definition: the one operation set both backends serve

use async_trait::async_trait;

use crate::data::{
    AttackPath, GraphError, GraphStatistics, Node, Properties, Relationship, StoreMode,
    UpsertOutcome,
};

/// Upper bound on nodes returned by `find_related_nodes`.
pub const RELATED_NODES_LIMIT: usize = 100;

/// Upper bound on paths returned by `find_attack_paths`.
pub const ATTACK_PATHS_LIMIT: usize = 10;

/// Represents the interface for the threat graph, regardless of whether a live
/// graph database or the embedded in-process store answers it.
///
/// Traversal cost grows as O(branching^depth): callers should keep `max_depth`
/// and `max_length` small.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// The backend servicing this instance. Never changes after construction.
    fn mode(&self) -> StoreMode;

    /// Creates a node, replacing any existing node with the same id wholesale.
    async fn create_node(&self, node: Node) -> Result<(), GraphError>;

    /// Creates the node if absent, otherwise merges `properties` over the
    /// existing ones (new values win) and sets its type.
    async fn upsert_node(
        &self,
        id: &str,
        node_type: &str,
        properties: Properties,
    ) -> Result<UpsertOutcome, GraphError>;

    /// Appends a relationship. There is no update or delete for relationships.
    async fn create_relationship(&self, relationship: Relationship) -> Result<(), GraphError>;

    /// Looks up a node by id. Absence is `Ok(None)`.
    async fn get_node(&self, id: &str) -> Result<Option<Node>, GraphError>;

    /// Distinct nodes reachable from `id` over outgoing relationships within
    /// `max_depth` hops, optionally restricted to one relationship type.
    /// Excludes the start node and is capped at [`RELATED_NODES_LIMIT`].
    /// Unknown ids yield an empty result.
    async fn find_related_nodes(
        &self,
        id: &str,
        relationship_type: Option<&str>,
        max_depth: usize,
    ) -> Result<Vec<Node>, GraphError>;

    /// Simple directed paths from `source_id` to `target_id` of at most
    /// `max_length` hops, capped at [`ATTACK_PATHS_LIMIT`]. Unknown endpoints
    /// yield an empty result.
    async fn find_attack_paths(
        &self,
        source_id: &str,
        target_id: &str,
        max_length: usize,
    ) -> Result<Vec<AttackPath>, GraphError>;

    async fn get_statistics(&self) -> Result<GraphStatistics, GraphError>;

    /// Nodes ordered by id, optionally restricted to a set of types, with the
    /// total count of matching nodes.
    async fn list_nodes(
        &self,
        node_types: Option<&[&str]>,
        offset: usize,
        limit: usize,
    ) -> Result<(Vec<Node>, usize), GraphError>;

    /// Case-insensitive substring search over id, title, name and description.
    async fn search_nodes(&self, query: &str, limit: usize) -> Result<Vec<Node>, GraphError>;

    /// Removes every node and relationship (and the embedded snapshot file).
    async fn clear(&self) -> Result<(), GraphError>;

    /// Flushes durable state. A no-op for the live backend.
    async fn persist(&self) -> Result<(), GraphError>;

    /// Flushes and releases the store.
    async fn close(&self) -> Result<(), GraphError> {
        self.persist().await
    }
}

/// Case-insensitive match used by the embedded search.
pub(crate) fn node_matches_query(node: &Node, needle_lower: &str) -> bool {
    if node.id.to_lowercase().contains(needle_lower) {
        return true;
    }
    ["title", "name", "description"].iter().any(|key| {
        node.property_str(key)
            .map(|v| v.to_lowercase().contains(needle_lower))
            .unwrap_or(false)
    })
}
