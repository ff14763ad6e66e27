use std::future::Future;

use async_trait::async_trait;
use neo4rs::{ConfigBuilder, Graph, Query, Row};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::config::Neo4jConfig;
use crate::data::{
    AttackPath, BackendError, GraphError, GraphStatistics, Node, Properties, Relationship,
    StoreMode, UpsertOutcome,
};
use crate::traits::graph_store::{GraphStore, ATTACK_PATHS_LIMIT, RELATED_NODES_LIMIT};

/// Label carried by every node this store writes.
const ENTITY_LABEL: &str = "ThreatEntity";

// Define a macro for Neo4j tracing with the operation name
macro_rules! trace_neo4j {
    ($op:expr, $($arg:tt)*) => {
        debug!("[Neo4j:{}] {}", $op, format!($($arg)*));
    };
}

/// A typed query parameter; `neo4rs::Query::param` is generic so values are
/// bound through this enum.
#[derive(Debug, Clone, PartialEq)]
enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    TextList(Vec<String>),
}

impl ParamValue {
    /// Maps a JSON property onto something Neo4j can store. Nulls are skipped;
    /// nested objects and mixed arrays are stored as JSON text.
    fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Bool(b) => Some(Self::Bool(*b)),
            Value::Number(n) => n
                .as_i64()
                .map(Self::Int)
                .or_else(|| n.as_f64().map(Self::Float)),
            Value::String(s) => Some(Self::Text(s.clone())),
            Value::Array(items) if items.iter().all(Value::is_string) => Some(Self::TextList(
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect(),
            )),
            Value::Array(_) | Value::Object(_) => Some(Self::Text(value.to_string())),
        }
    }
}

fn bind(query: Query, key: &str, value: ParamValue) -> Query {
    match value {
        ParamValue::Bool(b) => query.param(key, b),
        ParamValue::Int(i) => query.param(key, i),
        ParamValue::Float(f) => query.param(key, f),
        ParamValue::Text(s) => query.param(key, s),
        ParamValue::TextList(list) => query.param(key, list),
    }
}

/// Backtick-quotes a label, relationship type or property key.
fn quote_identifier(raw: &str) -> String {
    format!("`{}`", raw.replace('`', "``"))
}

/// SET assignments for `properties` on variable `var`, with their parameters.
fn property_assignments(var: &str, properties: &Properties) -> (Vec<String>, Vec<(String, ParamValue)>) {
    let mut clauses = Vec::new();
    let mut params = Vec::new();
    for (i, (key, value)) in properties.iter().enumerate() {
        if key == "node_id" || key == "node_type" {
            continue;
        }
        let Some(param) = ParamValue::from_json(value) else { continue };
        let name = format!("{}_p{}", var, i);
        clauses.push(format!("{}.{} = ${}", var, quote_identifier(key), name));
        params.push((name, param));
    }
    (clauses, params)
}

fn node_projection(var: &str) -> String {
    format!(
        "{v}.node_id AS node_id, {v}.node_type AS node_type, properties({v}) AS props",
        v = var
    )
}

fn row_to_node(row: &Row) -> Result<Node, BackendError> {
    let id: String = row
        .get("node_id")
        .map_err(|e| BackendError::MappingError(format!("node_id missing from row: {}", e)))?;
    let node_type: String = row.get("node_type").unwrap_or_else(|_| "Unknown".to_string());
    let props: Value = row
        .get("props")
        .map_err(|e| BackendError::MappingError(format!("properties of '{}' unreadable: {}", id, e)))?;
    let mut properties = match props {
        Value::Object(map) => map,
        _ => Properties::new(),
    };
    properties.remove("node_id");
    properties.remove("node_type");
    Ok(Node {
        id,
        node_type,
        properties,
    })
}

fn row_count(row: &Row, column: &str) -> Result<usize, BackendError> {
    let count: i64 = row
        .get(column)
        .map_err(|e| BackendError::MappingError(format!("{} missing from row: {}", column, e)))?;
    Ok(count.max(0) as usize)
}

/// Live Neo4j implementation of the `GraphStore` trait.
///
/// Nodes are stored with the `ThreatEntity` label, keyed by a `node_id`
/// property, with their category in `node_type`.
pub struct Neo4jGraphStore {
    graph: Graph,
    config: Neo4jConfig,
    enforce_referential_integrity: bool,
}

impl Neo4jGraphStore {
    /// Returns the configuration used for this store
    pub fn get_config(&self) -> &Neo4jConfig {
        &self.config
    }

    /// Connects and runs the reachability probe. Any failure, including a
    /// timeout, is returned so the caller can fall back to embedded mode.
    pub async fn connect(
        config: Neo4jConfig,
        enforce_referential_integrity: bool,
    ) -> Result<Self, BackendError> {
        let mut config_builder = ConfigBuilder::default()
            .uri(&config.uri)
            .user(&config.username)
            .password(&config.password)
            .max_connections(config.pool_size);

        if let Some(db) = &config.database {
            config_builder = config_builder.db(db.as_str());
        }

        let neo4j_config = config_builder
            .build()
            .map_err(|e| BackendError::ConnectionError(format!("Failed to build Neo4j config: {}", e)))?;

        let graph = tokio::time::timeout(config.connection_timeout, Graph::connect(neo4j_config))
            .await
            .map_err(|_| BackendError::Timeout {
                operation: "connect".to_string(),
                after: config.connection_timeout,
            })?
            .map_err(|e| BackendError::ConnectionError(format!("Failed to connect to {}: {}", config.uri, e)))?;

        let store = Self {
            graph,
            config,
            enforce_referential_integrity,
        };

        // Test the connection with a simple query; the pool may connect lazily,
        // so a silent server surfaces here rather than in `Graph::connect`
        let probe = store
            .with_timeout("connect", store.config.connection_timeout, store.fetch_rows(Query::new("RETURN 1 AS probe".to_string())))
            .await?;
        if probe.is_empty() {
            return Err(BackendError::ConnectionError("probe query returned no rows".to_string()));
        }
        info!(uri = %store.config.uri, "Connected to Neo4j");

        store.ensure_constraint().await;
        Ok(store)
    }

    async fn ensure_constraint(&self) {
        let cypher = format!(
            "CREATE CONSTRAINT threat_entity_node_id IF NOT EXISTS FOR (n:{}) REQUIRE n.node_id IS UNIQUE",
            ENTITY_LABEL
        );
        if let Err(e) = self.rows("ensure_constraint", Query::new(cypher)).await {
            warn!(error = %e, "Could not ensure node_id uniqueness constraint");
        }
    }

    async fn fetch_rows(&self, query: Query) -> Result<Vec<Row>, BackendError> {
        let mut result = self
            .graph
            .execute(query)
            .await
            .map_err(|e| BackendError::QueryError(format!("Failed to execute query: {}", e)))?;
        let mut rows = Vec::new();
        while let Some(row) = result
            .next()
            .await
            .map_err(|e| BackendError::QueryError(format!("Failed to read result row: {}", e)))?
        {
            rows.push(row);
        }
        Ok(rows)
    }

    async fn with_timeout<T, F>(&self, operation: &str, after: std::time::Duration, fut: F) -> Result<T, BackendError>
    where
        F: Future<Output = Result<T, BackendError>>,
    {
        tokio::time::timeout(after, fut)
            .await
            .map_err(|_| BackendError::Timeout {
                operation: operation.to_string(),
                after,
            })?
    }

    /// Runs a query under the configured query timeout.
    async fn rows(&self, operation: &str, query: Query) -> Result<Vec<Row>, BackendError> {
        self.with_timeout(operation, self.config.query_timeout, self.fetch_rows(query))
            .await
    }

    async fn nodes(&self, operation: &str, query: Query) -> Result<Vec<Node>, GraphError> {
        let rows = self.rows(operation, query).await?;
        let mut nodes = Vec::with_capacity(rows.len());
        for row in &rows {
            nodes.push(row_to_node(row)?);
        }
        Ok(nodes)
    }
}

#[async_trait]
impl GraphStore for Neo4jGraphStore {
    fn mode(&self) -> StoreMode {
        StoreMode::Live
    }

    #[instrument(skip(self, node), fields(node_id = %node.id))]
    async fn create_node(&self, node: Node) -> Result<(), GraphError> {
        node.validate()?;
        let (assignments, params) = property_assignments("n", &node.properties);
        let mut cypher = format!(
            "MERGE (n:{} {{node_id: $node_id}})\nSET n = {{node_id: $node_id, node_type: $node_type}}\n",
            ENTITY_LABEL
        );
        if !assignments.is_empty() {
            cypher.push_str(&format!("SET {}\n", assignments.join(", ")));
        }
        cypher.push_str("RETURN n.node_id AS node_id");
        trace_neo4j!("create_node", "{}", cypher);

        let mut query = Query::new(cypher)
            .param("node_id", node.id.as_str())
            .param("node_type", node.node_type.as_str());
        for (name, value) in params {
            query = bind(query, &name, value);
        }
        self.rows("create_node", query).await?;
        Ok(())
    }

    #[instrument(skip(self, properties))]
    async fn upsert_node(
        &self,
        id: &str,
        node_type: &str,
        properties: Properties,
    ) -> Result<UpsertOutcome, GraphError> {
        Node::new(id, node_type, Properties::new())?;
        let (assignments, params) = property_assignments("n", &properties);
        let mut cypher = format!(
            "OPTIONAL MATCH (existing:{label} {{node_id: $node_id}})\n\
             WITH existing IS NOT NULL AS existed\n\
             MERGE (n:{label} {{node_id: $node_id}})\n\
             SET n.node_type = $node_type",
            label = ENTITY_LABEL
        );
        for assignment in &assignments {
            cypher.push_str(", ");
            cypher.push_str(assignment);
        }
        cypher.push_str("\nRETURN existed");
        trace_neo4j!("upsert_node", "{}", cypher);

        let mut query = Query::new(cypher)
            .param("node_id", id)
            .param("node_type", node_type);
        for (name, value) in params {
            query = bind(query, &name, value);
        }
        let rows = self.rows("upsert_node", query).await?;
        let existed = rows
            .first()
            .and_then(|row| row.get::<bool>("existed").ok())
            .ok_or_else(|| BackendError::MappingError("upsert returned no 'existed' flag".to_string()))?;
        Ok(if existed {
            UpsertOutcome::Updated
        } else {
            UpsertOutcome::Created
        })
    }

    #[instrument(skip(self, relationship), fields(
        source_id = %relationship.source_id,
        target_id = %relationship.target_id,
        rel_type = %relationship.relationship_type,
    ))]
    async fn create_relationship(&self, relationship: Relationship) -> Result<(), GraphError> {
        relationship.validate()?;
        let (assignments, params) = property_assignments("r", &relationship.properties);
        let mut cypher = format!(
            "MATCH (a:{label} {{node_id: $source_id}})\n\
             MATCH (b:{label} {{node_id: $target_id}})\n\
             CREATE (a)-[r:{rel}]->(b)\n",
            label = ENTITY_LABEL,
            rel = quote_identifier(&relationship.relationship_type)
        );
        if !assignments.is_empty() {
            cypher.push_str(&format!("SET {}\n", assignments.join(", ")));
        }
        cypher.push_str("RETURN count(r) AS created");
        trace_neo4j!("create_relationship", "{}", cypher);

        let mut query = Query::new(cypher)
            .param("source_id", relationship.source_id.as_str())
            .param("target_id", relationship.target_id.as_str());
        for (name, value) in params {
            query = bind(query, &name, value);
        }
        let rows = self.rows("create_relationship", query).await?;
        let created = match rows.first() {
            Some(row) => row_count(row, "created")?,
            None => 0,
        };
        if created == 0 {
            if self.enforce_referential_integrity {
                return Err(GraphError::ValidationError(format!(
                    "relationship endpoints '{}' -> '{}' do not both exist",
                    relationship.source_id, relationship.target_id
                )));
            }
            warn!("Relationship endpoint missing in Neo4j, nothing created");
        }
        Ok(())
    }

    async fn get_node(&self, id: &str) -> Result<Option<Node>, GraphError> {
        let cypher = format!(
            "MATCH (n:{} {{node_id: $node_id}}) RETURN {} LIMIT 1",
            ENTITY_LABEL,
            node_projection("n")
        );
        let mut nodes = self
            .nodes("get_node", Query::new(cypher).param("node_id", id))
            .await?;
        Ok(nodes.pop())
    }

    #[instrument(skip(self))]
    async fn find_related_nodes(
        &self,
        id: &str,
        relationship_type: Option<&str>,
        max_depth: usize,
    ) -> Result<Vec<Node>, GraphError> {
        if max_depth == 0 {
            return Ok(Vec::new());
        }
        let rel_filter = relationship_type
            .map(|t| format!(":{}", quote_identifier(t)))
            .unwrap_or_default();
        let cypher = format!(
            "MATCH (start:{label} {{node_id: $node_id}})-[{rel}*1..{depth}]->(related:{label})\n\
             WHERE related.node_id <> $node_id\n\
             WITH DISTINCT related\n\
             RETURN {projection}\n\
             LIMIT {limit}",
            label = ENTITY_LABEL,
            rel = rel_filter,
            depth = max_depth,
            projection = node_projection("related"),
            limit = RELATED_NODES_LIMIT
        );
        trace_neo4j!("find_related_nodes", "{}", cypher);
        self.nodes("find_related_nodes", Query::new(cypher).param("node_id", id))
            .await
    }

    #[instrument(skip(self))]
    async fn find_attack_paths(
        &self,
        source_id: &str,
        target_id: &str,
        max_length: usize,
    ) -> Result<Vec<AttackPath>, GraphError> {
        if source_id == target_id {
            return Ok(match self.get_node(source_id).await? {
                Some(_) => vec![vec![source_id.to_string()]],
                None => Vec::new(),
            });
        }
        if max_length == 0 {
            return Ok(Vec::new());
        }
        let cypher = format!(
            "MATCH p = (s:{label} {{node_id: $source_id}})-[*1..{hops}]->(t:{label} {{node_id: $target_id}})\n\
             WHERE ALL(x IN nodes(p) WHERE single(y IN nodes(p) WHERE y = x))\n\
             WITH DISTINCT [x IN nodes(p) | x.node_id] AS path, length(p) AS hops\n\
             RETURN path\n\
             ORDER BY hops\n\
             LIMIT {limit}",
            label = ENTITY_LABEL,
            hops = max_length,
            limit = ATTACK_PATHS_LIMIT
        );
        trace_neo4j!("find_attack_paths", "{}", cypher);
        let rows = self
            .rows(
                "find_attack_paths",
                Query::new(cypher)
                    .param("source_id", source_id)
                    .param("target_id", target_id),
            )
            .await?;
        let mut paths = Vec::with_capacity(rows.len());
        for row in &rows {
            let path: Vec<String> = row
                .get("path")
                .map_err(|e| BackendError::MappingError(format!("path column unreadable: {}", e)))?;
            paths.push(path);
        }
        Ok(paths)
    }

    async fn get_statistics(&self) -> Result<GraphStatistics, GraphError> {
        let mut stats = GraphStatistics::default();

        let node_rows = self
            .rows(
                "node_statistics",
                Query::new(format!(
                    "MATCH (n:{}) RETURN coalesce(n.node_type, 'Unknown') AS node_type, count(*) AS count",
                    ENTITY_LABEL
                )),
            )
            .await?;
        for row in &node_rows {
            let node_type: String = row
                .get("node_type")
                .map_err(|e| BackendError::MappingError(format!("node_type unreadable: {}", e)))?;
            let count = row_count(row, "count")?;
            stats.total_nodes += count;
            *stats.node_types.entry(node_type).or_insert(0) += count;
        }

        let rel_rows = self
            .rows(
                "relationship_statistics",
                Query::new(format!(
                    "MATCH (:{label})-[r]->(:{label}) RETURN type(r) AS rel_type, count(*) AS count",
                    label = ENTITY_LABEL
                )),
            )
            .await?;
        for row in &rel_rows {
            let rel_type: String = row
                .get("rel_type")
                .map_err(|e| BackendError::MappingError(format!("rel_type unreadable: {}", e)))?;
            let count = row_count(row, "count")?;
            stats.total_relationships += count;
            *stats.relationship_types.entry(rel_type).or_insert(0) += count;
        }

        Ok(stats)
    }

    async fn list_nodes(
        &self,
        node_types: Option<&[&str]>,
        offset: usize,
        limit: usize,
    ) -> Result<(Vec<Node>, usize), GraphError> {
        let filter = if node_types.is_some() {
            "WHERE n.node_type IN $node_types"
        } else {
            ""
        };
        let types: Vec<String> = node_types
            .map(|types| types.iter().map(|t| t.to_string()).collect())
            .unwrap_or_default();

        let count_query = Query::new(format!(
            "MATCH (n:{}) {} RETURN count(n) AS total",
            ENTITY_LABEL, filter
        ))
        .param("node_types", types.clone());
        let total = match self.rows("count_nodes", count_query).await?.first() {
            Some(row) => row_count(row, "total")?,
            None => 0,
        };

        let list_query = Query::new(format!(
            "MATCH (n:{}) {} RETURN {} ORDER BY n.node_id SKIP $offset LIMIT $limit",
            ENTITY_LABEL,
            filter,
            node_projection("n")
        ))
        .param("node_types", types)
        .param("offset", offset as i64)
        .param("limit", limit as i64);
        let nodes = self.nodes("list_nodes", list_query).await?;
        Ok((nodes, total))
    }

    async fn search_nodes(&self, query: &str, limit: usize) -> Result<Vec<Node>, GraphError> {
        let cypher = format!(
            "MATCH (n:{})\n\
             WHERE toLower(n.node_id) CONTAINS $needle\n\
                OR toLower(toString(coalesce(n.title, ''))) CONTAINS $needle\n\
                OR toLower(toString(coalesce(n.name, ''))) CONTAINS $needle\n\
                OR toLower(toString(coalesce(n.description, ''))) CONTAINS $needle\n\
             RETURN {}\n\
             ORDER BY n.node_id\n\
             LIMIT $limit",
            ENTITY_LABEL,
            node_projection("n")
        );
        self.nodes(
            "search_nodes",
            Query::new(cypher)
                .param("needle", query.to_lowercase())
                .param("limit", limit as i64),
        )
        .await
    }

    #[instrument(skip(self))]
    async fn clear(&self) -> Result<(), GraphError> {
        self.rows(
            "clear",
            Query::new(format!("MATCH (n:{}) DETACH DELETE n", ENTITY_LABEL)),
        )
        .await?;
        warn!("Cleared Neo4j threat graph");
        Ok(())
    }

    async fn persist(&self) -> Result<(), GraphError> {
        Ok(())
    }
}
