//! Store configuration loaded from the environment (and an optional `.env` file)

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use dotenv::dotenv;

use crate::data::GraphError;

/// Which backend the store should try at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendPreference {
    /// Probe the live backend, fall back to embedded if unreachable.
    Auto,
    /// Never probe; always embedded.
    Embedded,
    /// Probe the live backend; falling back is logged as an error.
    Live,
}

impl FromStr for BackendPreference {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "embedded" => Ok(Self::Embedded),
            "live" | "neo4j" => Ok(Self::Live),
            other => Err(GraphError::Configuration(format!(
                "unknown backend '{}', expected auto, embedded or live",
                other
            ))),
        }
    }
}

/// What to do when the embedded snapshot exists but cannot be parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CorruptSnapshotPolicy {
    /// Log the failure and start with an empty graph.
    #[default]
    Discard,
    /// Move the file aside and fail store construction.
    Quarantine,
}

impl FromStr for CorruptSnapshotPolicy {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "discard" => Ok(Self::Discard),
            "quarantine" => Ok(Self::Quarantine),
            other => Err(GraphError::Configuration(format!(
                "unknown corrupt snapshot policy '{}', expected discard or quarantine",
                other
            ))),
        }
    }
}

/// Configuration for the Neo4j connection
#[derive(Debug, Clone)]
pub struct Neo4jConfig {
    pub uri: String,
    pub username: String,
    pub password: String,
    pub database: Option<String>,
    pub pool_size: usize,
    pub connection_timeout: Duration,
    pub query_timeout: Duration,
}

impl Default for Neo4jConfig {
    fn default() -> Self {
        Self {
            uri: "neo4j://localhost:7687".to_string(),
            username: "neo4j".to_string(),
            password: "password".to_string(),
            database: None,
            pool_size: 10,
            connection_timeout: Duration::from_secs(5),
            query_timeout: Duration::from_secs(30),
        }
    }
}

/// Top-level store configuration.
#[derive(Debug, Clone)]
pub struct GraphStoreConfig {
    pub backend: BackendPreference,
    pub neo4j: Neo4jConfig,
    pub snapshot_path: PathBuf,
    pub corrupt_snapshot_policy: CorruptSnapshotPolicy,
    pub enforce_referential_integrity: bool,
}

impl Default for GraphStoreConfig {
    fn default() -> Self {
        Self {
            backend: BackendPreference::Auto,
            neo4j: Neo4jConfig::default(),
            snapshot_path: PathBuf::from("data/threat_graph.json"),
            corrupt_snapshot_policy: CorruptSnapshotPolicy::default(),
            enforce_referential_integrity: false,
        }
    }
}

impl GraphStoreConfig {
    /// Embedded-only configuration writing its snapshot to `path`.
    pub fn embedded(path: impl Into<PathBuf>) -> Self {
        Self {
            backend: BackendPreference::Embedded,
            snapshot_path: path.into(),
            ..Self::default()
        }
    }

    /// Reads the configuration from process environment variables, loading a
    /// `.env` file first if one exists.
    pub fn from_env() -> Result<Self, GraphError> {
        dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, GraphError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let neo4j_defaults = Neo4jConfig::default();

        let backend = match lookup("VAJRA_GRAPH_BACKEND") {
            Some(v) => v.parse()?,
            None => defaults.backend,
        };
        let corrupt_snapshot_policy = match lookup("VAJRA_CORRUPT_SNAPSHOT") {
            Some(v) => v.parse()?,
            None => defaults.corrupt_snapshot_policy,
        };

        let neo4j = Neo4jConfig {
            uri: lookup("NEO4J_URI").unwrap_or(neo4j_defaults.uri),
            username: lookup("NEO4J_USERNAME").unwrap_or(neo4j_defaults.username),
            password: lookup("NEO4J_PASSWORD").unwrap_or(neo4j_defaults.password),
            database: lookup("NEO4J_DATABASE").filter(|db| !db.trim().is_empty()),
            pool_size: parse_or(&lookup, "NEO4J_POOL_SIZE", neo4j_defaults.pool_size)?,
            connection_timeout: Duration::from_secs(parse_or(
                &lookup,
                "NEO4J_CONNECT_TIMEOUT_SECS",
                neo4j_defaults.connection_timeout.as_secs(),
            )?),
            query_timeout: Duration::from_secs(parse_or(
                &lookup,
                "NEO4J_QUERY_TIMEOUT_SECS",
                neo4j_defaults.query_timeout.as_secs(),
            )?),
        };

        Ok(Self {
            backend,
            neo4j,
            snapshot_path: lookup("VAJRA_GRAPH_SNAPSHOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.snapshot_path),
            corrupt_snapshot_policy,
            enforce_referential_integrity: parse_or(
                &lookup,
                "VAJRA_ENFORCE_REFERENTIAL_INTEGRITY",
                defaults.enforce_referential_integrity,
            )?,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, GraphError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| GraphError::Configuration(format!("{}='{}': {}", key, raw, e))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = GraphStoreConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.backend, BackendPreference::Auto);
        assert_eq!(config.neo4j.uri, "neo4j://localhost:7687");
        assert_eq!(config.snapshot_path, PathBuf::from("data/threat_graph.json"));
        assert_eq!(config.corrupt_snapshot_policy, CorruptSnapshotPolicy::Discard);
        assert!(!config.enforce_referential_integrity);
    }

    #[test]
    fn test_reads_all_keys() {
        let config = GraphStoreConfig::from_lookup(lookup_from(&[
            ("VAJRA_GRAPH_BACKEND", "Embedded"),
            ("NEO4J_URI", "bolt://graph:7687"),
            ("NEO4J_DATABASE", "threats"),
            ("NEO4J_POOL_SIZE", "4"),
            ("NEO4J_QUERY_TIMEOUT_SECS", "3"),
            ("VAJRA_GRAPH_SNAPSHOT", "/var/lib/vajra/graph.json"),
            ("VAJRA_CORRUPT_SNAPSHOT", "quarantine"),
            ("VAJRA_ENFORCE_REFERENTIAL_INTEGRITY", "true"),
        ]))
        .unwrap();
        assert_eq!(config.backend, BackendPreference::Embedded);
        assert_eq!(config.neo4j.uri, "bolt://graph:7687");
        assert_eq!(config.neo4j.database.as_deref(), Some("threats"));
        assert_eq!(config.neo4j.pool_size, 4);
        assert_eq!(config.neo4j.query_timeout, Duration::from_secs(3));
        assert_eq!(config.snapshot_path, PathBuf::from("/var/lib/vajra/graph.json"));
        assert_eq!(config.corrupt_snapshot_policy, CorruptSnapshotPolicy::Quarantine);
        assert!(config.enforce_referential_integrity);
    }

    #[test]
    fn test_rejects_malformed_values() {
        let err = GraphStoreConfig::from_lookup(lookup_from(&[("NEO4J_POOL_SIZE", "many")])).unwrap_err();
        assert!(matches!(err, GraphError::Configuration(_)));
        let err = GraphStoreConfig::from_lookup(lookup_from(&[("VAJRA_GRAPH_BACKEND", "redis")])).unwrap_err();
        assert!(matches!(err, GraphError::Configuration(_)));
    }
}
