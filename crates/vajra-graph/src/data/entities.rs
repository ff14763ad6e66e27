//! Node and relationship value types of the threat graph

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::data::errors::GraphError;

/// Semi-structured attributes attached to nodes and relationships.
///
/// Backed by `serde_json::Map`, which keeps keys sorted so snapshots
/// serialize deterministically.
pub type Properties = serde_json::Map<String, Value>;

/// An attack path: node ids from source to target, in hop order.
pub type AttackPath = Vec<String>;

/// A uniquely identified threat entity (actor, malware, CVE, infrastructure, campaign).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub properties: Properties,
}

impl Node {
    /// Creates a node, rejecting empty ids and types.
    pub fn new(
        id: impl Into<String>,
        node_type: impl Into<String>,
        properties: Properties,
    ) -> Result<Self, GraphError> {
        let node = Self {
            id: id.into(),
            node_type: node_type.into(),
            properties,
        };
        node.validate()?;
        Ok(node)
    }

    /// Checks the construction invariants. Stores call this again before
    /// writing because the fields are public.
    pub fn validate(&self) -> Result<(), GraphError> {
        if self.id.trim().is_empty() {
            return Err(GraphError::ValidationError("node id must not be empty".to_string()));
        }
        if self.node_type.trim().is_empty() {
            return Err(GraphError::ValidationError(format!(
                "node '{}' has an empty type",
                self.id
            )));
        }
        Ok(())
    }

    /// Merges `properties` over the existing ones; new values win on key collision.
    pub fn merge_properties(&mut self, properties: Properties) {
        for (key, value) in properties {
            self.properties.insert(key, value);
        }
    }

    /// Returns a string property, if present and a string.
    pub fn property_str(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(Value::as_str)
    }
}

/// A directed, typed edge between two node ids.
///
/// Endpoints are not required to exist as nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub source_id: String,
    pub target_id: String,
    #[serde(rename = "type")]
    pub relationship_type: String,
    #[serde(default)]
    pub properties: Properties,
}

impl Relationship {
    pub fn new(
        source_id: impl Into<String>,
        target_id: impl Into<String>,
        relationship_type: impl Into<String>,
        properties: Properties,
    ) -> Result<Self, GraphError> {
        let relationship = Self {
            source_id: source_id.into(),
            target_id: target_id.into(),
            relationship_type: relationship_type.into(),
            properties,
        };
        relationship.validate()?;
        Ok(relationship)
    }

    pub fn validate(&self) -> Result<(), GraphError> {
        let fields = [
            ("source_id", &self.source_id),
            ("target_id", &self.target_id),
            ("type", &self.relationship_type),
        ];
        for (name, value) in fields {
            if value.trim().is_empty() {
                return Err(GraphError::ValidationError(format!(
                    "relationship {} must not be empty",
                    name
                )));
            }
        }
        Ok(())
    }
}

/// Result of an upsert: whether the node was new or merged into an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
}

/// Builds a `Properties` map from key/value pairs.
///
/// ```
/// use vajra_graph::properties;
/// let props = properties([("name", "APT29".into()), ("confidence", 0.95.into())]);
/// assert_eq!(props.len(), 2);
/// ```
pub fn properties<K, I>(pairs: I) -> Properties
where
    K: Into<String>,
    I: IntoIterator<Item = (K, Value)>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_node_requires_id_and_type() {
        assert!(Node::new("APT29", "ThreatActor", Properties::new()).is_ok());
        assert!(matches!(
            Node::new("", "ThreatActor", Properties::new()),
            Err(GraphError::ValidationError(_))
        ));
        assert!(matches!(
            Node::new("APT29", "  ", Properties::new()),
            Err(GraphError::ValidationError(_))
        ));
    }

    #[test]
    fn test_relationship_requires_all_fields() {
        assert!(Relationship::new("A", "B", "USES", Properties::new()).is_ok());
        for (s, t, ty) in [("", "B", "USES"), ("A", "", "USES"), ("A", "B", "")] {
            let err = Relationship::new(s, t, ty, Properties::new()).unwrap_err();
            assert!(matches!(err, GraphError::ValidationError(_)));
        }
    }

    #[test]
    fn test_merge_properties_new_values_win() {
        let mut node = Node::new(
            "nvd:CVE-1",
            "CVE",
            properties([("severity", json!("low")), ("url", json!("https://a"))]),
        )
        .unwrap();
        node.merge_properties(properties([("severity", json!("critical"))]));
        assert_eq!(node.property_str("severity"), Some("critical"));
        assert_eq!(node.property_str("url"), Some("https://a"));
    }

    #[test]
    fn test_serialized_shape_uses_type_key() {
        let rel = Relationship::new("A", "B", "USES", properties([("confidence", json!(0.9))])).unwrap();
        let value = serde_json::to_value(&rel).unwrap();
        assert_eq!(
            value,
            json!({"source_id": "A", "target_id": "B", "type": "USES", "properties": {"confidence": 0.9}})
        );
    }
}
