//! Normalized threat records produced by feed crawlers and AI annotation

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One normalized item from an external feed.
///
/// `metadata` is opaque to the store apart from `cvss_score`, which feeds
/// severity normalization. Annotators may add keys such as `ai_risk_score`
/// or `anomaly_score`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThreatRecord {
    pub source: String,
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub published: Option<String>,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl ThreatRecord {
    pub fn new(source: impl Into<String>, id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            id: id.into(),
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    pub fn with_severity(mut self, severity: impl Into<String>) -> Self {
        self.severity = Some(severity.into());
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// The node id used for upsert: `source:id`.
    pub fn composite_key(&self) -> String {
        format!("{}:{}", self.source, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_composite_key_namespaces_by_source() {
        let nvd = ThreatRecord::new("nvd", "CVE-2024-0001", "CVE-2024-0001");
        let kev = ThreatRecord::new("cisa_kev", "CVE-2024-0001", "Known exploited");
        assert_eq!(nvd.composite_key(), "nvd:CVE-2024-0001");
        assert_ne!(nvd.composite_key(), kev.composite_key());
    }

    #[test]
    fn test_deserializes_crawler_shape() {
        let record: ThreatRecord = serde_json::from_str(
            r#"{"id":"abc","source":"reddit_netsec","title":"t","url":"https://r","summary":"s",
                "published":null,"severity":null,"status":null,"metadata":{"score":"12"}}"#,
        )
        .unwrap();
        assert_eq!(record.composite_key(), "reddit_netsec:abc");
        assert_eq!(record.metadata.get("score"), Some(&serde_json::json!("12")));
    }
}
