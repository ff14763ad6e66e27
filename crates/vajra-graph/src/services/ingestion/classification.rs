//! Mapping of external threat records onto graph nodes

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;

use crate::data::{Properties, Severity, ThreatRecord};

/// Node type given to records from sources missing from the lookup table.
pub const DEFAULT_NODE_TYPE: &str = "Campaign";

/// Feed source (lowercase) to node type.
const SOURCE_NODE_TYPES: &[(&str, &str)] = &[
    ("nvd", "CVE"),
    ("cisa_kev", "CVE"),
    ("cve", "CVE"),
    ("osv", "CVE"),
    ("urlhaus", "malware"),
    ("malwarebazaar", "malware"),
    ("threatfox", "malware"),
    ("otx", "malware"),
    ("abuse_ch", "malware"),
];

/// Property keys derived from record fields. Metadata never overrides them.
const CORE_KEYS: &[&str] = &[
    "name",
    "title",
    "description",
    "severity",
    "source",
    "url",
    "status",
    "discovered",
];

/// Maps a feed source to a node type, case-insensitively.
pub fn classify_source(source: &str) -> &'static str {
    let source = source.trim().to_ascii_lowercase();
    SOURCE_NODE_TYPES
        .iter()
        .find(|(name, _)| *name == source)
        .map(|(_, node_type)| *node_type)
        .unwrap_or(DEFAULT_NODE_TYPE)
}

/// Normalizes a record's severity.
///
/// Keywords in the severity string are checked first, from most to least
/// severe. Without a keyword, `cvss_score` from the metadata decides. With
/// neither, the result is medium.
pub fn normalize_severity(severity: Option<&str>, metadata: &BTreeMap<String, Value>) -> Severity {
    if let Some(raw) = severity {
        let upper = raw.to_ascii_uppercase();
        for (keyword, level) in [
            ("CRITICAL", Severity::Critical),
            ("HIGH", Severity::High),
            ("MEDIUM", Severity::Medium),
            ("LOW", Severity::Low),
        ] {
            if upper.contains(keyword) {
                return level;
            }
        }
    }

    match metadata.get("cvss_score").and_then(cvss_score) {
        Some(score) if score >= 9.0 => Severity::Critical,
        Some(score) if score >= 7.0 => Severity::High,
        Some(score) if score >= 4.0 => Severity::Medium,
        Some(_) => Severity::Low,
        None => Severity::Medium,
    }
}

// Crawlers emit the score either as a number or as its string rendering.
fn cvss_score(value: &Value) -> Option<f64> {
    let score = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    score.filter(|s| s.is_finite())
}

/// Builds the node properties for one record.
pub fn record_properties(record: &ThreatRecord, ingested_at: DateTime<Utc>) -> Properties {
    let mut props = Properties::new();
    props.insert("name".into(), Value::String(record.title.clone()));
    props.insert("title".into(), Value::String(record.title.clone()));
    props.insert("description".into(), Value::String(record.summary.clone()));
    props.insert(
        "severity".into(),
        Value::String(normalize_severity(record.severity.as_deref(), &record.metadata).to_string()),
    );
    props.insert("source".into(), Value::String(record.source.clone()));
    if let Some(url) = &record.url {
        props.insert("url".into(), Value::String(url.clone()));
    }
    if let Some(status) = &record.status {
        props.insert("status".into(), Value::String(status.clone()));
    }
    let discovered = record
        .published
        .clone()
        .unwrap_or_else(|| ingested_at.to_rfc3339_opts(SecondsFormat::Secs, true));
    props.insert("discovered".into(), Value::String(discovered));

    for (key, value) in &record.metadata {
        if CORE_KEYS.contains(&key.as_str()) {
            continue;
        }
        props.insert(key.clone(), value.clone());
    }
    props
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn metadata(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_classify_source() {
        assert_eq!(classify_source("nvd"), "CVE");
        assert_eq!(classify_source("CISA_KEV"), "CVE");
        assert_eq!(classify_source("urlhaus"), "malware");
        assert_eq!(classify_source("reddit_netsec"), DEFAULT_NODE_TYPE);
        assert_eq!(classify_source(""), DEFAULT_NODE_TYPE);
    }

    #[test]
    fn test_severity_keyword_precedence() {
        let none = BTreeMap::new();
        assert_eq!(normalize_severity(Some("Critical"), &none), Severity::Critical);
        assert_eq!(normalize_severity(Some("HIGH-ish"), &none), Severity::High);
        assert_eq!(normalize_severity(Some("medium"), &none), Severity::Medium);
        assert_eq!(normalize_severity(Some("low"), &none), Severity::Low);
        // CRITICAL is tested before LOW
        assert_eq!(normalize_severity(Some("low to critical"), &none), Severity::Critical);
    }

    #[test]
    fn test_keyword_beats_cvss() {
        let meta = metadata(&[("cvss_score", json!(9.8))]);
        assert_eq!(normalize_severity(Some("LOW"), &meta), Severity::Low);
    }

    #[test]
    fn test_cvss_thresholds() {
        for (score, expected) in [
            (json!(9.0), Severity::Critical),
            (json!("9.8"), Severity::Critical),
            (json!(8.99), Severity::High),
            (json!("7.0"), Severity::High),
            (json!(4), Severity::Medium),
            (json!(3.9), Severity::Low),
            (json!(0), Severity::Low),
        ] {
            let meta = metadata(&[("cvss_score", score.clone())]);
            assert_eq!(normalize_severity(None, &meta), expected, "score {}", score);
        }
    }

    #[test]
    fn test_unparseable_inputs_default_to_medium() {
        let meta = metadata(&[("cvss_score", json!("N/A"))]);
        assert_eq!(normalize_severity(Some("unknown"), &meta), Severity::Medium);
        assert_eq!(normalize_severity(None, &BTreeMap::new()), Severity::Medium);
        let meta = metadata(&[("cvss_score", json!("NaN"))]);
        assert_eq!(normalize_severity(None, &meta), Severity::Medium);
    }

    #[test]
    fn test_record_properties() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let record = ThreatRecord::new("nvd", "CVE-2024-0001", "Heap overflow")
            .with_summary("Remote heap overflow")
            .with_url("https://nvd.nist.gov/vuln/detail/CVE-2024-0001")
            .with_metadata("cvss_score", "9.8")
            .with_metadata("ai_risk_score", 0.91)
            .with_metadata("severity", "spoofed");
        let props = record_properties(&record, at);

        assert_eq!(props["name"], json!("Heap overflow"));
        assert_eq!(props["title"], json!("Heap overflow"));
        assert_eq!(props["description"], json!("Remote heap overflow"));
        assert_eq!(props["severity"], json!("critical"));
        assert_eq!(props["source"], json!("nvd"));
        assert_eq!(props["discovered"], json!("2024-05-01T12:00:00Z"));
        assert_eq!(props["ai_risk_score"], json!(0.91));
        assert_eq!(props["cvss_score"], json!("9.8"));
        assert!(!props.contains_key("status"));
    }

    #[test]
    fn test_published_date_wins_over_ingestion_time() {
        let mut record = ThreatRecord::new("cisa_kev", "CVE-1", "t");
        record.published = Some("2023-12-24".to_string());
        let props = record_properties(&record, Utc::now());
        assert_eq!(props["discovered"], json!("2023-12-24"));
    }
}
