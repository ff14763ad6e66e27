//! Demo threat graph used by the binary and by tests

use serde_json::json;
use tracing::{info, instrument};

use crate::data::{properties, GraphError, Node, Relationship};
use crate::traits::GraphStore;

fn demo_nodes() -> Result<Vec<Node>, GraphError> {
    Ok(vec![
        Node::new(
            "APT29",
            "ThreatActor",
            properties([
                ("name", json!("APT29")),
                ("aka", json!("Cozy Bear")),
                ("origin", json!("Russia")),
                ("sophistication", json!("high")),
                ("active_since", json!("2008")),
            ]),
        )?,
        Node::new(
            "APT28",
            "ThreatActor",
            properties([
                ("name", json!("APT28")),
                ("aka", json!("Fancy Bear")),
                ("origin", json!("Russia")),
                ("sophistication", json!("high")),
                ("active_since", json!("2007")),
            ]),
        )?,
        Node::new(
            "Lazarus",
            "ThreatActor",
            properties([
                ("name", json!("Lazarus Group")),
                ("origin", json!("North Korea")),
                ("sophistication", json!("high")),
                ("active_since", json!("2009")),
            ]),
        )?,
        Node::new(
            "CobaltStrike",
            "Malware",
            properties([
                ("name", json!("Cobalt Strike")),
                ("type", json!("RAT")),
                ("platform", json!("Windows")),
            ]),
        )?,
        Node::new(
            "Emotet",
            "Malware",
            properties([
                ("name", json!("Emotet")),
                ("type", json!("Trojan")),
                ("platform", json!("Windows")),
            ]),
        )?,
        Node::new(
            "WannaCry",
            "Malware",
            properties([
                ("name", json!("WannaCry")),
                ("type", json!("Ransomware")),
                ("platform", json!("Windows")),
            ]),
        )?,
        Node::new(
            "CVE-2023-12345",
            "Vulnerability",
            properties([
                ("cve_id", json!("CVE-2023-12345")),
                ("severity", json!("critical")),
                ("cvss", json!(9.8)),
                ("description", json!("Remote Code Execution")),
            ]),
        )?,
        Node::new(
            "CVE-2023-67890",
            "Vulnerability",
            properties([
                ("cve_id", json!("CVE-2023-67890")),
                ("severity", json!("high")),
                ("cvss", json!(8.5)),
                ("description", json!("Privilege Escalation")),
            ]),
        )?,
        Node::new(
            "C2-Server-Alpha",
            "Infrastructure",
            properties([
                ("type", json!("C2 Server")),
                ("ip", json!("192.168.1.100")),
                ("status", json!("active")),
            ]),
        )?,
        Node::new(
            "Phishing-Domain-1",
            "Infrastructure",
            properties([
                ("type", json!("Phishing Domain")),
                ("domain", json!("secure-bank-login.com")),
                ("status", json!("active")),
            ]),
        )?,
    ])
}

const DEMO_RELATIONSHIPS: &[(&str, &str, &str, f64)] = &[
    ("APT29", "CobaltStrike", "USES", 0.95),
    ("APT28", "Emotet", "USES", 0.90),
    ("Lazarus", "WannaCry", "USES", 0.98),
    ("CobaltStrike", "CVE-2023-12345", "EXPLOITS", 0.85),
    ("Emotet", "CVE-2023-67890", "EXPLOITS", 0.80),
    ("APT29", "C2-Server-Alpha", "CONTROLS", 0.92),
    ("APT28", "Phishing-Domain-1", "CONTROLS", 0.88),
    ("CobaltStrike", "C2-Server-Alpha", "COMMUNICATES_WITH", 0.95),
    ("Emotet", "Phishing-Domain-1", "COMMUNICATES_WITH", 0.85),
];

/// Replaces the graph contents with the demo actors, malware, vulnerabilities
/// and infrastructure, then persists.
#[instrument(skip(store))]
pub async fn seed_demo_graph(store: &dyn GraphStore) -> Result<(), GraphError> {
    store.clear().await?;

    let nodes = demo_nodes()?;
    let node_count = nodes.len();
    for node in nodes {
        store.create_node(node).await?;
    }
    for (source, target, rel_type, confidence) in DEMO_RELATIONSHIPS {
        let relationship = Relationship::new(
            *source,
            *target,
            *rel_type,
            properties([("confidence", json!(confidence))]),
        )?;
        store.create_relationship(relationship).await?;
    }

    store.persist().await?;
    info!(
        nodes = node_count,
        relationships = DEMO_RELATIONSHIPS.len(),
        "Seeded demo threat graph"
    );
    Ok(())
}
