//! Traversal algorithms over an ordered relationship sequence
//!
//! Both functions are pure: they read a relationship slice and never touch the
//! store's lock. Relationship insertion order fixes the enumeration order, so
//! results are deterministic for a given state.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::data::{AttackPath, Relationship};

/// Outgoing relationships per source id, in insertion order.
fn outgoing_index(relationships: &[Relationship]) -> HashMap<&str, Vec<&Relationship>> {
    let mut index: HashMap<&str, Vec<&Relationship>> = HashMap::new();
    for rel in relationships {
        index.entry(rel.source_id.as_str()).or_default().push(rel);
    }
    index
}

/// Breadth-first neighbor expansion.
///
/// Returns distinct ids reachable from `start` within `max_depth` hops, in
/// discovery order, excluding `start`. Ids for which `is_node` is false are
/// expanded through but not returned. Stops once `limit` ids are collected.
pub fn related_node_ids<F>(
    relationships: &[Relationship],
    start: &str,
    relationship_type: Option<&str>,
    max_depth: usize,
    limit: usize,
    is_node: F,
) -> Vec<String>
where
    F: Fn(&str) -> bool,
{
    let index = outgoing_index(relationships);
    let mut seen: HashSet<&str> = HashSet::from([start]);
    let mut frontier: Vec<&str> = vec![start];
    let mut related = Vec::new();

    for _ in 0..max_depth {
        if frontier.is_empty() {
            break;
        }
        let mut next = Vec::new();
        for current in frontier {
            let Some(edges) = index.get(current) else { continue };
            for rel in edges {
                if let Some(wanted) = relationship_type {
                    if rel.relationship_type != wanted {
                        continue;
                    }
                }
                let target = rel.target_id.as_str();
                if !seen.insert(target) {
                    continue;
                }
                next.push(target);
                if is_node(target) {
                    related.push(target.to_string());
                    if related.len() >= limit {
                        return related;
                    }
                }
            }
        }
        frontier = next;
    }

    related
}

/// Breadth-first enumeration of simple paths from `source` to `target`.
///
/// Each queue entry is a partial path; its node list doubles as the per-path
/// visited set, so distinct simple paths are found, not only the shortest.
/// A path reaching `target` is emitted and not extended. A partial path that
/// already spans `max_hops` relationships is dropped. Parallel relationships
/// between the same two nodes yield one path, not duplicates.
pub fn attack_paths(
    relationships: &[Relationship],
    source: &str,
    target: &str,
    max_hops: usize,
    limit: usize,
) -> Vec<AttackPath> {
    let index = outgoing_index(relationships);
    let mut paths: Vec<AttackPath> = Vec::new();
    let mut queue: VecDeque<Vec<&str>> = VecDeque::from([vec![source]]);

    while let Some(path) = queue.pop_front() {
        if paths.len() >= limit {
            break;
        }
        let current = match path.last() {
            Some(last) => *last,
            None => continue,
        };
        if current == target {
            paths.push(path.iter().map(|id| id.to_string()).collect());
            continue;
        }
        if path.len() - 1 >= max_hops {
            continue;
        }
        let Some(edges) = index.get(current) else { continue };
        let mut extended: HashSet<&str> = HashSet::new();
        for rel in edges {
            let next = rel.target_id.as_str();
            if path.contains(&next) || !extended.insert(next) {
                continue;
            }
            let mut longer = path.clone();
            longer.push(next);
            queue.push_back(longer);
        }
    }

    paths
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Properties;
    use pretty_assertions::assert_eq;

    fn rel(s: &str, t: &str, ty: &str) -> Relationship {
        Relationship::new(s, t, ty, Properties::new()).unwrap()
    }

    fn always(_: &str) -> bool {
        true
    }

    #[test]
    fn test_related_one_hop_filters_by_type() {
        let rels = vec![
            rel("APT29", "CobaltStrike", "USES"),
            rel("APT29", "C2-Server-Alpha", "CONTROLS"),
            rel("CobaltStrike", "CVE-2023-12345", "EXPLOITS"),
        ];
        assert_eq!(
            related_node_ids(&rels, "APT29", Some("USES"), 1, 100, always),
            vec!["CobaltStrike".to_string()]
        );
        assert_eq!(
            related_node_ids(&rels, "APT29", None, 1, 100, always),
            vec!["CobaltStrike".to_string(), "C2-Server-Alpha".to_string()]
        );
    }

    #[test]
    fn test_related_depth_expands_and_dedups() {
        let rels = vec![
            rel("A", "B", "USES"),
            rel("A", "C", "USES"),
            rel("B", "C", "USES"),
            rel("C", "D", "USES"),
            rel("D", "A", "USES"),
        ];
        assert_eq!(related_node_ids(&rels, "A", None, 1, 100, always), vec!["B", "C"]);
        assert_eq!(related_node_ids(&rels, "A", None, 2, 100, always), vec!["B", "C", "D"]);
        // the cycle back to A never reports the start node
        assert_eq!(related_node_ids(&rels, "A", None, 5, 100, always), vec!["B", "C", "D"]);
        assert!(related_node_ids(&rels, "A", None, 0, 100, always).is_empty());
    }

    #[test]
    fn test_related_skips_dangling_but_walks_through_them() {
        let rels = vec![rel("A", "ghost", "USES"), rel("ghost", "B", "USES")];
        let found = related_node_ids(&rels, "A", None, 2, 100, |id| id != "ghost");
        assert_eq!(found, vec!["B"]);
    }

    #[test]
    fn test_related_respects_limit() {
        let rels: Vec<_> = (0..20).map(|i| rel("hub", &format!("n{}", i), "USES")).collect();
        assert_eq!(related_node_ids(&rels, "hub", None, 1, 5, always).len(), 5);
    }

    #[test]
    fn test_related_unknown_start_is_empty() {
        let rels = vec![rel("A", "B", "USES")];
        assert!(related_node_ids(&rels, "nobody", None, 3, 100, always).is_empty());
    }

    #[test]
    fn test_single_chain_path() {
        let rels = vec![rel("A", "B", "USES"), rel("B", "C", "USES"), rel("C", "D", "USES")];
        assert_eq!(attack_paths(&rels, "A", "D", 5, 10), vec![vec!["A", "B", "C", "D"]]);
    }

    #[test]
    fn test_paths_bounded_by_hops() {
        let rels = vec![rel("A", "B", "USES"), rel("B", "C", "USES"), rel("C", "D", "USES")];
        assert!(attack_paths(&rels, "A", "D", 2, 10).is_empty());
        assert_eq!(attack_paths(&rels, "A", "D", 3, 10).len(), 1);
    }

    #[test]
    fn test_multiple_simple_paths_in_bfs_order() {
        let rels = vec![
            rel("A", "B", "USES"),
            rel("A", "C", "USES"),
            rel("B", "D", "USES"),
            rel("C", "B", "USES"),
            rel("C", "D", "USES"),
            rel("D", "A", "USES"),
        ];
        let paths = attack_paths(&rels, "A", "D", 5, 10);
        assert_eq!(
            paths,
            vec![
                vec!["A", "B", "D"],
                vec!["A", "C", "D"],
                vec!["A", "C", "B", "D"],
            ]
        );
    }

    #[test]
    fn test_parallel_edges_do_not_duplicate_paths() {
        let rels = vec![rel("A", "B", "USES"), rel("A", "B", "CONTROLS")];
        assert_eq!(attack_paths(&rels, "A", "B", 3, 10), vec![vec!["A", "B"]]);
    }

    #[test]
    fn test_path_limit() {
        // A fans out to 15 middles which all reach Z
        let mut rels = Vec::new();
        for i in 0..15 {
            let mid = format!("m{}", i);
            rels.push(rel("A", &mid, "USES"));
            rels.push(rel(&mid, "Z", "USES"));
        }
        assert_eq!(attack_paths(&rels, "A", "Z", 4, 10).len(), 10);
    }

    #[test]
    fn test_source_equals_target() {
        let rels = vec![rel("A", "B", "USES")];
        assert_eq!(attack_paths(&rels, "A", "A", 3, 10), vec![vec!["A"]]);
    }
}
