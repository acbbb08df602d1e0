//! Consistent-hash ring over named sibling processes.

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, BTreeSet};
use std::hash::{Hash, Hasher};

const DEFAULT_REPLICAS: usize = 64;

/// Nodes are identified by name; removal and replacement compare by name.
#[derive(Debug, Clone, Default)]
pub struct HashRing {
    replicas: usize,
    points: BTreeMap<u64, String>,
    nodes: BTreeSet<String>,
}

fn hash_of(value: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

impl HashRing {
    pub fn new() -> Self {
        Self::with_replicas(DEFAULT_REPLICAS)
    }

    pub fn with_replicas(replicas: usize) -> Self {
        Self {
            replicas: replicas.max(1),
            points: BTreeMap::new(),
            nodes: BTreeSet::new(),
        }
    }

    pub fn add(&mut self, name: &str) {
        if !self.nodes.insert(name.to_string()) {
            return;
        }
        for replica in 0..self.replicas {
            self.points.insert(hash_of(&format!("{name}#{replica}")), name.to_string());
        }
    }

    pub fn remove(&mut self, name: &str) {
        if !self.nodes.remove(name) {
            return;
        }
        self.points.retain(|_, node| node != name);
    }

    /// Replaces the member set: nodes absent from `names` are removed by
    /// name, new names are added, surviving nodes keep their points.
    pub fn replace_all(&mut self, names: &[String]) {
        let target: BTreeSet<&String> = names.iter().collect();
        let stale: Vec<String> = self
            .nodes
            .iter()
            .filter(|node| !target.contains(node))
            .cloned()
            .collect();
        for name in stale {
            self.remove(&name);
        }
        for name in names {
            self.add(name);
        }
    }

    pub fn node_for(&self, key: &str) -> Option<&str> {
        if self.points.is_empty() {
            return None;
        }
        let point = hash_of(key);
        self.points
            .range(point..)
            .next()
            .or_else(|| self.points.iter().next())
            .map(|(_, node)| node.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains(name)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_ring_has_no_owner() {
        let ring = HashRing::new();
        assert!(ring.node_for("k").is_none());
    }

    #[test]
    fn single_node_owns_everything() {
        let mut ring = HashRing::new();
        ring.add("a");
        for key in ["x", "y", "z"] {
            assert_eq!(ring.node_for(key), Some("a"));
        }
    }

    #[test]
    fn lookup_is_stable() {
        let mut ring = HashRing::new();
        ring.add("a");
        ring.add("b");
        ring.add("c");
        let owner = ring.node_for("some-key").unwrap().to_string();
        for _ in 0..10 {
            assert_eq!(ring.node_for("some-key").unwrap(), owner);
        }
    }

    #[test]
    fn removing_a_node_only_moves_its_keys() {
        let mut ring = HashRing::new();
        ring.add("a");
        ring.add("b");
        ring.add("c");
        let keys: Vec<String> = (0..100).map(|i| format!("key-{i}")).collect();
        let before: Vec<String> = keys.iter().map(|k| ring.node_for(k).unwrap().to_string()).collect();

        ring.remove("c");
        for (key, owner) in keys.iter().zip(&before) {
            if owner != "c" {
                // Keys not owned by the removed node stay put.
                assert_eq!(ring.node_for(key).unwrap(), owner);
            } else {
                assert_ne!(ring.node_for(key).unwrap(), "c");
            }
        }
    }

    #[test]
    fn replace_all_removes_by_name() {
        let mut ring = HashRing::new();
        ring.add("a");
        ring.add("b");
        ring.add("c");
        ring.replace_all(&["b".to_string(), "d".to_string()]);

        assert!(!ring.contains("a"));
        assert!(ring.contains("b"));
        assert!(!ring.contains("c"));
        assert!(ring.contains("d"));
        assert_eq!(ring.len(), 2);

        // No stale points survive for removed names.
        let keys: Vec<String> = (0..100).map(|i| format!("key-{i}")).collect();
        for key in &keys {
            let owner = ring.node_for(key).unwrap();
            assert!(owner == "b" || owner == "d");
        }
    }

    #[test]
    fn replace_all_keeps_surviving_assignments() {
        let mut ring = HashRing::new();
        ring.add("a");
        ring.add("b");
        let keys: Vec<String> = (0..50).map(|i| format!("key-{i}")).collect();
        let owned_by_b: Vec<&String> =
            keys.iter().filter(|k| ring.node_for(k) == Some("b")).collect();

        ring.replace_all(&["b".to_string(), "c".to_string()]);
        for key in owned_by_b {
            // b kept its points, so its keys can only have moved to c by
            // landing on one of c's new points, never away from the set.
            let owner = ring.node_for(key).unwrap();
            assert!(owner == "b" || owner == "c");
        }
    }
}
