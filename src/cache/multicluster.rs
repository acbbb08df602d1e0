//! Multi-cluster replication cache.
//!
//! Writes fan out to every cluster; reads probe clusters in pairs and stop
//! at the first definitive answer (a hit, or a known miss). Clusters do not
//! serialize writes against each other: two concurrent sets of one key may
//! leave clusters with different last-writer values, and a read accepts any
//! of them.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;

use super::keys;
use super::kv::KvStore;
use crate::errors::ApsisError;

pub struct MultiClusterCache {
    clusters: Vec<Arc<dyn KvStore>>,
}

impl MultiClusterCache {
    pub fn new(clusters: Vec<Arc<dyn KvStore>>) -> Self {
        Self { clusters }
    }

    pub fn cluster_count(&self) -> usize {
        self.clusters.len()
    }

    /// Best-effort fan-out: every cluster is written concurrently and the
    /// aggregate error is returned so the caller can decide to escalate.
    pub async fn set(&self, key: &str, value: &str) -> Result<(), ApsisError> {
        let key = keys::multicluster(key);
        let results = join_all(self.clusters.iter().map(|c| c.set(&key, value))).await;
        collect_errors(results)
    }

    pub async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), ApsisError> {
        let key = keys::multicluster(key);
        let results = join_all(self.clusters.iter().map(|c| c.set_ex(&key, value, ttl))).await;
        collect_errors(results)
    }

    /// Probes in batches of two for latency; the first hit or known miss is
    /// definitive. With every cluster erroring the aggregate error comes
    /// back; an empty cluster set is a plain miss.
    pub async fn get(&self, key: &str) -> Result<String, ApsisError> {
        let key = keys::multicluster(key);
        let mut errors = Vec::new();
        for (batch_idx, pair) in self.clusters.chunks(2).enumerate() {
            let results = join_all(pair.iter().map(|c| c.get(&key))).await;
            for (offset, result) in results.into_iter().enumerate() {
                match result {
                    Ok(value) => return Ok(value),
                    Err(err) if err.is_key_not_found() => return Err(err),
                    Err(err) => errors.push((batch_idx * 2 + offset, err.to_string())),
                }
            }
        }
        if errors.is_empty() {
            Err(ApsisError::KeyNotFound(key))
        } else {
            Err(ApsisError::MultiCache(errors))
        }
    }

    /// Fan-out delete; the result is the average of the per-cluster
    /// deletion counts (floor of sum/N).
    pub async fn delete(&self, key: &str) -> Result<u64, ApsisError> {
        if self.clusters.is_empty() {
            return Ok(0);
        }
        let key = keys::multicluster(key);
        let results = join_all(self.clusters.iter().map(|c| c.delete(&key))).await;
        let mut sum = 0u64;
        let mut errors = Vec::new();
        for (idx, result) in results.into_iter().enumerate() {
            match result {
                Ok(count) => sum += count,
                Err(err) => errors.push((idx, err.to_string())),
            }
        }
        if errors.len() == self.clusters.len() {
            return Err(ApsisError::MultiCache(errors));
        }
        Ok(sum / self.clusters.len() as u64)
    }
}

fn collect_errors(results: Vec<Result<(), ApsisError>>) -> Result<(), ApsisError> {
    let errors: Vec<(usize, String)> = results
        .into_iter()
        .enumerate()
        .filter_map(|(idx, r)| r.err().map(|e| (idx, e.to_string())))
        .collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ApsisError::MultiCache(errors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::kv::{FaultKv, MemoryKv};

    fn three_clusters() -> (Vec<Arc<MemoryKv>>, MultiClusterCache) {
        let backing: Vec<Arc<MemoryKv>> =
            (0..3).map(|_| Arc::new(MemoryKv::new())).collect();
        let cache = MultiClusterCache::new(
            backing.iter().map(|b| b.clone() as Arc<dyn KvStore>).collect(),
        );
        (backing, cache)
    }

    #[tokio::test]
    async fn set_replicates_to_every_cluster() {
        let (backing, cache) = three_clusters();
        cache.set("k", "v").await.unwrap();
        for cluster in &backing {
            assert_eq!(cluster.get(&keys::multicluster("k")).await.unwrap(), "v");
        }
    }

    #[tokio::test]
    async fn get_returns_first_definitive_answer() {
        let (_backing, cache) = three_clusters();
        cache.set("k", "v").await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), "v");

        // All clusters agree the key is absent: a known miss.
        assert!(cache.get("other").await.unwrap_err().is_key_not_found());
    }

    #[tokio::test]
    async fn get_skips_failing_cluster() {
        let a = Arc::new(FaultKv::new(Arc::new(MemoryKv::new())));
        let b = Arc::new(MemoryKv::new());
        b.set(&keys::multicluster("k"), "v").await.unwrap();
        a.set_failing(true);

        let cache = MultiClusterCache::new(vec![a, b]);
        assert_eq!(cache.get("k").await.unwrap(), "v");
    }

    #[tokio::test]
    async fn set_reports_aggregate_error_with_cluster_identity() {
        let a = Arc::new(MemoryKv::new());
        let failing = Arc::new(FaultKv::new(Arc::new(MemoryKv::new())));
        failing.set_failing(true);
        let cache = MultiClusterCache::new(vec![a.clone(), failing]);

        let err = cache.set("k", "v").await.unwrap_err();
        match err {
            ApsisError::MultiCache(errors) => {
                assert_eq!(errors.len(), 1);
                assert_eq!(errors[0].0, 1);
            }
            other => panic!("expected MultiCache, got {other:?}"),
        }
        // The healthy cluster still took the write.
        assert_eq!(a.get(&keys::multicluster("k")).await.unwrap(), "v");
    }

    #[tokio::test]
    async fn delete_averages_counts() {
        let (backing, cache) = three_clusters();
        cache.set("k", "v").await.unwrap();
        // Remove from one cluster directly; 2 of 3 deletions succeed, and
        // floor(2/3) = 0.
        backing[0].delete(&keys::multicluster("k")).await.unwrap();
        assert_eq!(cache.delete("k").await.unwrap(), 0);

        let (_, cache) = three_clusters();
        cache.set("k2", "v").await.unwrap();
        assert_eq!(cache.delete("k2").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn empty_cluster_set_is_a_miss() {
        let cache = MultiClusterCache::new(Vec::new());
        assert!(cache.get("k").await.unwrap_err().is_key_not_found());
        assert_eq!(cache.delete("k").await.unwrap(), 0);
    }
}
