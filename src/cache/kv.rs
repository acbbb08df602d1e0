//! The remote key-value seam.
//!
//! `KvStore` is what the fabric layers compose over; `MemoryKv` is the
//! in-process implementation (a TTL map with lazy expiry) that backs the
//! local tier and test doubles; `FaultKv` injects failures for failover
//! tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::errors::ApsisError;

#[async_trait]
pub trait KvStore: Send + Sync {
    /// `KeyNotFound` on miss, distinct from transport errors.
    async fn get(&self, key: &str) -> Result<String, ApsisError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), ApsisError>;
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), ApsisError>;
    /// Returns the number of keys removed (0 or 1).
    async fn delete(&self, key: &str) -> Result<u64, ApsisError>;
    async fn hget(&self, key: &str, field: &str) -> Result<String, ApsisError>;
    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), ApsisError>;
    async fn ping(&self) -> Result<(), ApsisError>;
}

#[derive(Debug, Clone)]
enum Stored {
    Value(String),
    Hash(HashMap<String, String>),
}

#[derive(Debug, Clone)]
struct Entry {
    stored: Stored,
    expires_at: Option<Instant>,
}

/// In-memory store with optional TTL expiry.
#[derive(Debug, Default)]
pub struct MemoryKv {
    // RwLock allows concurrent readers while updates take exclusive access.
    inner: RwLock<HashMap<String, Entry>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    pub async fn clear(&self) {
        self.inner.write().await.clear();
    }

    /// Lazy-expire on read to avoid a background sweeper.
    async fn live_entry(&self, key: &str) -> Option<Entry> {
        let mut guard = self.inner.write().await;
        if let Some(entry) = guard.get(key) {
            if let Some(expires_at) = entry.expires_at {
                if Instant::now() >= expires_at {
                    guard.remove(key);
                    return None;
                }
            }
            return Some(entry.clone());
        }
        None
    }
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn get(&self, key: &str) -> Result<String, ApsisError> {
        match self.live_entry(key).await {
            Some(Entry {
                stored: Stored::Value(value),
                ..
            }) => Ok(value),
            _ => Err(ApsisError::KeyNotFound(key.to_string())),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), ApsisError> {
        self.inner.write().await.insert(
            key.to_string(),
            Entry {
                stored: Stored::Value(value.to_string()),
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), ApsisError> {
        self.inner.write().await.insert(
            key.to_string(),
            Entry {
                stored: Stored::Value(value.to_string()),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<u64, ApsisError> {
        Ok(self.inner.write().await.remove(key).map(|_| 1).unwrap_or(0))
    }

    async fn hget(&self, key: &str, field: &str) -> Result<String, ApsisError> {
        match self.live_entry(key).await {
            Some(Entry {
                stored: Stored::Hash(fields),
                ..
            }) => fields
                .get(field)
                .cloned()
                .ok_or_else(|| ApsisError::KeyNotFound(format!("{key}/{field}"))),
            _ => Err(ApsisError::KeyNotFound(format!("{key}/{field}"))),
        }
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), ApsisError> {
        let mut guard = self.inner.write().await;
        let entry = guard.entry(key.to_string()).or_insert_with(|| Entry {
            stored: Stored::Hash(HashMap::new()),
            expires_at: None,
        });
        match &mut entry.stored {
            Stored::Hash(fields) => {
                fields.insert(field.to_string(), value.to_string());
                Ok(())
            }
            Stored::Value(_) => Err(ApsisError::Cache(format!(
                "key {key} holds a plain value, not a hash"
            ))),
        }
    }

    async fn ping(&self) -> Result<(), ApsisError> {
        Ok(())
    }
}

/// Wrapper that fails every operation while the switch is on.
pub struct FaultKv {
    inner: Arc<dyn KvStore>,
    failing: AtomicBool,
}

impl FaultKv {
    pub fn new(inner: Arc<dyn KvStore>) -> Self {
        Self {
            inner,
            failing: AtomicBool::new(false),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), ApsisError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(ApsisError::Cache("injected failure".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl KvStore for FaultKv {
    async fn get(&self, key: &str) -> Result<String, ApsisError> {
        self.check()?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), ApsisError> {
        self.check()?;
        self.inner.set(key, value).await
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), ApsisError> {
        self.check()?;
        self.inner.set_ex(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<u64, ApsisError> {
        self.check()?;
        self.inner.delete(key).await
    }

    async fn hget(&self, key: &str, field: &str) -> Result<String, ApsisError> {
        self.check()?;
        self.inner.hget(key, field).await
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), ApsisError> {
        self.check()?;
        self.inner.hset(key, field, value).await
    }

    async fn ping(&self) -> Result<(), ApsisError> {
        self.check()?;
        self.inner.ping().await
    }
}
