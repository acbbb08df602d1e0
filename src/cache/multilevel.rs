//! Multi-level cache: one remote store backed by an in-process store.
//!
//! Normal mode sends reads and writes to the remote. When the error ring
//! declares the remote dead the cache flips to failover mode: the
//! in-process tier is warmed from a caller-supplied loader, a background
//! refresher keeps it fresh, and a pinger probes the remote until one ping
//! succeeds. Recovery stops the refresher, resets the ring, and warms the
//! remote from the loader once more.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use super::bitring::BitRing;
use super::kv::{KvStore, MemoryKv};
use crate::errors::ApsisError;

/// Reads the authoritative store and returns the pairs to warm a tier with.
pub type Loader =
    Arc<dyn Fn() -> BoxFuture<'static, Result<Vec<(String, String)>, ApsisError>> + Send + Sync>;

pub struct MultiLevelConfig {
    pub refresh_interval: Duration,
    pub ping_interval: Duration,
    pub ring_size: usize,
    pub ring_threshold: f64,
    pub ring_min_errors: usize,
}

impl Default for MultiLevelConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(30),
            ping_interval: Duration::from_secs(5),
            ring_size: 16,
            ring_threshold: 0.5,
            ring_min_errors: 3,
        }
    }
}

struct Inner {
    remote: Arc<dyn KvStore>,
    local: Arc<MemoryKv>,
    ring: BitRing,
    /// True while the remote tier is serving.
    available: AtomicBool,
    loader: Loader,
    refresh_interval: Duration,
    ping_interval: Duration,
    /// Serializes transitions into and out of failover.
    transition: Mutex<()>,
    /// Stop signal for the refresher of the current failover episode.
    refresher_stop: std::sync::Mutex<Option<watch::Sender<bool>>>,
    /// Process shutdown; terminates pinger and refresher tasks.
    shutdown: watch::Receiver<bool>,
}

pub struct MultiLevelCache {
    inner: Arc<Inner>,
}

impl MultiLevelCache {
    pub fn new(
        remote: Arc<dyn KvStore>,
        loader: Loader,
        config: MultiLevelConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                remote,
                local: Arc::new(MemoryKv::new()),
                ring: BitRing::new(config.ring_size, config.ring_threshold, config.ring_min_errors),
                available: AtomicBool::new(true),
                loader,
                refresh_interval: config.refresh_interval,
                ping_interval: config.ping_interval,
                transition: Mutex::new(()),
                refresher_stop: std::sync::Mutex::new(None),
                shutdown,
            }),
        }
    }

    pub fn remote_available(&self) -> bool {
        self.inner.available.load(Ordering::Acquire)
    }
}

impl Inner {
    fn available(&self) -> bool {
        self.available.load(Ordering::Acquire)
    }
}

/// Accounts one remote outcome; on a tripped ring, flips to failover.
async fn record(inner: &Arc<Inner>, error: bool) {
    inner.ring.record(error);
    if error && inner.ring.tripped() && inner.available() {
        enter_failover(inner).await;
    }
}

async fn enter_failover(inner: &Arc<Inner>) {
    let _guard = inner.transition.lock().await;
    if !inner.available() {
        return;
    }
    warn!("remote cache declared dead; switching to in-process tier");
    inner.available.store(false, Ordering::Release);

    // Warm the in-process tier from the authoritative loader.
    match (inner.loader)().await {
        Ok(pairs) => {
            for (key, value) in pairs {
                let _ = inner.local.set(&key, &value).await;
            }
        }
        Err(err) => warn!(%err, "failover warm-up load failed"),
    }

    let (stop_tx, stop_rx) = watch::channel(false);
    *inner.refresher_stop.lock().expect("refresher lock poisoned") = Some(stop_tx);
    tokio::spawn(run_refresher(inner.clone(), stop_rx));
    tokio::spawn(run_pinger(inner.clone()));
}

async fn recover(inner: &Arc<Inner>) {
    let _guard = inner.transition.lock().await;
    if inner.available() {
        return;
    }
    info!("remote cache answered a ping; leaving failover");
    inner.available.store(true, Ordering::Release);
    if let Some(stop) = inner
        .refresher_stop
        .lock()
        .expect("refresher lock poisoned")
        .take()
    {
        let _ = stop.send(true);
    }
    inner.ring.reset();

    // Warm the remote so the first reads after recovery hit.
    match (inner.loader)().await {
        Ok(pairs) => {
            for (key, value) in pairs {
                if let Err(err) = inner.remote.set(&key, &value).await {
                    warn!(%err, key, "remote warm-up write failed");
                    break;
                }
            }
        }
        Err(err) => warn!(%err, "recovery warm-up load failed"),
    }
}

async fn run_refresher(inner: Arc<Inner>, mut stop: watch::Receiver<bool>) {
    let mut shutdown = inner.shutdown.clone();
    loop {
        tokio::select! {
            _ = stop.changed() => break,
            _ = shutdown.changed() => break,
            _ = tokio::time::sleep(inner.refresh_interval) => {
                match (inner.loader)().await {
                    Ok(pairs) => {
                        debug!(entries = pairs.len(), "refreshed in-process tier");
                        for (key, value) in pairs {
                            let _ = inner.local.set(&key, &value).await;
                        }
                    }
                    Err(err) => warn!(%err, "in-process refresh failed"),
                }
            }
        }
    }
}

async fn run_pinger(inner: Arc<Inner>) {
    let mut shutdown = inner.shutdown.clone();
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tokio::time::sleep(inner.ping_interval) => {
                if inner.remote.ping().await.is_ok() {
                    recover(&inner).await;
                    break;
                }
                debug!("remote cache ping failed; staying in failover");
            }
        }
    }
}

#[async_trait]
impl KvStore for MultiLevelCache {
    async fn get(&self, key: &str) -> Result<String, ApsisError> {
        if self.inner.available() {
            match self.inner.remote.get(key).await {
                Ok(value) => {
                    record(&self.inner, false).await;
                    return Ok(value);
                }
                Err(err) if err.is_key_not_found() => {
                    record(&self.inner, false).await;
                    return Err(err);
                }
                Err(err) => {
                    record(&self.inner, true).await;
                    if self.inner.available() {
                        return Err(err);
                    }
                    // The ring tripped on this very error; serve the warm tier.
                }
            }
        }
        self.inner.local.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), ApsisError> {
        if self.inner.available() {
            match self.inner.remote.set(key, value).await {
                Ok(()) => {
                    record(&self.inner, false).await;
                    return Ok(());
                }
                Err(err) => {
                    record(&self.inner, true).await;
                    if self.inner.available() {
                        return Err(err);
                    }
                }
            }
        }
        self.inner.local.set(key, value).await
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), ApsisError> {
        if self.inner.available() {
            match self.inner.remote.set_ex(key, value, ttl).await {
                Ok(()) => {
                    record(&self.inner, false).await;
                    return Ok(());
                }
                Err(err) => {
                    record(&self.inner, true).await;
                    if self.inner.available() {
                        return Err(err);
                    }
                }
            }
        }
        self.inner.local.set_ex(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<u64, ApsisError> {
        if self.inner.available() {
            match self.inner.remote.delete(key).await {
                Ok(count) => {
                    record(&self.inner, false).await;
                    return Ok(count);
                }
                Err(err) => {
                    record(&self.inner, true).await;
                    if self.inner.available() {
                        return Err(err);
                    }
                }
            }
        }
        self.inner.local.delete(key).await
    }

    async fn hget(&self, key: &str, field: &str) -> Result<String, ApsisError> {
        if self.inner.available() {
            match self.inner.remote.hget(key, field).await {
                Ok(value) => {
                    record(&self.inner, false).await;
                    return Ok(value);
                }
                Err(err) if err.is_key_not_found() => {
                    record(&self.inner, false).await;
                    return Err(err);
                }
                Err(err) => {
                    record(&self.inner, true).await;
                    if self.inner.available() {
                        return Err(err);
                    }
                }
            }
        }
        self.inner.local.hget(key, field).await
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), ApsisError> {
        if self.inner.available() {
            match self.inner.remote.hset(key, field, value).await {
                Ok(()) => {
                    record(&self.inner, false).await;
                    return Ok(());
                }
                Err(err) => {
                    record(&self.inner, true).await;
                    if self.inner.available() {
                        return Err(err);
                    }
                }
            }
        }
        self.inner.local.hset(key, field, value).await
    }

    async fn ping(&self) -> Result<(), ApsisError> {
        if self.inner.available() {
            self.inner.remote.ping().await
        } else {
            Ok(())
        }
    }
}
