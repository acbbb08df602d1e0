//! Database health monitor.
//!
//! A heartbeat pinger samples the store once a second with a five-second
//! ping timeout. Three consecutive failures mark it unhealthy; three
//! consecutive successes mark it healthy again. Counters reset on any
//! opposite-outcome sample and on every flip. The health snapshot is read
//! without locking.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use sea_orm::DatabaseConnection;
use tokio::sync::watch;
use tracing::{info, warn};

const PING_PERIOD: Duration = Duration::from_secs(1);
const PING_TIMEOUT: Duration = Duration::from_secs(5);
const FLIP_THRESHOLD: u32 = 3;

#[derive(Debug)]
pub struct DbMonitor {
    healthy: AtomicBool,
    fail_count: AtomicU32,
    ok_count: AtomicU32,
}

impl Default for DbMonitor {
    fn default() -> Self {
        Self {
            healthy: AtomicBool::new(true),
            fail_count: AtomicU32::new(0),
            ok_count: AtomicU32::new(0),
        }
    }
}

impl DbMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn healthy(&self) -> bool {
        self.healthy.load(Ordering::Relaxed)
    }

    /// Feeds one ping outcome into the flip counters.
    pub fn sample(&self, ok: bool) {
        if ok {
            self.fail_count.store(0, Ordering::Relaxed);
            if !self.healthy() {
                let oks = self.ok_count.fetch_add(1, Ordering::Relaxed) + 1;
                if oks >= FLIP_THRESHOLD {
                    self.ok_count.store(0, Ordering::Relaxed);
                    self.healthy.store(true, Ordering::Relaxed);
                    info!("database marked healthy again");
                }
            }
        } else {
            self.ok_count.store(0, Ordering::Relaxed);
            if self.healthy() {
                let fails = self.fail_count.fetch_add(1, Ordering::Relaxed) + 1;
                if fails >= FLIP_THRESHOLD {
                    self.fail_count.store(0, Ordering::Relaxed);
                    self.healthy.store(false, Ordering::Relaxed);
                    warn!("database marked unhealthy");
                }
            }
        }
    }

    /// Owns the heartbeat pinger until shutdown.
    pub fn start(
        self: Arc<Self>,
        db: DatabaseConnection,
        mut shutdown: watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = tokio::time::sleep(PING_PERIOD) => {
                        let ok = matches!(
                            tokio::time::timeout(PING_TIMEOUT, db.ping()).await,
                            Ok(Ok(()))
                        );
                        self.sample(ok);
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn three_failures_flip_unhealthy() {
        let monitor = DbMonitor::new();
        assert!(monitor.healthy());
        monitor.sample(false);
        monitor.sample(false);
        assert!(monitor.healthy());
        monitor.sample(false);
        assert!(!monitor.healthy());
    }

    #[test]
    fn three_successes_flip_back() {
        let monitor = DbMonitor::new();
        for _ in 0..3 {
            monitor.sample(false);
        }
        assert!(!monitor.healthy());
        monitor.sample(true);
        monitor.sample(true);
        assert!(!monitor.healthy());
        monitor.sample(true);
        assert!(monitor.healthy());
    }

    #[test]
    fn opposite_sample_resets_the_streak() {
        let monitor = DbMonitor::new();
        monitor.sample(false);
        monitor.sample(false);
        monitor.sample(true); // streak broken
        monitor.sample(false);
        monitor.sample(false);
        assert!(monitor.healthy());
        monitor.sample(false);
        assert!(!monitor.healthy());
    }
}
