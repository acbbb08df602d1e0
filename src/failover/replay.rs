//! Replay consumers for the failover topic.
//!
//! The SQL replay executes diverted `{sql, args}` events once the monitor
//! reports the store healthy again; while it is unhealthy, deliveries stay
//! uncommitted and the consumer backs off. A sibling KV replay extracts
//! `(key, value)` pairs through a caller-supplied extractor and applies
//! them as plain sets with no expiry.

use std::sync::Arc;

use sea_orm::{ConnectionTrait, DatabaseConnection, Statement};
use tokio::sync::watch;
use tracing::info;

use super::monitor::DbMonitor;
use super::pool::json_to_sea_value;
use crate::cache::kv::KvStore;
use crate::errors::ApsisError;
use crate::events::bus::EventBus;
use crate::events::consumers::run_consumer;
use crate::events::types::DbFailoverEvent;

/// Pairs to apply to the KV store, derived from one failover event.
pub type KvExtractor = Arc<dyn Fn(&DbFailoverEvent) -> Vec<(String, String)> + Send + Sync>;

pub fn spawn_sql_replay_consumer(
    bus: Arc<dyn EventBus>,
    topic: String,
    db: DatabaseConnection,
    monitor: Arc<DbMonitor>,
    shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let sub = bus.subscribe(&topic).await;
        run_consumer("sql-replay", sub, shutdown, move |payload| {
            let db = db.clone();
            let monitor = monitor.clone();
            async move {
                let event: DbFailoverEvent = serde_json::from_slice(&payload)?;
                if !monitor.healthy() {
                    // Not committed; the delivery comes back after the
                    // consumer's pause.
                    return Err(ApsisError::DbUnavailable);
                }
                let values: Vec<sea_orm::Value> =
                    event.args.iter().map(json_to_sea_value).collect();
                let stmt = Statement::from_sql_and_values(
                    db.get_database_backend(),
                    &event.sql,
                    values,
                );
                db.execute(stmt).await?;
                info!(sql = %event.sql, "replayed diverted write");
                Ok(())
            }
        })
        .await;
    })
}

pub fn spawn_kv_replay_consumer(
    bus: Arc<dyn EventBus>,
    topic: String,
    kv: Arc<dyn KvStore>,
    extractor: KvExtractor,
    shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let sub = bus.subscribe(&topic).await;
        run_consumer("kv-replay", sub, shutdown, move |payload| {
            let kv = kv.clone();
            let extractor = extractor.clone();
            async move {
                let event: DbFailoverEvent = serde_json::from_slice(&payload)?;
                for (key, value) in extractor(&event) {
                    kv.set(&key, &value).await?;
                }
                Ok(())
            }
        })
        .await;
    })
}
