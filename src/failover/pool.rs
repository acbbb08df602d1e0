//! Connection wrapper that intercepts SQL while the store is unhealthy.
//!
//! Reads short-circuit with the unavailable sentinel. Writes are published
//! to the failover topic as `{sql, args}` and reported as `ToAsync` so the
//! caller can mark the operation accepted-but-deferred; a failed publish is
//! a hard error. With a healthy monitor everything delegates.

use std::sync::Arc;

use async_trait::async_trait;
use sea_orm::{ConnectionTrait, DatabaseConnection, DbBackend, DbErr, ExecResult, QueryResult, Statement};
use tracing::warn;

use super::monitor::DbMonitor;
use crate::errors::{ApsisError, DB_UNAVAILABLE_SENTINEL, TO_ASYNC_SENTINEL};
use crate::events::bus::EventBus;
use crate::events::types::DbFailoverEvent;

#[derive(Clone)]
pub struct FailoverPool {
    db: DatabaseConnection,
    monitor: Arc<DbMonitor>,
    bus: Arc<dyn EventBus>,
    topic: String,
}

impl FailoverPool {
    pub fn new(
        db: DatabaseConnection,
        monitor: Arc<DbMonitor>,
        bus: Arc<dyn EventBus>,
        topic: String,
    ) -> Self {
        Self {
            db,
            monitor,
            bus,
            topic,
        }
    }

    pub fn monitor(&self) -> &Arc<DbMonitor> {
        &self.monitor
    }

    /// The raw connection, for multi-statement transactions that cannot be
    /// diverted to the stream. Fails fast while the store is unhealthy.
    pub fn transactional(&self) -> Result<&DatabaseConnection, ApsisError> {
        if self.monitor.healthy() {
            Ok(&self.db)
        } else {
            Err(ApsisError::DbUnavailable)
        }
    }

    async fn divert(&self, sql: String, args: Vec<serde_json::Value>) -> Result<ExecResult, DbErr> {
        let event = DbFailoverEvent { sql, args };
        let payload =
            serde_json::to_vec(&event).map_err(|e| DbErr::Custom(format!("failover encode: {e}")))?;
        self.bus
            .publish(&self.topic, &payload)
            .await
            .map_err(|e| DbErr::Custom(format!("failover publish: {e}")))?;
        warn!(sql = %event.sql, "write diverted to failover stream");
        Err(DbErr::Custom(TO_ASYNC_SENTINEL.to_string()))
    }
}

#[async_trait]
impl ConnectionTrait for FailoverPool {
    fn get_database_backend(&self) -> DbBackend {
        self.db.get_database_backend()
    }

    async fn execute(&self, stmt: Statement) -> Result<ExecResult, DbErr> {
        if self.monitor.healthy() {
            return self.db.execute(stmt).await;
        }
        let args = stmt
            .values
            .as_ref()
            .map(|values| values.0.iter().map(sea_value_to_json).collect())
            .unwrap_or_default();
        self.divert(stmt.sql, args).await
    }

    async fn execute_unprepared(&self, sql: &str) -> Result<ExecResult, DbErr> {
        if self.monitor.healthy() {
            return self.db.execute_unprepared(sql).await;
        }
        self.divert(sql.to_string(), Vec::new()).await
    }

    async fn query_one(&self, stmt: Statement) -> Result<Option<QueryResult>, DbErr> {
        if self.monitor.healthy() {
            self.db.query_one(stmt).await
        } else {
            Err(DbErr::Custom(DB_UNAVAILABLE_SENTINEL.to_string()))
        }
    }

    async fn query_all(&self, stmt: Statement) -> Result<Vec<QueryResult>, DbErr> {
        if self.monitor.healthy() {
            self.db.query_all(stmt).await
        } else {
            Err(DbErr::Custom(DB_UNAVAILABLE_SENTINEL.to_string()))
        }
    }
}

/// Statement arguments as JSON, for the wire event.
fn sea_value_to_json(value: &sea_orm::Value) -> serde_json::Value {
    use sea_orm::Value;
    match value {
        Value::Bool(Some(v)) => serde_json::json!(v),
        Value::TinyInt(Some(v)) => serde_json::json!(v),
        Value::SmallInt(Some(v)) => serde_json::json!(v),
        Value::Int(Some(v)) => serde_json::json!(v),
        Value::BigInt(Some(v)) => serde_json::json!(v),
        Value::TinyUnsigned(Some(v)) => serde_json::json!(v),
        Value::SmallUnsigned(Some(v)) => serde_json::json!(v),
        Value::Unsigned(Some(v)) => serde_json::json!(v),
        Value::BigUnsigned(Some(v)) => serde_json::json!(v),
        Value::Float(Some(v)) => serde_json::json!(v),
        Value::Double(Some(v)) => serde_json::json!(v),
        Value::String(Some(v)) => serde_json::json!(v.as_ref()),
        Value::Char(Some(v)) => serde_json::json!(v.to_string()),
        Value::Bytes(Some(v)) => serde_json::json!(String::from_utf8_lossy(v)),
        _ => serde_json::Value::Null,
    }
}

/// JSON argument back to a bind value, for replay.
pub fn json_to_sea_value(value: &serde_json::Value) -> sea_orm::Value {
    use sea_orm::Value;
    match value {
        serde_json::Value::Bool(v) => Value::Bool(Some(*v)),
        serde_json::Value::Number(n) => {
            if let Some(v) = n.as_i64() {
                Value::BigInt(Some(v))
            } else {
                Value::Double(n.as_f64())
            }
        }
        serde_json::Value::String(v) => Value::String(Some(Box::new(v.clone()))),
        _ => Value::String(None),
    }
}
