//! The SQL failover path.
//!
//! `monitor` decides whether the primary database is healthy; `pool` wraps
//! the connection so reads short-circuit and writes divert to the failover
//! topic while it is not; `replay` drains the topic back into the store
//! once it recovers.

pub mod monitor;
pub mod pool;
pub mod replay;
