//! Repositories over the relational store.
//!
//! Free async functions per area, generic over the SeaORM connection so the failover pool, transactions,
//! and plain connections all fit. Creates stamp ctime = utime = now;
//! updates stamp utime and report `UpdateFailed` when nothing matched.

pub mod attributes;
pub mod businesses;
pub mod permissions;
pub mod policies;
pub mod resources;
pub mod roles;
pub mod users;

use sea_orm::sea_query::Condition;
use sea_orm::ColumnTrait;

/// Milliseconds since epoch.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

pub const DEFAULT_PAGE_SIZE: u64 = 50;

/// Validity-window filter shared by user-role and user-permission reads:
/// a row is live when start <= now and (end == 0 or now < end).
pub(crate) fn window_contains<S, E>(start: S, end: E, now: i64) -> Condition
where
    S: ColumnTrait,
    E: ColumnTrait,
{
    Condition::all()
        .add(start.lte(now))
        .add(Condition::any().add(end.eq(0)).add(end.gt(now)))
}
