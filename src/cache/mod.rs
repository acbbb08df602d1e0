//! The cache fabric.
//!
//! `kv` is the remote key-value seam with an in-process implementation;
//! `multicluster` replicates across redundant clusters; `multilevel` falls
//! back from remote to in-process when the `bitring` error detector trips;
//! `session` holds per-user permission snapshots; `abac` is the cache-aside
//! layer for attribute bags and definitions; `hot` is the policy hot-key
//! cache fed by the coordinator topic.

pub mod abac;
pub mod bitring;
pub mod hot;
pub mod keys;
pub mod kv;
pub mod multicluster;
pub mod multilevel;
pub mod session;
