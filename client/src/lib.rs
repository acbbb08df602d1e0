//! Client SDK for the apsis permission platform.
//!
//! The base [`HttpClient`] speaks the JSON check API; decorators layer
//! caching and batching on top of the shared [`PermissionRpc`] trait:
//! a remote snapshot cache ([`KvCachedClient`]), an in-process cache fed
//! by change events ([`LocalCachedClient`]), a distributed in-process
//! group over a consistent-hash ring ([`GroupCachedClient`]), and a
//! request batcher ([`AggregatorClient`]).

pub mod aggregator;
pub mod client;
pub mod errors;
pub mod group;
pub mod kv_cached;
pub mod local;
pub mod ring;
pub mod types;

pub use aggregator::{AggregatorClient, AggregatorConfig};
pub use client::{HttpClient, PermissionRpc};
pub use errors::ClientError;
pub use group::{GroupCachedClient, PeerCache};
pub use kv_cached::{KvCachedClient, MemorySnapshotStore, SnapshotStore};
pub use local::LocalCachedClient;
pub use ring::HashRing;
pub use types::{
    check_permission, parse_user_permissions_key, user_permissions_key, CheckPermissionRequest,
    Effect, PermissionEntry, ResourceRef, UserPermission, UserPermissionEvent,
};
