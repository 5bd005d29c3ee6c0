//! Shared-store access for the word-card backend: the redis-backed key-value
//! client, session/identity lookups, monotonic counters and the service
//! registry used for inter-service discovery.

pub mod discovery;
pub mod error;
pub mod identity;
pub mod redis;

pub use crate::discovery::{spawn_heartbeat, ServiceInstance, ServiceRegistry};
pub use crate::error::StoreError;
pub use crate::identity::IdentityStore;
pub use crate::redis::Store;
