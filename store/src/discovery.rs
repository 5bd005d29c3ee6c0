//! Service registry backed by the shared store.
//!
//! Instances register a JSON record with a TTL, join the service's member
//! set, and refresh a heartbeat score in a sorted set. Discovery returns the
//! members whose heartbeat falls inside the expiry window and sweeps stale
//! scores while it is at it. `watch` polls and emits the instance list
//! whenever it changes.

use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::StoreError;
use crate::redis::Store;

/// How often a live instance refreshes its heartbeat.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);
/// Heartbeats older than this are treated as dead.
pub const HEARTBEAT_EXPIRY: Duration = Duration::from_secs(15);
/// Poll period for `watch`.
pub const WATCH_POLL_INTERVAL: Duration = Duration::from_secs(5);

const SERVICE_KEY_PREFIX: &str = "service:";
const HEARTBEAT_KEY: &str = "service_heartbeat";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInstance {
    pub service_name: String,
    pub instance_id: String,
    /// RPC address other services dial, `host:port`.
    pub address: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Clone)]
pub struct ServiceRegistry {
    store: Store,
    /// Key prefix separating environments sharing one store.
    prefix: String,
}

impl ServiceRegistry {
    pub fn new(store: Store, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
        }
    }

    fn key(&self, rest: &str) -> String {
        format!("{}{}", self.prefix, rest)
    }

    fn instance_key(&self, service_name: &str, instance_id: &str) -> String {
        self.key(&format!("{SERVICE_KEY_PREFIX}{service_name}:{instance_id}"))
    }

    fn member_set_key(&self, service_name: &str) -> String {
        self.key(&format!("{SERVICE_KEY_PREFIX}{service_name}"))
    }

    pub async fn register(&self, instance: &ServiceInstance) -> Result<(), StoreError> {
        let raw = serde_json::to_string(instance)?;
        self.store
            .set_string_ex(
                &self.instance_key(&instance.service_name, &instance.instance_id),
                &raw,
                HEARTBEAT_EXPIRY,
            )
            .await?;
        self.store
            .sadd(&self.member_set_key(&instance.service_name), &instance.instance_id)
            .await?;
        self.heartbeat(&instance.instance_id).await?;
        tracing::debug!(
            service = %instance.service_name,
            instance = %instance.instance_id,
            address = %instance.address,
            "service instance registered"
        );
        Ok(())
    }

    pub async fn deregister(
        &self,
        service_name: &str,
        instance_id: &str,
    ) -> Result<(), StoreError> {
        self.store
            .srem(&self.member_set_key(service_name), instance_id)
            .await?;
        self.store
            .delete(&self.instance_key(service_name, instance_id))
            .await?;
        self.store.zrem(&self.key(HEARTBEAT_KEY), instance_id).await?;
        Ok(())
    }

    /// Refresh the heartbeat score to "now".
    pub async fn heartbeat(&self, instance_id: &str) -> Result<(), StoreError> {
        self.store
            .zadd(&self.key(HEARTBEAT_KEY), instance_id, unix_now())
            .await
    }

    /// Instances of a service whose heartbeat is within the expiry window.
    pub async fn discover(&self, service_name: &str) -> Result<Vec<ServiceInstance>, StoreError> {
        let member_ids = self.store.smembers(&self.member_set_key(service_name)).await?;

        let now = unix_now();
        let cutoff = now - HEARTBEAT_EXPIRY.as_secs() as i64;

        // Garbage-collect expired heartbeat scores while we hold the answer.
        self.store
            .zrembyscore(&self.key(HEARTBEAT_KEY), 0, cutoff)
            .await?;
        let fresh = self
            .store
            .zrangebyscore(&self.key(HEARTBEAT_KEY), cutoff, now)
            .await?;

        let mut instances = Vec::new();
        for id in live_members(&member_ids, &fresh) {
            let Some(raw) = self.store.get_string(&self.instance_key(service_name, id)).await?
            else {
                continue; // Record TTL'd out between heartbeats.
            };
            instances.push(serde_json::from_str(&raw)?);
        }
        Ok(instances)
    }

    /// Poll the service's instance list and emit it whenever it changes. The
    /// first emission is the current state. The task stops when the receiver
    /// is dropped.
    pub fn watch(&self, service_name: impl Into<String>) -> mpsc::Receiver<Vec<ServiceInstance>> {
        let (tx, rx) = mpsc::channel(10);
        let registry = self.clone();
        let service_name = service_name.into();

        tokio::spawn(async move {
            let mut last = registry.discover(&service_name).await.unwrap_or_default();
            if tx.send(last.clone()).await.is_err() {
                return;
            }

            let mut interval = tokio::time::interval(WATCH_POLL_INTERVAL);
            loop {
                interval.tick().await;
                let current = match registry.discover(&service_name).await {
                    Ok(instances) => instances,
                    Err(err) => {
                        tracing::warn!(service = %service_name, error = %err, "discover failed");
                        continue;
                    }
                };
                if instances_changed(&last, &current) {
                    if tx.send(current.clone()).await.is_err() {
                        return;
                    }
                    last = current;
                }
            }
        });

        rx
    }
}

/// Keep an instance alive until the task is aborted. Each beat re-registers,
/// which refreshes both the heartbeat score and the instance record's TTL.
pub fn spawn_heartbeat(registry: ServiceRegistry, instance: ServiceInstance) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(HEARTBEAT_INTERVAL);
        interval.tick().await; // First tick fires immediately; we just registered.
        loop {
            interval.tick().await;
            if let Err(err) = registry.register(&instance).await {
                tracing::error!(instance = %instance.instance_id, error = %err, "heartbeat failed");
            }
        }
    })
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Member ids that also have a fresh heartbeat, in member-set order.
fn live_members<'a>(members: &'a [String], fresh: &[String]) -> Vec<&'a String> {
    members.iter().filter(|id| fresh.contains(id)).collect()
}

fn instances_changed(a: &[ServiceInstance], b: &[ServiceInstance]) -> bool {
    if a.len() != b.len() {
        return true;
    }
    b.iter().any(|ins| {
        !a.iter().any(|other| {
            other.instance_id == ins.instance_id
                && other.service_name == ins.service_name
                && other.address == ins.address
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance(id: &str, addr: &str) -> ServiceInstance {
        ServiceInstance {
            service_name: "room-server".into(),
            instance_id: id.into(),
            address: addr.into(),
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn live_members_filters_stale_ids() {
        let members = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let fresh = vec!["c".to_string(), "a".to_string()];
        let live = live_members(&members, &fresh);
        assert_eq!(live, vec!["a", "c"]);
    }

    #[test]
    fn watch_change_detection() {
        let a = vec![instance("i1", "10.0.0.1:8693")];
        let same = vec![instance("i1", "10.0.0.1:8693")];
        let moved = vec![instance("i1", "10.0.0.2:8693")];
        let grown = vec![instance("i1", "10.0.0.1:8693"), instance("i2", "10.0.0.3:8693")];

        assert!(!instances_changed(&a, &same));
        assert!(instances_changed(&a, &moved));
        assert!(instances_changed(&a, &grown));
        assert!(instances_changed(&grown, &a));
    }

    #[test]
    fn instance_record_roundtrip() {
        let ins = instance("i1", "127.0.0.1:9000");
        let raw = serde_json::to_string(&ins).unwrap();
        let back: ServiceInstance = serde_json::from_str(&raw).unwrap();
        assert_eq!(back, ins);
    }
}
