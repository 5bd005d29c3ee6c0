//! Thin async client over the shared store.
//!
//! Wraps a multiplexed [`ConnectionManager`]; the handle is cheap to clone
//! and every service holds one. The method set mirrors the primitives the
//! backend actually uses: plain strings with optional TTL, JSON values,
//! counters, hashes, sets and the heartbeat-scored sorted set.

use std::collections::HashMap;
use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::StoreError;

#[derive(Clone)]
pub struct Store {
    conn: ConnectionManager,
}

impl Store {
    /// Connect to the store. Reconnection is handled internally by the
    /// connection manager.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }

    pub async fn get_string(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.conn.clone().get(key).await?)
    }

    pub async fn set_string(&self, key: &str, value: &str) -> Result<(), StoreError> {
        Ok(self.conn.clone().set(key, value).await?)
    }

    pub async fn set_string_ex(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        Ok(self.conn.clone().set_ex(key, value, ttl.as_secs()).await?)
    }

    /// SETNX. Returns true when the key was created.
    pub async fn set_nx(&self, key: &str, value: &str) -> Result<bool, StoreError> {
        Ok(self.conn.clone().set_nx(key, value).await?)
    }

    pub async fn delete(&self, key: &str) -> Result<(), StoreError> {
        Ok(self.conn.clone().del(key).await?)
    }

    /// INCR-style monotonic counter.
    pub async fn incr(&self, key: &str) -> Result<u64, StoreError> {
        Ok(self.conn.clone().incr(key, 1u64).await?)
    }

    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        match self.get_string(key).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub async fn set_json<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        let raw = serde_json::to_string(value)?;
        match ttl {
            Some(ttl) => self.set_string_ex(key, &raw, ttl).await,
            None => self.set_string(key, &raw).await,
        }
    }

    pub async fn hset_all(&self, key: &str, fields: &[(&str, String)]) -> Result<(), StoreError> {
        Ok(self.conn.clone().hset_multiple(key, fields).await?)
    }

    pub async fn hget_all(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
        Ok(self.conn.clone().hgetall(key).await?)
    }

    pub async fn sadd(&self, key: &str, member: &str) -> Result<(), StoreError> {
        Ok(self.conn.clone().sadd(key, member).await?)
    }

    pub async fn srem(&self, key: &str, member: &str) -> Result<(), StoreError> {
        Ok(self.conn.clone().srem(key, member).await?)
    }

    pub async fn smembers(&self, key: &str) -> Result<Vec<String>, StoreError> {
        Ok(self.conn.clone().smembers(key).await?)
    }

    pub async fn zadd(&self, key: &str, member: &str, score: i64) -> Result<(), StoreError> {
        Ok(self.conn.clone().zadd(key, member, score).await?)
    }

    pub async fn zrem(&self, key: &str, member: &str) -> Result<(), StoreError> {
        Ok(self.conn.clone().zrem(key, member).await?)
    }

    pub async fn zrangebyscore(
        &self,
        key: &str,
        min: i64,
        max: i64,
    ) -> Result<Vec<String>, StoreError> {
        Ok(self.conn.clone().zrangebyscore(key, min, max).await?)
    }

    pub async fn zrembyscore(&self, key: &str, min: i64, max: i64) -> Result<(), StoreError> {
        Ok(self.conn.clone().zrembyscore(key, min, max).await?)
    }
}
