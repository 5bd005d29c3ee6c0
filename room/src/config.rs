//! Environment-driven configuration.

use std::env;

pub struct RoomConfig {
    /// RPC bind address.
    pub rpc_addr: String,
    /// Address other services dial; goes into the registry record.
    pub advertise_addr: String,
    pub redis_url: String,
    /// Fallback gateway notify address when neither the routing table nor
    /// discovery resolves one.
    pub gateway_addr: Option<String>,
    /// Override for the built-in word table.
    pub word_table_path: Option<String>,
    /// Registry key prefix separating environments.
    pub registry_prefix: String,
}

impl RoomConfig {
    pub fn from_env() -> Self {
        Self {
            rpc_addr: env_or("ROOM_RPC_ADDR", "0.0.0.0:8693"),
            advertise_addr: env_or("ROOM_ADVERTISE_ADDR", "127.0.0.1:8693"),
            redis_url: env_or("REDIS_URL", "redis://127.0.0.1:6379"),
            gateway_addr: env::var("GATEWAY_NOTIFY_FALLBACK_ADDR").ok(),
            word_table_path: env::var("WORD_TABLE_PATH").ok(),
            registry_prefix: env_or("REGISTRY_PREFIX", "prod_"),
        }
    }
}

pub fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}
