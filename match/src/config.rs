//! Environment-driven configuration.

use std::env;

pub struct MatchConfig {
    pub rpc_addr: String,
    pub advertise_addr: String,
    pub redis_url: String,
    /// Fallback room service address when discovery has nothing.
    pub room_addr: Option<String>,
    /// Fallback gateway notify address.
    pub gateway_addr: Option<String>,
    /// Seconds a player may wait before the queue evicts them.
    pub match_timeout_secs: i64,
    pub registry_prefix: String,
}

impl MatchConfig {
    pub fn from_env() -> Self {
        Self {
            rpc_addr: env_or("MATCH_RPC_ADDR", "0.0.0.0:50052"),
            advertise_addr: env_or("MATCH_ADVERTISE_ADDR", "127.0.0.1:50052"),
            redis_url: env_or("REDIS_URL", "redis://127.0.0.1:6379"),
            room_addr: env::var("ROOM_RPC_FALLBACK_ADDR").ok(),
            gateway_addr: env::var("GATEWAY_NOTIFY_FALLBACK_ADDR").ok(),
            match_timeout_secs: env_or("MATCH_TIMEOUT_SECS", "30")
                .parse()
                .unwrap_or(30),
            registry_prefix: env_or("REGISTRY_PREFIX", "prod_"),
        }
    }
}

pub fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}
