//! Environment-driven configuration.

use std::env;

pub struct GatewayConfig {
    /// Framed-TCP listener for game clients.
    pub tcp_addr: String,
    /// WebSocket listener for game clients.
    pub ws_addr: String,
    /// Bind address of the notify RPC endpoints.
    pub notify_addr: String,
    /// Address peers dial for notifications; registered and written into
    /// the per-user routing table.
    pub notify_advertise_addr: String,
    pub redis_url: String,
    /// Fallback peer addresses when discovery has nothing.
    pub room_addr: String,
    pub match_addr: String,
    pub registry_prefix: String,
}

impl GatewayConfig {
    pub fn from_env() -> Self {
        Self {
            tcp_addr: env_or("GATEWAY_TCP_ADDR", "0.0.0.0:8690"),
            ws_addr: env_or("GATEWAY_WS_ADDR", "0.0.0.0:8691"),
            notify_addr: env_or("GATEWAY_NOTIFY_ADDR", "0.0.0.0:8694"),
            notify_advertise_addr: env_or("GATEWAY_NOTIFY_ADVERTISE_ADDR", "127.0.0.1:8694"),
            redis_url: env_or("REDIS_URL", "redis://127.0.0.1:6379"),
            room_addr: env_or("ROOM_RPC_FALLBACK_ADDR", "127.0.0.1:8693"),
            match_addr: env_or("MATCH_RPC_FALLBACK_ADDR", "127.0.0.1:50052"),
            registry_prefix: env_or("REGISTRY_PREFIX", "prod_"),
        }
    }
}

pub fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}
