//! Gateway binary: client listeners, player sessions and notify endpoints.

mod config;
mod conn;
mod handlers;
mod manager;
mod notify_api;
mod rpc;
mod session;

use std::sync::Arc;

use actix_web::{web, App, HttpServer};
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use wordcard_store::{spawn_heartbeat, IdentityStore, ServiceInstance, ServiceRegistry, Store};

use crate::config::GatewayConfig;
use crate::conn::Connection;
use crate::manager::SessionManager;
use crate::notify_api::NotifyState;
use crate::rpc::{MatchClient, RoomClient};
use crate::session::{run_session, GatewayShared};

/// Name this service registers under.
const SERVICE_NAME: &str = "gateway-server";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{}=debug,info", env!("CARGO_CRATE_NAME")).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = GatewayConfig::from_env();
    tracing::info!(
        tcp = %cfg.tcp_addr,
        ws = %cfg.ws_addr,
        notify = %cfg.notify_addr,
        "starting gateway"
    );

    let store = Store::connect(&cfg.redis_url).await?;
    let identity = IdentityStore::new(store.clone());

    let registry = ServiceRegistry::new(store.clone(), cfg.registry_prefix.clone());
    let instance = ServiceInstance {
        service_name: SERVICE_NAME.to_string(),
        instance_id: format!("gateway-{}", Uuid::new_v4()),
        address: cfg.notify_advertise_addr.clone(),
        metadata: [("version".to_string(), "1.0".to_string())].into(),
    };
    registry.register(&instance).await?;
    tracing::info!(instance = %instance.instance_id, address = %instance.address, "registered");
    let instance_id = instance.instance_id.clone();
    let heartbeat = spawn_heartbeat(registry.clone(), instance);

    let room_client = RoomClient::new(cfg.room_addr.clone());
    room_client.spawn_watch(&registry);
    let match_client = MatchClient::new(cfg.match_addr.clone());
    match_client.spawn_watch(&registry);

    let manager = Arc::new(SessionManager::default());
    let shared = Arc::new(GatewayShared {
        manager: Arc::clone(&manager),
        identity,
        room_client,
        match_client,
        notify_addr: cfg.notify_advertise_addr.clone(),
    });

    spawn_tcp_listener(&cfg.tcp_addr, Arc::clone(&shared)).await?;
    spawn_ws_listener(&cfg.ws_addr, Arc::clone(&shared)).await?;

    let notify_state = web::Data::new(NotifyState { manager });
    let result = HttpServer::new(move || {
        App::new()
            .app_data(notify_state.clone())
            .configure(notify_api::routes)
    })
    .bind(&cfg.notify_addr)?
    .run()
    .await;

    heartbeat.abort();
    if let Err(err) = registry.deregister(SERVICE_NAME, &instance_id).await {
        tracing::warn!(error = %err, "deregister failed");
    }
    Ok(result?)
}

async fn spawn_tcp_listener(addr: &str, shared: Arc<GatewayShared>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(addr, "tcp listener up");
    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    tracing::debug!(%peer, "tcp connection accepted");
                    let shared = Arc::clone(&shared);
                    tokio::spawn(run_session(Connection::Tcp(stream), shared));
                }
                Err(err) => tracing::warn!(error = %err, "tcp accept failed"),
            }
        }
    });
    Ok(())
}

async fn spawn_ws_listener(addr: &str, shared: Arc<GatewayShared>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(addr, "websocket listener up");
    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    tracing::debug!(%peer, "websocket connection accepted");
                    let shared = Arc::clone(&shared);
                    tokio::spawn(async move {
                        match tokio_tungstenite::accept_async(stream).await {
                            Ok(ws) => run_session(Connection::Ws(ws), shared).await,
                            Err(err) => tracing::warn!(error = %err, "websocket handshake failed"),
                        }
                    });
                }
                Err(err) => tracing::warn!(error = %err, "websocket accept failed"),
            }
        }
    });
    Ok(())
}
