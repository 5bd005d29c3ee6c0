//! Room service binary: hosts the room actors and their RPC surface.

mod config;
mod game;
mod notify;
mod room;
mod server;
mod wordcard;

use std::sync::Arc;

use actix_web::{web, App, HttpServer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use wordcard_store::{spawn_heartbeat, IdentityStore, ServiceInstance, ServiceRegistry, Store};

use crate::config::RoomConfig;
use crate::game::{GameRules, DEFAULT_WORD_TABLE};
use crate::notify::GatewayNotifier;
use crate::room::RoomIndex;
use crate::server::{RoomService, SERVICE_NAME};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{}=debug,info", env!("CARGO_CRATE_NAME")).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = RoomConfig::from_env();
    tracing::info!(addr = %cfg.rpc_addr, "starting room service");

    let store = Store::connect(&cfg.redis_url).await?;
    let identity = IdentityStore::new(store.clone());

    let registry = ServiceRegistry::new(store.clone(), cfg.registry_prefix.clone());
    let instance = ServiceInstance {
        service_name: SERVICE_NAME.to_string(),
        instance_id: format!("room-{}", Uuid::new_v4()),
        address: cfg.advertise_addr.clone(),
        metadata: [("version".to_string(), "1.0".to_string())].into(),
    };
    registry.register(&instance).await?;
    tracing::info!(instance = %instance.instance_id, address = %instance.address, "registered");
    let instance_id = instance.instance_id.clone();
    let heartbeat = spawn_heartbeat(registry.clone(), instance);

    let word_table = match &cfg.word_table_path {
        Some(path) => std::fs::read_to_string(path)?,
        None => DEFAULT_WORD_TABLE.to_string(),
    };
    let rules = Arc::new(GameRules::from_word_table(&word_table)?);
    tracing::info!(words = rules.deck_template.len(), "word table loaded");

    let notifier = GatewayNotifier::new(identity.clone(), cfg.gateway_addr.clone());
    notifier.spawn_gateway_watch(&registry);

    let service = web::Data::new(RoomService {
        index: Arc::new(RoomIndex::default()),
        rules,
        notifier,
        identity,
    });

    let result = HttpServer::new(move || App::new().app_data(service.clone()).configure(server::routes))
        .bind(&cfg.rpc_addr)?
        .run()
        .await;

    heartbeat.abort();
    if let Err(err) = registry.deregister(SERVICE_NAME, &instance_id).await {
        tracing::warn!(error = %err, "deregister failed");
    }
    Ok(result?)
}
