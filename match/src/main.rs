//! Match service binary.

mod config;
mod queue;
mod service;

use std::sync::Arc;

use actix_web::{web, App, HttpServer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use wordcard_store::{spawn_heartbeat, ServiceInstance, ServiceRegistry, Store};

use crate::config::MatchConfig;
use crate::service::{MatchService, SERVICE_NAME};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{}=debug,info", env!("CARGO_CRATE_NAME")).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = MatchConfig::from_env();
    tracing::info!(addr = %cfg.rpc_addr, timeout = cfg.match_timeout_secs, "starting match service");

    let store = Store::connect(&cfg.redis_url).await?;

    let registry = ServiceRegistry::new(store.clone(), cfg.registry_prefix.clone());
    let instance = ServiceInstance {
        service_name: SERVICE_NAME.to_string(),
        instance_id: format!("match-{}", Uuid::new_v4()),
        address: cfg.advertise_addr.clone(),
        metadata: [("version".to_string(), "1.0".to_string())].into(),
    };
    registry.register(&instance).await?;
    tracing::info!(instance = %instance.instance_id, address = %instance.address, "registered");
    let instance_id = instance.instance_id.clone();
    let heartbeat = spawn_heartbeat(registry.clone(), instance);

    let service = Arc::new(MatchService::new(
        store,
        cfg.room_addr.clone(),
        cfg.gateway_addr.clone(),
        cfg.match_timeout_secs,
    ));
    service.restore_snapshot().await;
    service.spawn_watches(&registry);
    Arc::clone(&service).spawn_sweeper();
    Arc::clone(&service).spawn_snapshot_saver();

    let data = web::Data::from(Arc::clone(&service));
    let result = HttpServer::new(move || App::new().app_data(data.clone()).configure(service::routes))
        .bind(&cfg.rpc_addr)?
        .run()
        .await;

    heartbeat.abort();
    if let Err(err) = registry.deregister(SERVICE_NAME, &instance_id).await {
        tracing::warn!(error = %err, "deregister failed");
    }
    Ok(result?)
}
