//! Notification fan-out towards gateways.
//!
//! Every broadcast turns into one HTTP notify per room member. Delivery is
//! best effort: failures are logged and swallowed, and the periodic state
//! broadcasts converge any receiver that missed one. The hosting gateway for
//! a user is resolved through the store routing entry written at auth, with
//! the discovered gateway list (then the configured address) as fallback.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::RwLock;

use wordcard_protocol::rpc::{
    GameEndNotifyRpc, GameStartNotifyRpc, GameStateNotifyRpc, NotifyRpcResponse,
    PlayerActionNotifyRpc, RoomStatusNotifyRpc,
};
use wordcard_protocol::wire::{
    GameAction, GameEndNotification, GameStartNotification, GameState, RoomDetail,
};
use wordcard_protocol::ErrorCode;
use wordcard_store::{IdentityStore, ServiceInstance, ServiceRegistry};

/// Service name gateways register under.
pub const GATEWAY_SERVICE: &str = "gateway-server";

const NOTIFY_TIMEOUT: Duration = Duration::from_secs(3);

/// Push interface the room actor fans out through. Implemented over HTTP in
/// production and by a recorder in tests. The returned futures must be
/// `Send` because actors run on the multi-threaded runtime.
pub trait Notify: Send + Sync + 'static {
    fn room_status(&self, uid: u64, room: RoomDetail) -> impl Future<Output = ()> + Send;
    fn game_state(
        &self,
        uid: u64,
        room_id: &str,
        state: GameState,
    ) -> impl Future<Output = ()> + Send;
    fn player_action(
        &self,
        uid: u64,
        room_id: &str,
        action: GameAction,
    ) -> impl Future<Output = ()> + Send;
    fn game_start(&self, uid: u64, start: GameStartNotification)
        -> impl Future<Output = ()> + Send;
    fn game_end(&self, uid: u64, end: GameEndNotification) -> impl Future<Output = ()> + Send;
}

#[derive(Clone)]
pub struct GatewayNotifier {
    http: reqwest::Client,
    identity: IdentityStore,
    gateways: Arc<RwLock<Vec<ServiceInstance>>>,
    fallback_addr: Option<String>,
}

impl GatewayNotifier {
    pub fn new(identity: IdentityStore, fallback_addr: Option<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(NOTIFY_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            http,
            identity,
            gateways: Arc::new(RwLock::new(Vec::new())),
            fallback_addr,
        }
    }

    /// Keep the gateway instance list fresh from the registry. The task ends
    /// with the registry watch.
    pub fn spawn_gateway_watch(&self, registry: &ServiceRegistry) {
        let mut rx = registry.watch(GATEWAY_SERVICE);
        let gateways = Arc::clone(&self.gateways);
        tokio::spawn(async move {
            while let Some(instances) = rx.recv().await {
                tracing::debug!(count = instances.len(), "gateway instances updated");
                *gateways.write().await = instances;
            }
        });
    }

    async fn resolve(&self, uid: u64) -> Option<String> {
        if let Ok(Some(addr)) = self.identity.user_gateway(uid).await {
            return Some(addr);
        }
        if let Some(instance) = self.gateways.read().await.first() {
            return Some(instance.address.clone());
        }
        self.fallback_addr.clone()
    }

    async fn post<T: Serialize>(&self, uid: u64, path: &str, body: &T) {
        let Some(addr) = self.resolve(uid).await else {
            tracing::warn!(uid, path, "no gateway known for notification");
            return;
        };
        let url = format!("http://{addr}/notify/{path}");
        match self.http.post(&url).json(body).send().await {
            Ok(resp) => match resp.json::<NotifyRpcResponse>().await {
                Ok(ack) if ack.ret == ErrorCode::Ok => {}
                Ok(ack) => {
                    // Receiver already gone; best-effort drop.
                    tracing::debug!(uid, path, ret = ?ack.ret, "notification not delivered");
                }
                Err(err) => tracing::warn!(uid, path, error = %err, "bad notify ack"),
            },
            Err(err) => tracing::warn!(uid, path, error = %err, "notification send failed"),
        }
    }
}

impl Notify for GatewayNotifier {
    async fn room_status(&self, uid: u64, room: RoomDetail) {
        self.post(
            uid,
            "room_status",
            &RoomStatusNotifyRpc {
                be_notified_uid: uid,
                room,
            },
        )
        .await;
    }

    async fn game_state(&self, uid: u64, room_id: &str, state: GameState) {
        self.post(
            uid,
            "game_state",
            &GameStateNotifyRpc {
                be_notified_uid: uid,
                room_id: room_id.to_string(),
                state,
            },
        )
        .await;
    }

    async fn player_action(&self, uid: u64, room_id: &str, action: GameAction) {
        self.post(
            uid,
            "player_action",
            &PlayerActionNotifyRpc {
                be_notified_uid: uid,
                room_id: room_id.to_string(),
                action,
            },
        )
        .await;
    }

    async fn game_start(&self, uid: u64, start: GameStartNotification) {
        self.post(
            uid,
            "game_start",
            &GameStartNotifyRpc {
                be_notified_uid: uid,
                start,
            },
        )
        .await;
    }

    async fn game_end(&self, uid: u64, end: GameEndNotification) {
        self.post(
            uid,
            "game_end",
            &GameEndNotifyRpc {
                be_notified_uid: uid,
                end,
            },
        )
        .await;
    }
}
