//! RPC clients for the room and match services.
//!
//! Addresses come from the service registry; the configured fallback covers
//! single-box deployments with no registry traffic yet. Every call carries
//! its own timeout and surfaces transport failures to the handler, which
//! maps them to `SERVER_ERROR` for the client.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::RwLock;

use wordcard_protocol::rpc::{
    CancelMatchRpcRequest, CancelMatchRpcResponse, CreateRoomRpcRequest, CreateRoomRpcResponse,
    GetReadyRpcRequest, GetReadyRpcResponse, GetRoomListRpcResponse, JoinRoomRpcRequest,
    JoinRoomRpcResponse, LeaveRoomRpcRequest, LeaveRoomRpcResponse, PlayerActionRpcRequest,
    PlayerActionRpcResponse, PlayerInitData, StartMatchRpcRequest, StartMatchRpcResponse,
};
use wordcard_protocol::wire::GameAction;
use wordcard_store::ServiceRegistry;

pub const ROOM_SERVICE: &str = "room-server";
pub const MATCH_SERVICE: &str = "match-server";

const RPC_TIMEOUT: Duration = Duration::from_secs(3);

/// Discovery-backed HTTP client for one peer service.
#[derive(Clone)]
pub struct ServiceClient {
    http: reqwest::Client,
    instances: Arc<RwLock<Vec<String>>>,
    fallback: String,
}

impl ServiceClient {
    pub fn new(fallback: String) -> Self {
        let http = reqwest::Client::builder()
            .timeout(RPC_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            http,
            instances: Arc::new(RwLock::new(Vec::new())),
            fallback,
        }
    }

    /// Track the service's instance addresses from the registry.
    pub fn spawn_watch(&self, registry: &ServiceRegistry, service_name: &str) {
        let mut rx = registry.watch(service_name);
        let instances = Arc::clone(&self.instances);
        let service = service_name.to_string();
        tokio::spawn(async move {
            while let Some(list) = rx.recv().await {
                tracing::debug!(service = %service, count = list.len(), "peer instances updated");
                *instances.write().await = list.into_iter().map(|i| i.address).collect();
            }
        });
    }

    async fn addr(&self) -> String {
        self.instances
            .read()
            .await
            .first()
            .cloned()
            .unwrap_or_else(|| self.fallback.clone())
    }

    async fn post<Req: Serialize, Resp: DeserializeOwned>(
        &self,
        path: &str,
        request: &Req,
    ) -> Result<Resp, reqwest::Error> {
        let url = format!("http://{}{}", self.addr().await, path);
        self.http.post(&url).json(request).send().await?.json().await
    }

    async fn get<Resp: DeserializeOwned>(&self, path: &str) -> Result<Resp, reqwest::Error> {
        let url = format!("http://{}{}", self.addr().await, path);
        self.http.get(&url).send().await?.json().await
    }
}

#[derive(Clone)]
pub struct RoomClient {
    inner: ServiceClient,
}

impl RoomClient {
    pub fn new(fallback: String) -> Self {
        Self {
            inner: ServiceClient::new(fallback),
        }
    }

    pub fn spawn_watch(&self, registry: &ServiceRegistry) {
        self.inner.spawn_watch(registry, ROOM_SERVICE);
    }

    pub async fn create_room(
        &self,
        player: PlayerInitData,
    ) -> Result<CreateRoomRpcResponse, reqwest::Error> {
        self.inner
            .post("/rpc/create_room", &CreateRoomRpcRequest { player })
            .await
    }

    pub async fn join_room(
        &self,
        room_id: String,
        player: PlayerInitData,
    ) -> Result<JoinRoomRpcResponse, reqwest::Error> {
        self.inner
            .post("/rpc/join_room", &JoinRoomRpcRequest { room_id, player })
            .await
    }

    pub async fn leave_room(&self, player_id: u64) -> Result<LeaveRoomRpcResponse, reqwest::Error> {
        self.inner
            .post("/rpc/leave_room", &LeaveRoomRpcRequest { player_id })
            .await
    }

    pub async fn get_ready(
        &self,
        player_id: u64,
        is_ready: bool,
    ) -> Result<GetReadyRpcResponse, reqwest::Error> {
        self.inner
            .post(
                "/rpc/get_ready",
                &GetReadyRpcRequest {
                    player_id,
                    is_ready,
                },
            )
            .await
    }

    pub async fn player_action(
        &self,
        player_id: u64,
        action: GameAction,
    ) -> Result<PlayerActionRpcResponse, reqwest::Error> {
        self.inner
            .post(
                "/rpc/player_action",
                &PlayerActionRpcRequest { player_id, action },
            )
            .await
    }

    pub async fn room_list(&self) -> Result<GetRoomListRpcResponse, reqwest::Error> {
        self.inner.get("/rpc/room_list").await
    }
}

#[derive(Clone)]
pub struct MatchClient {
    inner: ServiceClient,
}

impl MatchClient {
    pub fn new(fallback: String) -> Self {
        Self {
            inner: ServiceClient::new(fallback),
        }
    }

    pub fn spawn_watch(&self, registry: &ServiceRegistry) {
        self.inner.spawn_watch(registry, MATCH_SERVICE);
    }

    pub async fn start_match(
        &self,
        player: PlayerInitData,
    ) -> Result<StartMatchRpcResponse, reqwest::Error> {
        self.inner
            .post("/rpc/start_match", &StartMatchRpcRequest { player })
            .await
    }

    pub async fn cancel_match(
        &self,
        player_id: u64,
    ) -> Result<CancelMatchRpcResponse, reqwest::Error> {
        self.inner
            .post("/rpc/cancel_match", &CancelMatchRpcRequest { player_id })
            .await
    }
}
