//! Match service: RPC surface, pairing sweeper and result notification.
//!
//! A single background task wakes every sweep period and runs two passes
//! over the queue: timeout evictions, then pairing. The queue lock covers
//! only the in-memory mutation; room creation and notifications happen
//! outside it.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use actix_web::{web, HttpResponse};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};

use wordcard_protocol::rpc::{
    CancelMatchRpcRequest, CancelMatchRpcResponse, CreateRoomRpcResponse,
    MatchCreateRoomRpcRequest, MatchResultNotifyRpc, NotifyRpcResponse, PlayerInitData,
    StartMatchRpcRequest, StartMatchRpcResponse,
};
use wordcard_protocol::wire::MatchResultNotify;
use wordcard_protocol::ErrorCode;
use wordcard_store::{IdentityStore, ServiceInstance, ServiceRegistry, Store};

use crate::queue::{MatchEntry, MatchQueue, MATCH_GROUP_SIZE};

/// Name this service registers under.
pub const SERVICE_NAME: &str = "match-server";

const ROOM_SERVICE: &str = "room-server";
const GATEWAY_SERVICE: &str = "gateway-server";

/// Queue check cadence.
pub const SWEEP_INTERVAL: Duration = Duration::from_millis(200);
/// Queue snapshot cadence and retention.
const SNAPSHOT_INTERVAL: Duration = Duration::from_secs(30);
const SNAPSHOT_TTL: Duration = Duration::from_secs(900);
const SNAPSHOT_KEY: &str = "match:server:state";

const NOTIFY_TIMEOUT: Duration = Duration::from_secs(3);
const CREATE_ROOM_TIMEOUT: Duration = Duration::from_secs(5);

pub struct MatchService {
    queue: Mutex<MatchQueue>,
    http: reqwest::Client,
    store: Store,
    identity: IdentityStore,
    room_instances: Arc<RwLock<Vec<ServiceInstance>>>,
    gateway_instances: Arc<RwLock<Vec<ServiceInstance>>>,
    room_fallback: Option<String>,
    gateway_fallback: Option<String>,
    match_timeout_secs: i64,
}

impl MatchService {
    pub fn new(
        store: Store,
        room_fallback: Option<String>,
        gateway_fallback: Option<String>,
        match_timeout_secs: i64,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(CREATE_ROOM_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            queue: Mutex::new(MatchQueue::default()),
            http,
            identity: IdentityStore::new(store.clone()),
            store,
            room_instances: Arc::new(RwLock::new(Vec::new())),
            gateway_instances: Arc::new(RwLock::new(Vec::new())),
            room_fallback,
            gateway_fallback,
            match_timeout_secs,
        }
    }

    /// Keep the room and gateway instance lists fresh from the registry.
    pub fn spawn_watches(&self, registry: &ServiceRegistry) {
        for (service, cache) in [
            (ROOM_SERVICE, Arc::clone(&self.room_instances)),
            (GATEWAY_SERVICE, Arc::clone(&self.gateway_instances)),
        ] {
            let mut rx = registry.watch(service);
            tokio::spawn(async move {
                while let Some(instances) = rx.recv().await {
                    *cache.write().await = instances;
                }
            });
        }
    }

    /// The background matcher. Runs until the service is dropped.
    pub fn spawn_sweeper(self: Arc<Self>) {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(SWEEP_INTERVAL);
            loop {
                interval.tick().await;
                self.sweep().await;
            }
        });
    }

    /// Persist the queue periodically so a restart can pick it back up.
    pub fn spawn_snapshot_saver(self: Arc<Self>) {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(SNAPSHOT_INTERVAL);
            interval.tick().await;
            loop {
                interval.tick().await;
                self.save_snapshot().await;
            }
        });
    }

    pub async fn start_match(&self, player: PlayerInitData) -> ErrorCode {
        let player_id = player.player_id;
        let fresh = self.queue.lock().await.enqueue(player, unix_now());
        if fresh {
            tracing::info!(player_id, "player queued for match");
        } else {
            tracing::debug!(player_id, "player already queued");
        }
        ErrorCode::Ok
    }

    pub async fn cancel_match(&self, player_id: u64) -> ErrorCode {
        let removed = self.queue.lock().await.cancel(player_id);
        if removed {
            tracing::info!(player_id, "player left match queue");
        }
        ErrorCode::Ok
    }

    /// Two passes: evict timed-out entries, then pair whoever is left.
    /// Notifications go out after the lock is released.
    async fn sweep(&self) {
        let now = unix_now();
        let (timed_out, groups) = {
            let mut queue = self.queue.lock().await;
            let timed_out = queue.evict_timed_out(now, self.match_timeout_secs);
            let groups = queue.take_groups(MATCH_GROUP_SIZE);
            (timed_out, groups)
        };

        for entry in timed_out {
            tracing::info!(player_id = entry.player.player_id, "match timed out");
            self.notify_result(
                entry.player.player_id,
                MatchResultNotify {
                    ret: ErrorCode::Timeout as i32,
                    room: None,
                },
            )
            .await;
        }

        for group in groups {
            self.create_match_room(group).await;
        }
    }

    async fn create_match_room(&self, group: Vec<MatchEntry>) {
        let ids: Vec<u64> = group.iter().map(|e| e.player.player_id).collect();
        tracing::info!(players = ?ids, "pair found, creating room");

        let Some(addr) = self.resolve_room_addr().await else {
            tracing::error!("no room service available");
            self.fail_group(&group).await;
            return;
        };

        let request = MatchCreateRoomRpcRequest {
            players: group.iter().map(|e| e.player.clone()).collect(),
        };
        let url = format!("http://{addr}/rpc/match_create_room");
        let response = match self.http.post(&url).json(&request).send().await {
            Ok(resp) => resp.json::<CreateRoomRpcResponse>().await,
            Err(err) => {
                tracing::error!(error = %err, "create room RPC failed");
                self.fail_group(&group).await;
                return;
            }
        };

        match response {
            Ok(resp) if resp.ret == ErrorCode::Ok && resp.room.is_some() => {
                let room = resp.room.unwrap_or_default();
                let room_id = room
                    .room
                    .as_ref()
                    .map(|r| r.id.clone())
                    .unwrap_or_default();
                tracing::info!(room_id = %room_id, players = ?ids, "match room created");
                for entry in &group {
                    self.notify_result(
                        entry.player.player_id,
                        MatchResultNotify {
                            ret: ErrorCode::Ok as i32,
                            room: Some(room.clone()),
                        },
                    )
                    .await;
                }
            }
            Ok(resp) => {
                tracing::error!(ret = ?resp.ret, "create room rejected");
                self.fail_group(&group).await;
            }
            Err(err) => {
                tracing::error!(error = %err, "bad create room response");
                self.fail_group(&group).await;
            }
        }
    }

    /// Room creation failed: tell everyone, do not re-enqueue.
    async fn fail_group(&self, group: &[MatchEntry]) {
        for entry in group {
            self.notify_result(
                entry.player.player_id,
                MatchResultNotify {
                    ret: ErrorCode::ServerError as i32,
                    room: None,
                },
            )
            .await;
        }
    }

    async fn notify_result(&self, uid: u64, result: MatchResultNotify) {
        let Some(addr) = self.resolve_gateway_addr(uid).await else {
            tracing::warn!(uid, "no gateway known for match result");
            return;
        };
        let body = MatchResultNotifyRpc {
            be_notified_uid: uid,
            result,
        };
        self.post_notify(&addr, "match_result", &body, uid).await;
    }

    async fn post_notify<T: Serialize>(&self, addr: &str, path: &str, body: &T, uid: u64) {
        let url = format!("http://{addr}/notify/{path}");
        let send = self
            .http
            .post(&url)
            .timeout(NOTIFY_TIMEOUT)
            .json(body)
            .send()
            .await;
        match send {
            Ok(resp) => match resp.json::<NotifyRpcResponse>().await {
                Ok(ack) if ack.ret == ErrorCode::Ok => {}
                Ok(ack) => tracing::debug!(uid, ret = ?ack.ret, "match result not delivered"),
                Err(err) => tracing::warn!(uid, error = %err, "bad notify ack"),
            },
            Err(err) => tracing::warn!(uid, error = %err, "match result send failed"),
        }
    }

    async fn resolve_room_addr(&self) -> Option<String> {
        if let Some(instance) = self.room_instances.read().await.first() {
            return Some(instance.address.clone());
        }
        self.room_fallback.clone()
    }

    async fn resolve_gateway_addr(&self, uid: u64) -> Option<String> {
        if let Ok(Some(addr)) = self.identity.user_gateway(uid).await {
            return Some(addr);
        }
        if let Some(instance) = self.gateway_instances.read().await.first() {
            return Some(instance.address.clone());
        }
        self.gateway_fallback.clone()
    }

    async fn save_snapshot(&self) {
        let snapshot = {
            let queue = self.queue.lock().await;
            if queue.is_empty() {
                None
            } else {
                serde_json::to_string(&*queue).ok()
            }
        };
        let Some(raw) = snapshot else { return };
        if let Err(err) = self
            .store
            .set_string_ex(SNAPSHOT_KEY, &raw, SNAPSHOT_TTL)
            .await
        {
            tracing::warn!(error = %err, "queue snapshot save failed");
        }
    }

    /// Restore a queue snapshot left by a previous run.
    pub async fn restore_snapshot(&self) {
        match self.store.get_json::<MatchQueue>(SNAPSHOT_KEY).await {
            Ok(Some(restored)) => {
                let count = restored.len();
                *self.queue.lock().await = restored;
                tracing::info!(count, "match queue restored from snapshot");
            }
            Ok(None) => {}
            Err(err) => tracing::warn!(error = %err, "queue snapshot restore failed"),
        }
    }
}

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/rpc/start_match", web::post().to(start_match))
        .route("/rpc/cancel_match", web::post().to(cancel_match));
}

async fn start_match(
    state: web::Data<MatchService>,
    body: web::Json<StartMatchRpcRequest>,
) -> HttpResponse {
    let ret = state.start_match(body.into_inner().player).await;
    HttpResponse::Ok().json(StartMatchRpcResponse { ret })
}

async fn cancel_match(
    state: web::Data<MatchService>,
    body: web::Json<CancelMatchRpcRequest>,
) -> HttpResponse {
    let ret = state.cancel_match(body.into_inner().player_id).await;
    HttpResponse::Ok().json(CancelMatchRpcResponse { ret })
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
