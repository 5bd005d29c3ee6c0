//! Room service RPC surface.
//!
//! JSON-over-HTTP handlers consumed by the gateway and the match service.
//! The handlers only route: every room mutation goes through the owning
//! actor's command queue. The player→room index enforces the one-room-per-
//! player invariant across the whole service.

use std::sync::Arc;

use actix_web::{web, HttpResponse};
use dashmap::mapref::entry::Entry;

use wordcard_protocol::rpc::{
    CreateRoomRpcRequest, CreateRoomRpcResponse, GetReadyRpcRequest, GetReadyRpcResponse,
    GetRoomListRpcResponse, JoinRoomRpcRequest, JoinRoomRpcResponse, LeaveRoomRpcRequest,
    LeaveRoomRpcResponse, MatchCreateRoomRpcRequest, PlayerActionRpcRequest,
    PlayerActionRpcResponse,
};
use wordcard_protocol::{ActionType, ErrorCode};
use wordcard_store::IdentityStore;

use crate::game::{GameRules, GameType};
use crate::notify::GatewayNotifier;
use crate::room::{RoomActor, RoomHandle, RoomIndex};

/// Name this service registers under.
pub const SERVICE_NAME: &str = "room-server";

pub struct RoomService {
    pub index: Arc<RoomIndex>,
    pub rules: Arc<GameRules>,
    pub notifier: GatewayNotifier,
    pub identity: IdentityStore,
}

impl RoomService {
    /// Allocate a room id and spawn its actor.
    async fn new_room(&self) -> Result<RoomHandle, ErrorCode> {
        let battle_id = self.identity.next_battle_id().await.map_err(|err| {
            tracing::error!(error = %err, "battle id allocation failed");
            ErrorCode::ServerError
        })?;
        let room_id = battle_id.to_string();

        let handle = RoomActor::spawn(
            room_id.clone(),
            GameType::WordCard,
            Arc::clone(&self.rules),
            self.notifier.clone(),
            Arc::clone(&self.index),
        );
        self.index.rooms.insert(room_id.clone(), handle.clone());
        tracing::info!(room_id = %room_id, "room created");
        Ok(handle)
    }

    /// Map a player to a room unless they are already in one.
    fn try_seat(&self, player_id: u64, room_id: &str) -> bool {
        match self.index.player_in_room.entry(player_id) {
            Entry::Occupied(entry) => {
                tracing::warn!(player_id, room_id = %entry.get(), "player already in a room");
                false
            }
            Entry::Vacant(entry) => {
                entry.insert(room_id.to_string());
                true
            }
        }
    }

    fn unseat(&self, player_id: u64, room_id: &str) {
        self.index
            .player_in_room
            .remove_if(&player_id, |_, room| room == room_id);
    }

    fn room(&self, room_id: &str) -> Option<RoomHandle> {
        self.index.rooms.get(room_id).map(|r| r.value().clone())
    }
}

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/rpc/create_room", web::post().to(create_room))
        .route("/rpc/match_create_room", web::post().to(match_create_room))
        .route("/rpc/join_room", web::post().to(join_room))
        .route("/rpc/leave_room", web::post().to(leave_room))
        .route("/rpc/get_ready", web::post().to(get_ready))
        .route("/rpc/player_action", web::post().to(player_action))
        .route("/rpc/room_list", web::get().to(room_list));
}

async fn create_room(
    state: web::Data<RoomService>,
    body: web::Json<CreateRoomRpcRequest>,
) -> HttpResponse {
    let player = body.into_inner().player;

    if state.index.player_in_room.contains_key(&player.player_id) {
        return HttpResponse::Ok().json(CreateRoomRpcResponse {
            ret: ErrorCode::PlayerAlreadyInRoom,
            room: None,
        });
    }

    let handle = match state.new_room().await {
        Ok(handle) => handle,
        Err(ret) => return HttpResponse::Ok().json(CreateRoomRpcResponse { ret, room: None }),
    };

    if !state.try_seat(player.player_id, &handle.room_id) {
        // Lost the race against another create/join for the same player.
        handle.stop().await;
        return HttpResponse::Ok().json(CreateRoomRpcResponse {
            ret: ErrorCode::PlayerAlreadyInRoom,
            room: None,
        });
    }

    match handle.add_player(player.player_id, player.player_name).await {
        Some(detail) => HttpResponse::Ok().json(CreateRoomRpcResponse {
            ret: ErrorCode::Ok,
            room: Some(detail),
        }),
        None => {
            state.unseat(player.player_id, &handle.room_id);
            HttpResponse::Ok().json(CreateRoomRpcResponse {
                ret: ErrorCode::ServerError,
                room: None,
            })
        }
    }
}

/// Room creation on behalf of the match service: seats the whole pairing.
async fn match_create_room(
    state: web::Data<RoomService>,
    body: web::Json<MatchCreateRoomRpcRequest>,
) -> HttpResponse {
    let players = body.into_inner().players;
    if players.is_empty() {
        return HttpResponse::Ok().json(CreateRoomRpcResponse {
            ret: ErrorCode::InvalidParam,
            room: None,
        });
    }

    let handle = match state.new_room().await {
        Ok(handle) => handle,
        Err(ret) => return HttpResponse::Ok().json(CreateRoomRpcResponse { ret, room: None }),
    };

    let mut seated = Vec::new();
    for player in &players {
        if state.try_seat(player.player_id, &handle.room_id) {
            seated.push(player.player_id);
        } else {
            for uid in seated {
                state.unseat(uid, &handle.room_id);
            }
            handle.stop().await;
            return HttpResponse::Ok().json(CreateRoomRpcResponse {
                ret: ErrorCode::PlayerAlreadyInRoom,
                room: None,
            });
        }
    }

    let mut detail = None;
    for player in players {
        detail = handle
            .add_player(player.player_id, player.player_name)
            .await;
    }

    match detail {
        Some(detail) => HttpResponse::Ok().json(CreateRoomRpcResponse {
            ret: ErrorCode::Ok,
            room: Some(detail),
        }),
        None => HttpResponse::Ok().json(CreateRoomRpcResponse {
            ret: ErrorCode::ServerError,
            room: None,
        }),
    }
}

async fn join_room(
    state: web::Data<RoomService>,
    body: web::Json<JoinRoomRpcRequest>,
) -> HttpResponse {
    let req = body.into_inner();

    let Some(handle) = state.room(&req.room_id) else {
        return HttpResponse::Ok().json(JoinRoomRpcResponse {
            ret: ErrorCode::InvalidRoom,
            room: None,
        });
    };

    if !state.try_seat(req.player.player_id, &req.room_id) {
        return HttpResponse::Ok().json(JoinRoomRpcResponse {
            ret: ErrorCode::PlayerAlreadyInRoom,
            room: None,
        });
    }

    match handle
        .add_player(req.player.player_id, req.player.player_name)
        .await
    {
        Some(detail) => HttpResponse::Ok().json(JoinRoomRpcResponse {
            ret: ErrorCode::Ok,
            room: Some(detail),
        }),
        None => {
            state.unseat(req.player.player_id, &req.room_id);
            HttpResponse::Ok().json(JoinRoomRpcResponse {
                ret: ErrorCode::InvalidRoom,
                room: None,
            })
        }
    }
}

async fn leave_room(
    state: web::Data<RoomService>,
    body: web::Json<LeaveRoomRpcRequest>,
) -> HttpResponse {
    let req = body.into_inner();

    let Some((_, room_id)) = state.index.player_in_room.remove(&req.player_id) else {
        return HttpResponse::Ok().json(LeaveRoomRpcResponse {
            ret: ErrorCode::InvalidRoom,
            room_id: String::new(),
        });
    };

    if let Some(handle) = state.room(&room_id) {
        handle.remove_player(req.player_id).await;
    }
    tracing::info!(player_id = req.player_id, room_id = %room_id, "player left room");

    HttpResponse::Ok().json(LeaveRoomRpcResponse {
        ret: ErrorCode::Ok,
        room_id,
    })
}

async fn get_ready(
    state: web::Data<RoomService>,
    body: web::Json<GetReadyRpcRequest>,
) -> HttpResponse {
    let req = body.into_inner();

    let Some(room_id) = state
        .index
        .player_in_room
        .get(&req.player_id)
        .map(|r| r.value().clone())
    else {
        return HttpResponse::Ok().json(GetReadyRpcResponse {
            ret: ErrorCode::InvalidRoom,
            room_id: String::new(),
        });
    };
    let Some(handle) = state.room(&room_id) else {
        return HttpResponse::Ok().json(GetReadyRpcResponse {
            ret: ErrorCode::InvalidRoom,
            room_id: String::new(),
        });
    };

    let ret = handle
        .set_ready(req.player_id, req.is_ready)
        .await
        .unwrap_or(ErrorCode::InvalidRoom);
    HttpResponse::Ok().json(GetReadyRpcResponse { ret, room_id })
}

async fn player_action(
    state: web::Data<RoomService>,
    body: web::Json<PlayerActionRpcRequest>,
) -> HttpResponse {
    let req = body.into_inner();

    // Membership decides the target room, same as ready and leave.
    let Some(room_id) = state
        .index
        .player_in_room
        .get(&req.player_id)
        .map(|r| r.value().clone())
    else {
        return HttpResponse::Ok().json(PlayerActionRpcResponse {
            ret: ErrorCode::InvalidRoom,
        });
    };
    let Some(handle) = state.room(&room_id) else {
        return HttpResponse::Ok().json(PlayerActionRpcResponse {
            ret: ErrorCode::InvalidRoom,
        });
    };

    // Movement is latency-sensitive and always succeeds; fire and forget.
    // Game actions wait for the actor's verdict so rejections reach the
    // offender.
    let ret = if req.action.action_type == ActionType::CharMove as i32 {
        if handle.enqueue_action(req.player_id, req.action).await {
            ErrorCode::Ok
        } else {
            ErrorCode::InvalidRoom
        }
    } else {
        handle
            .action_with_result(req.player_id, req.action)
            .await
            .unwrap_or(ErrorCode::InvalidRoom)
    };
    HttpResponse::Ok().json(PlayerActionRpcResponse { ret })
}

async fn room_list(state: web::Data<RoomService>) -> HttpResponse {
    let handles: Vec<RoomHandle> = state
        .index
        .rooms
        .iter()
        .map(|entry| entry.value().clone())
        .collect();

    let mut rooms = Vec::with_capacity(handles.len());
    for handle in handles {
        if let Some(detail) = handle.detail().await {
            if let Some(room) = detail.room {
                rooms.push(room);
            }
        }
    }

    HttpResponse::Ok().json(GetRoomListRpcResponse {
        ret: ErrorCode::Ok,
        rooms,
    })
}
