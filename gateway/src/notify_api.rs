//! Notification endpoints consumed by the room and match services.
//!
//! Each endpoint resolves the target session by uid, prost-encodes the
//! client-facing payload, and enqueues it as a notification envelope on the
//! session's outbox. A missing session answers `NotFound`; the caller
//! treats that as a best-effort drop.

use std::sync::Arc;

use actix_web::{web, HttpResponse};
use prost::Message;

use wordcard_protocol::rpc::{
    GameEndNotifyRpc, GameStartNotifyRpc, GameStateNotifyRpc, MatchResultNotifyRpc,
    NotifyRpcResponse, PlayerActionNotifyRpc, RoomStatusNotifyRpc,
};
use wordcard_protocol::wire::{GameStateNotify, PlayerActionNotify};
use wordcard_protocol::{Envelope, ErrorCode, MsgId};

use crate::manager::SessionManager;

pub struct NotifyState {
    pub manager: Arc<SessionManager>,
}

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/notify/room_status", web::post().to(room_status))
        .route("/notify/game_state", web::post().to(game_state))
        .route("/notify/player_action", web::post().to(player_action))
        .route("/notify/game_start", web::post().to(game_start))
        .route("/notify/game_end", web::post().to(game_end))
        .route("/notify/match_result", web::post().to(match_result));
}

/// Push a prost payload at a user's socket, if they are connected here.
fn push(state: &NotifyState, uid: u64, id: MsgId, data: Vec<u8>) -> HttpResponse {
    let Some(sender) = state.manager.by_uid(uid) else {
        tracing::debug!(uid, id = ?id, "notification target not connected");
        return HttpResponse::Ok().json(NotifyRpcResponse {
            ret: ErrorCode::NotFound,
        });
    };
    sender.enqueue(Envelope::notification(id, data));
    HttpResponse::Ok().json(NotifyRpcResponse { ret: ErrorCode::Ok })
}

async fn room_status(
    state: web::Data<NotifyState>,
    body: web::Json<RoomStatusNotifyRpc>,
) -> HttpResponse {
    let req = body.into_inner();
    push(
        &state,
        req.be_notified_uid,
        MsgId::RoomStateNotification,
        req.room.encode_to_vec(),
    )
}

async fn game_state(
    state: web::Data<NotifyState>,
    body: web::Json<GameStateNotifyRpc>,
) -> HttpResponse {
    let req = body.into_inner();
    let payload = GameStateNotify {
        room_id: req.room_id,
        state: Some(req.state),
    };
    push(
        &state,
        req.be_notified_uid,
        MsgId::GameStateNotification,
        payload.encode_to_vec(),
    )
}

async fn player_action(
    state: web::Data<NotifyState>,
    body: web::Json<PlayerActionNotifyRpc>,
) -> HttpResponse {
    let req = body.into_inner();
    let payload = PlayerActionNotify {
        room_id: req.room_id,
        player_id: req.action.player_id,
        action: Some(req.action),
    };
    push(
        &state,
        req.be_notified_uid,
        MsgId::GameActionNotification,
        payload.encode_to_vec(),
    )
}

async fn game_start(
    state: web::Data<NotifyState>,
    body: web::Json<GameStartNotifyRpc>,
) -> HttpResponse {
    let req = body.into_inner();
    push(
        &state,
        req.be_notified_uid,
        MsgId::GameStartNotification,
        req.start.encode_to_vec(),
    )
}

async fn game_end(
    state: web::Data<NotifyState>,
    body: web::Json<GameEndNotifyRpc>,
) -> HttpResponse {
    let req = body.into_inner();
    push(
        &state,
        req.be_notified_uid,
        MsgId::GameEndNotification,
        req.end.encode_to_vec(),
    )
}

async fn match_result(
    state: web::Data<NotifyState>,
    body: web::Json<MatchResultNotifyRpc>,
) -> HttpResponse {
    let req = body.into_inner();
    push(
        &state,
        req.be_notified_uid,
        MsgId::MatchResultNotification,
        req.result.encode_to_vec(),
    )
}
