//! Room request handlers: thin adapters over the room service RPC.
//!
//! Each handler decodes the client payload, forwards to the room service
//! with the session's identity, mirrors the result back to the client, and
//! keeps `current_room_id` in sync on success.

use futures_util::future::BoxFuture;
use prost::Message;

use wordcard_protocol::rpc::PlayerInitData;
use wordcard_protocol::wire::{
    CreateRoomRequest, CreateRoomResponse, GameActionRequest, GameActionResponse,
    GetReadyRequest, GetReadyResponse, GetRoomListResponse, JoinRoomRequest, JoinRoomResponse,
    LeaveRoomResponse, RoomDetail,
};
use wordcard_protocol::{Envelope, ErrorCode};

use crate::session::PlayerSession;

fn init_data(session: &PlayerSession) -> PlayerInitData {
    PlayerInitData {
        player_id: session.uid,
        player_name: session.name.clone(),
    }
}

fn detail_room_id(detail: &Option<RoomDetail>) -> Option<String> {
    detail
        .as_ref()
        .and_then(|d| d.room.as_ref())
        .map(|r| r.id.clone())
}

pub fn handle_create_room(session: &mut PlayerSession, envelope: Envelope) -> BoxFuture<'_, ()> {
    Box::pin(async move {
        let Ok(req) = CreateRoomRequest::decode(envelope.data.as_slice()) else {
            tracing::error!(uid = session.uid, "malformed create room request");
            return;
        };
        tracing::info!(uid = session.uid, name = %req.name, "create room");

        let response = match session.shared.room_client.create_room(init_data(session)).await {
            Ok(resp) => {
                if resp.ret == ErrorCode::Ok {
                    if let Some(room_id) = detail_room_id(&resp.room) {
                        session.current_room_id = room_id;
                        tracing::info!(uid = session.uid, room_id = %session.current_room_id, "room created");
                    }
                }
                CreateRoomResponse {
                    ret: resp.ret as i32,
                    room: resp.room,
                }
            }
            Err(err) => {
                tracing::error!(uid = session.uid, error = %err, "create room RPC failed");
                CreateRoomResponse {
                    ret: ErrorCode::ServerError as i32,
                    room: None,
                }
            }
        };
        session.respond(&envelope, response.encode_to_vec());
    })
}

pub fn handle_join_room(session: &mut PlayerSession, envelope: Envelope) -> BoxFuture<'_, ()> {
    Box::pin(async move {
        let Ok(req) = JoinRoomRequest::decode(envelope.data.as_slice()) else {
            tracing::error!(uid = session.uid, "malformed join room request");
            return;
        };

        let response = match session
            .shared
            .room_client
            .join_room(req.room_id.clone(), init_data(session))
            .await
        {
            Ok(resp) => {
                if resp.ret == ErrorCode::Ok {
                    if let Some(room_id) = detail_room_id(&resp.room) {
                        session.current_room_id = room_id;
                        tracing::info!(uid = session.uid, room_id = %session.current_room_id, "joined room");
                    }
                }
                JoinRoomResponse {
                    ret: resp.ret as i32,
                    room: resp.room,
                }
            }
            Err(err) => {
                tracing::error!(uid = session.uid, error = %err, "join room RPC failed");
                JoinRoomResponse {
                    ret: ErrorCode::ServerError as i32,
                    room: None,
                }
            }
        };
        session.respond(&envelope, response.encode_to_vec());
    })
}

pub fn handle_leave_room(session: &mut PlayerSession, envelope: Envelope) -> BoxFuture<'_, ()> {
    Box::pin(async move {
        let response = match session.shared.room_client.leave_room(session.uid).await {
            Ok(resp) => {
                if resp.ret == ErrorCode::Ok {
                    session.current_room_id.clear();
                }
                LeaveRoomResponse {
                    ret: resp.ret as i32,
                    room_id: resp.room_id,
                }
            }
            Err(err) => {
                tracing::error!(uid = session.uid, error = %err, "leave room RPC failed");
                LeaveRoomResponse {
                    ret: ErrorCode::ServerError as i32,
                    room_id: String::new(),
                }
            }
        };
        session.respond(&envelope, response.encode_to_vec());
    })
}

pub fn handle_room_list(session: &mut PlayerSession, envelope: Envelope) -> BoxFuture<'_, ()> {
    Box::pin(async move {
        let response = match session.shared.room_client.room_list().await {
            Ok(resp) => GetRoomListResponse {
                ret: resp.ret as i32,
                rooms: resp.rooms,
            },
            Err(err) => {
                tracing::error!(uid = session.uid, error = %err, "room list RPC failed");
                GetRoomListResponse {
                    ret: ErrorCode::ServerError as i32,
                    rooms: Vec::new(),
                }
            }
        };
        session.respond(&envelope, response.encode_to_vec());
    })
}

pub fn handle_get_ready(session: &mut PlayerSession, envelope: Envelope) -> BoxFuture<'_, ()> {
    Box::pin(async move {
        let Ok(req) = GetReadyRequest::decode(envelope.data.as_slice()) else {
            tracing::error!(uid = session.uid, "malformed ready request");
            return;
        };
        tracing::info!(uid = session.uid, is_ready = req.is_ready, "ready state change");

        let response = match session
            .shared
            .room_client
            .get_ready(session.uid, req.is_ready)
            .await
        {
            Ok(resp) => GetReadyResponse {
                ret: resp.ret as i32,
                room_id: resp.room_id,
            },
            Err(err) => {
                tracing::error!(uid = session.uid, error = %err, "ready RPC failed");
                GetReadyResponse {
                    ret: ErrorCode::ServerError as i32,
                    room_id: String::new(),
                }
            }
        };
        session.respond(&envelope, response.encode_to_vec());
    })
}

pub fn handle_game_action(session: &mut PlayerSession, envelope: Envelope) -> BoxFuture<'_, ()> {
    Box::pin(async move {
        let Ok(req) = GameActionRequest::decode(envelope.data.as_slice()) else {
            tracing::error!(uid = session.uid, "malformed game action request");
            return;
        };
        let Some(mut action) = req.action else {
            session.respond(
                &envelope,
                GameActionResponse {
                    ret: ErrorCode::InvalidParam as i32,
                }
                .encode_to_vec(),
            );
            return;
        };

        // The acting player is always the session owner, whatever the
        // client put in the envelope. The room service resolves the room
        // from its own membership index; a match-seated player has no
        // gateway-side room id to check against.
        action.player_id = session.uid;

        let response = match session
            .shared
            .room_client
            .player_action(session.uid, action)
            .await
        {
            Ok(resp) => GameActionResponse {
                ret: resp.ret as i32,
            },
            Err(err) => {
                tracing::error!(uid = session.uid, error = %err, "action RPC failed");
                GameActionResponse {
                    ret: ErrorCode::ServerError as i32,
                }
            }
        };
        session.respond(&envelope, response.encode_to_vec());
    })
}
