//! Message handler registry.
//!
//! Dispatch is data, not inheritance: inbound envelopes are routed through a
//! map from message id to handler function, built once at startup. Handlers
//! run serially per session; they may await outbound RPCs freely because
//! only their own session waits on them.

mod auth;
mod matchmaking;
mod room;
mod user;

use std::collections::HashMap;
use std::sync::OnceLock;

use futures_util::future::BoxFuture;

use wordcard_protocol::{Envelope, MsgId};

use crate::session::PlayerSession;

pub type Handler = for<'a> fn(&'a mut PlayerSession, Envelope) -> BoxFuture<'a, ()>;

static REGISTRY: OnceLock<HashMap<i32, Handler>> = OnceLock::new();

pub fn registry() -> &'static HashMap<i32, Handler> {
    REGISTRY.get_or_init(|| {
        let mut handlers: HashMap<i32, Handler> = HashMap::new();
        handlers.insert(MsgId::AuthRequest as i32, auth::handle_auth);
        handlers.insert(MsgId::GetUserInfoRequest as i32, user::handle_get_user_info);

        handlers.insert(MsgId::CreateRoomRequest as i32, room::handle_create_room);
        handlers.insert(MsgId::JoinRoomRequest as i32, room::handle_join_room);
        handlers.insert(MsgId::LeaveRoomRequest as i32, room::handle_leave_room);
        handlers.insert(MsgId::GetRoomListRequest as i32, room::handle_room_list);
        handlers.insert(MsgId::GetReadyRequest as i32, room::handle_get_ready);
        handlers.insert(MsgId::GameActionRequest as i32, room::handle_game_action);

        handlers.insert(MsgId::MatchRequest as i32, matchmaking::handle_match);
        handlers.insert(MsgId::CancelMatchRequest as i32, matchmaking::handle_cancel_match);
        handlers
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_request_id_is_registered() {
        let registry = registry();
        for id in [
            MsgId::AuthRequest,
            MsgId::GetUserInfoRequest,
            MsgId::CreateRoomRequest,
            MsgId::JoinRoomRequest,
            MsgId::LeaveRoomRequest,
            MsgId::GetRoomListRequest,
            MsgId::GetReadyRequest,
            MsgId::GameActionRequest,
            MsgId::MatchRequest,
            MsgId::CancelMatchRequest,
        ] {
            assert!(registry.contains_key(&(id as i32)), "{id:?} not registered");
        }
    }

    #[test]
    fn responses_and_notifications_are_not_dispatchable() {
        let registry = registry();
        for id in [
            MsgId::AuthResponse,
            MsgId::GameActionResponse,
            MsgId::RoomStateNotification,
            MsgId::MatchResultNotification,
        ] {
            assert!(!registry.contains_key(&(id as i32)));
        }
    }
}
