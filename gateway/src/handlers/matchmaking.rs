//! Matchmaking request handlers.

use futures_util::future::BoxFuture;
use prost::Message;

use wordcard_protocol::rpc::PlayerInitData;
use wordcard_protocol::wire::{CancelMatchResponse, MatchResponse};
use wordcard_protocol::{Envelope, ErrorCode};

use crate::session::PlayerSession;

pub fn handle_match(session: &mut PlayerSession, envelope: Envelope) -> BoxFuture<'_, ()> {
    Box::pin(async move {
        // A seated player cannot queue.
        if !session.current_room_id.is_empty() {
            tracing::warn!(uid = session.uid, room_id = %session.current_room_id, "match request while in a room");
            session.respond(
                &envelope,
                MatchResponse {
                    ret: ErrorCode::PlayerAlreadyInRoom as i32,
                }
                .encode_to_vec(),
            );
            return;
        }

        tracing::info!(uid = session.uid, "match requested");
        let player = PlayerInitData {
            player_id: session.uid,
            player_name: session.name.clone(),
        };
        let response = match session.shared.match_client.start_match(player).await {
            Ok(resp) => MatchResponse {
                ret: resp.ret as i32,
            },
            Err(err) => {
                tracing::error!(uid = session.uid, error = %err, "match RPC failed");
                MatchResponse {
                    ret: ErrorCode::ServerError as i32,
                }
            }
        };
        session.respond(&envelope, response.encode_to_vec());
    })
}

pub fn handle_cancel_match(session: &mut PlayerSession, envelope: Envelope) -> BoxFuture<'_, ()> {
    Box::pin(async move {
        tracing::info!(uid = session.uid, "match cancel requested");
        let response = match session.shared.match_client.cancel_match(session.uid).await {
            Ok(resp) => CancelMatchResponse {
                ret: resp.ret as i32,
            },
            Err(err) => {
                tracing::error!(uid = session.uid, error = %err, "cancel match RPC failed");
                CancelMatchResponse {
                    ret: ErrorCode::ServerError as i32,
                }
            }
        };
        session.respond(&envelope, response.encode_to_vec());
    })
}
