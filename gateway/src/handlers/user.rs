//! User profile queries.

use futures_util::future::BoxFuture;
use prost::Message;

use wordcard_protocol::wire::GetUserInfoResponse;
use wordcard_protocol::{Envelope, ErrorCode};
use wordcard_store::identity::level_for_exp;

use crate::session::PlayerSession;

pub fn handle_get_user_info(session: &mut PlayerSession, envelope: Envelope) -> BoxFuture<'_, ()> {
    Box::pin(async move {
        let response = match session.shared.identity.load_user(session.uid).await {
            Ok(record) => GetUserInfoResponse {
                ret: ErrorCode::Ok as i32,
                uid: session.uid,
                nickname: record.nickname,
                level: level_for_exp(record.exp),
                exp: record.exp,
                gold: record.gold,
                diamond: record.diamond,
            },
            Err(err) => {
                tracing::error!(uid = session.uid, error = %err, "user record load failed");
                GetUserInfoResponse {
                    ret: ErrorCode::ServerError as i32,
                    uid: session.uid,
                    ..Default::default()
                }
            }
        };
        session.respond(&envelope, response.encode_to_vec());
    })
}
