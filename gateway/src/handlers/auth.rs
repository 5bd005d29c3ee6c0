//! Authentication: session token → openid → game-internal uid.

use futures_util::future::BoxFuture;
use prost::Message;

use wordcard_protocol::wire::{AuthRequest, AuthResponse};
use wordcard_protocol::{Envelope, ErrorCode};
use wordcard_store::identity::{is_guest, level_for_exp, UserRecord};

use crate::session::PlayerSession;

pub fn handle_auth(session: &mut PlayerSession, envelope: Envelope) -> BoxFuture<'_, ()> {
    Box::pin(async move {
        let Ok(req) = AuthRequest::decode(envelope.data.as_slice()) else {
            tracing::error!(conn_id = %session.conn_id, "malformed auth request");
            respond_error(session, &envelope, ErrorCode::InvalidParam, "invalid request format");
            return;
        };

        // The uid is bound at most once per session.
        if session.authenticated {
            tracing::warn!(conn_id = %session.conn_id, uid = session.uid, "duplicate auth request");
            match session.shared.identity.load_user(session.uid).await {
                Ok(record) => respond_success(session, &envelope, &record, false, 0),
                Err(_) => respond_error(session, &envelope, ErrorCode::ServerError, "failed to load user data"),
            }
            return;
        }

        if req.token.is_empty() {
            respond_error(session, &envelope, ErrorCode::InvalidParam, "token is required");
            return;
        }

        let session_data = match session.shared.identity.session(&req.token).await {
            Ok(Some(data)) => data,
            Ok(None) => {
                tracing::info!(conn_id = %session.conn_id, "invalid or expired token");
                respond_error(
                    session,
                    &envelope,
                    ErrorCode::AuthFailed,
                    "invalid token or session expired",
                );
                return;
            }
            Err(err) => {
                tracing::error!(conn_id = %session.conn_id, error = %err, "session validation failed");
                respond_error(session, &envelope, ErrorCode::ServerError, "internal server error");
                return;
            }
        };

        let guest = req.is_guest || is_guest(&session_data.openid);

        let (record, uid) = match session
            .shared
            .identity
            .find_or_create_user(&session_data.openid, &session_data.username)
            .await
        {
            Ok(found) => found,
            Err(err) => {
                tracing::error!(conn_id = %session.conn_id, error = %err, "user lookup failed");
                respond_error(session, &envelope, ErrorCode::ServerError, "failed to load user data");
                return;
            }
        };

        session.uid = uid;
        session.openid = session_data.openid.clone();
        session.name = record.nickname.clone();
        session.authenticated = true;

        session.shared.manager.bind_uid(uid, &session.conn_id);
        if let Err(err) = session
            .shared
            .identity
            .set_user_gateway(uid, &session.shared.notify_addr)
            .await
        {
            tracing::warn!(uid, error = %err, "routing entry write failed");
        }

        tracing::info!(
            conn_id = %session.conn_id,
            uid,
            openid = %session_data.openid,
            guest,
            "user authenticated"
        );
        respond_success(session, &envelope, &record, guest, session_data.expires_at);
    })
}

fn respond_success(
    session: &PlayerSession,
    request: &Envelope,
    record: &UserRecord,
    is_guest: bool,
    session_expiry: i64,
) {
    let response = AuthResponse {
        ret: ErrorCode::Ok as i32,
        uid: session.uid,
        conn_id: session.conn_id.clone(),
        nickname: record.nickname.clone(),
        level: level_for_exp(record.exp),
        exp: record.exp,
        gold: record.gold,
        diamond: record.diamond,
        is_guest,
        session_expiry,
        error_msg: String::new(),
    };
    session.respond(request, response.encode_to_vec());
}

fn respond_error(session: &PlayerSession, request: &Envelope, ret: ErrorCode, msg: &str) {
    let response = AuthResponse {
        ret: ret as i32,
        uid: session.uid,
        error_msg: msg.to_string(),
        ..Default::default()
    };
    session.respond(request, response.encode_to_vec());
}
