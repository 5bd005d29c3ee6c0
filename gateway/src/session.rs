//! Player session actor: owns exactly one socket.
//!
//! Three tasks per session: a reader that deframes bytes into whole
//! envelopes, a writer that drains the bounded outbox in order, and the
//! dispatch loop that applies messages serially through the handler
//! registry. A watch channel carries the cancellation signal; whichever
//! task hits a fatal condition flips it and the others stop at their next
//! suspension point. Cleanup runs exactly once, on the single exit path of
//! [`run_session`].

use std::sync::Arc;
use std::time::Duration;

use prost::Message;
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use wordcard_protocol::{frame_message, Envelope, FrameBuffer, MsgId};
use wordcard_store::IdentityStore;

use crate::conn::{ConnReader, ConnWriter, Connection};
use crate::handlers;
use crate::manager::{SessionManager, SessionSender};
use crate::rpc::{MatchClient, RoomClient};

/// A session that has not authenticated within this window is force-closed.
pub const AUTH_TIMEOUT: Duration = Duration::from_secs(3);
/// Depth of the per-session inbox and outbox.
pub const CHANNEL_DEPTH: usize = 1000;

/// Dependencies shared by every session on this gateway.
pub struct GatewayShared {
    pub manager: Arc<SessionManager>,
    pub identity: IdentityStore,
    pub room_client: RoomClient,
    pub match_client: MatchClient,
    /// Address peers use to reach this gateway's notify endpoints; written
    /// into the per-user routing table at auth.
    pub notify_addr: String,
}

/// Mutable state of one connected player. Only the dispatch loop touches it.
pub struct PlayerSession {
    pub conn_id: String,
    pub uid: u64,
    pub openid: String,
    pub name: String,
    pub authenticated: bool,
    pub current_room_id: String,
    pub shared: Arc<GatewayShared>,
    outbox: mpsc::Sender<Envelope>,
}

impl PlayerSession {
    /// Queue an outbound envelope; a full outbox drops it.
    pub fn send(&self, envelope: Envelope) {
        if self.outbox.try_send(envelope).is_err() {
            tracing::warn!(conn_id = %self.conn_id, "outbox full or closed, dropping response");
        }
    }

    /// Reply to a request: response id, same serial.
    pub fn respond(&self, request: &Envelope, data: Vec<u8>) {
        self.send(Envelope::response_to(request, data));
    }
}

/// True when the envelope must close the session under the auth gate: only
/// the auth request may arrive before authentication.
pub fn violates_auth_gate(envelope: &Envelope, authenticated: bool) -> bool {
    !authenticated && envelope.id != MsgId::AuthRequest as i32
}

/// Drive one client connection from accept to cleanup.
pub async fn run_session(conn: Connection, shared: Arc<GatewayShared>) {
    let conn_id = Uuid::new_v4().simple().to_string();
    tracing::info!(conn_id = %conn_id, "session opened");

    let (reader, writer) = conn.split();
    let (out_tx, out_rx) = mpsc::channel(CHANNEL_DEPTH);
    let (in_tx, in_rx) = mpsc::channel(CHANNEL_DEPTH);
    let (cancel_tx, cancel_rx) = watch::channel(false);

    shared
        .manager
        .insert(SessionSender::new(conn_id.clone(), out_tx.clone()));

    let read_task = tokio::spawn(read_loop(
        reader,
        in_tx,
        cancel_tx.clone(),
        cancel_rx.clone(),
        conn_id.clone(),
    ));
    let write_task = tokio::spawn(write_loop(
        writer,
        out_rx,
        cancel_tx.clone(),
        cancel_rx.clone(),
        conn_id.clone(),
    ));

    let mut session = PlayerSession {
        conn_id: conn_id.clone(),
        uid: 0,
        openid: String::new(),
        name: String::new(),
        authenticated: false,
        current_room_id: String::new(),
        shared: Arc::clone(&shared),
        outbox: out_tx,
    };

    dispatch_loop(&mut session, in_rx, cancel_rx).await;

    // Entering Closed: release the other tasks, then clean up once.
    let _ = cancel_tx.send(true);
    cleanup(&mut session).await;
    let _ = read_task.await;
    let _ = write_task.await;
    tracing::info!(
        conn_id = %conn_id,
        uid = session.uid,
        openid = %session.openid,
        live_sessions = shared.manager.session_count(),
        "session closed"
    );
}

/// Serial message dispatch with the auth deadline armed until the session
/// authenticates.
async fn dispatch_loop(
    session: &mut PlayerSession,
    mut in_rx: mpsc::Receiver<Envelope>,
    mut cancel_rx: watch::Receiver<bool>,
) {
    let registry = handlers::registry();
    let auth_deadline = tokio::time::sleep(AUTH_TIMEOUT);
    tokio::pin!(auth_deadline);

    loop {
        tokio::select! {
            _ = cancel_rx.changed() => break,
            _ = &mut auth_deadline, if !session.authenticated => {
                tracing::warn!(conn_id = %session.conn_id, "auth window expired");
                break;
            }
            envelope = in_rx.recv() => {
                let Some(envelope) = envelope else { break };

                if violates_auth_gate(&envelope, session.authenticated) {
                    tracing::warn!(
                        conn_id = %session.conn_id,
                        id = envelope.id,
                        "message before authentication"
                    );
                    break;
                }

                match registry.get(&envelope.id) {
                    Some(handler) => handler(session, envelope).await,
                    None => {
                        tracing::info!(conn_id = %session.conn_id, id = envelope.id, "message not registered");
                    }
                }
            }
        }
    }
}

/// Best-effort teardown of everything the session owns elsewhere. Failures
/// are logged; the room and match services also converge via their own
/// liveness checks.
async fn cleanup(session: &mut PlayerSession) {
    if session.uid != 0 {
        match session.shared.room_client.leave_room(session.uid).await {
            Ok(resp) => {
                tracing::info!(uid = session.uid, room_id = %resp.room_id, ret = ?resp.ret, "room cleanup done")
            }
            Err(err) => tracing::warn!(uid = session.uid, error = %err, "room cleanup failed"),
        }
        session.current_room_id.clear();

        if let Err(err) = session.shared.match_client.cancel_match(session.uid).await {
            tracing::warn!(uid = session.uid, error = %err, "match cleanup failed");
        }

        if let Err(err) = session.shared.identity.clear_user_gateway(session.uid).await {
            tracing::warn!(uid = session.uid, error = %err, "route cleanup failed");
        }
    }

    let uid = (session.uid != 0).then_some(session.uid);
    session.shared.manager.remove(&session.conn_id, uid);
}

async fn read_loop(
    mut reader: ConnReader,
    in_tx: mpsc::Sender<Envelope>,
    cancel_tx: watch::Sender<bool>,
    mut cancel_rx: watch::Receiver<bool>,
    conn_id: String,
) {
    let mut buffer = FrameBuffer::new();
    loop {
        tokio::select! {
            _ = cancel_rx.changed() => break,
            chunk = reader.read_chunk() => {
                match chunk {
                    Ok(Some(bytes)) => {
                        let mut fatal = false;
                        for frame in buffer.push(&bytes) {
                            match frame {
                                Ok(payload) => match Envelope::decode(payload.as_slice()) {
                                    Ok(envelope) => {
                                        if in_tx.try_send(envelope).is_err() {
                                            tracing::warn!(conn_id = %conn_id, "inbox full, dropping message");
                                        }
                                    }
                                    Err(err) => {
                                        tracing::error!(conn_id = %conn_id, error = %err, "envelope decode failed");
                                        fatal = true;
                                        break;
                                    }
                                },
                                Err(err) => {
                                    tracing::error!(conn_id = %conn_id, error = %err, "framing error");
                                    fatal = true;
                                    break;
                                }
                            }
                        }
                        if fatal {
                            let _ = cancel_tx.send(true);
                            break;
                        }
                    }
                    Ok(None) => {
                        tracing::info!(conn_id = %conn_id, "peer closed the stream");
                        break;
                    }
                    Err(err) => {
                        tracing::info!(conn_id = %conn_id, error = %err, "connection read failed");
                        break;
                    }
                }
            }
        }
    }
    // Dropping in_tx lets the dispatch loop observe the end of input.
}

async fn write_loop(
    mut writer: ConnWriter,
    mut out_rx: mpsc::Receiver<Envelope>,
    cancel_tx: watch::Sender<bool>,
    mut cancel_rx: watch::Receiver<bool>,
    conn_id: String,
) {
    loop {
        tokio::select! {
            _ = cancel_rx.changed() => break,
            envelope = out_rx.recv() => {
                match envelope {
                    Some(envelope) => {
                        let framed = frame_message(&envelope.encode_to_vec());
                        if let Err(err) = writer.write_frame(framed).await {
                            tracing::error!(conn_id = %conn_id, error = %err, "socket write failed");
                            let _ = cancel_tx.send(true);
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }
    writer.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_gate_blocks_everything_but_auth() {
        let auth = Envelope {
            client_id: String::new(),
            msg_serial_no: 1,
            id: MsgId::AuthRequest as i32,
            data: vec![],
        };
        let join = Envelope {
            client_id: String::new(),
            msg_serial_no: 2,
            id: MsgId::JoinRoomRequest as i32,
            data: vec![],
        };

        assert!(!violates_auth_gate(&auth, false));
        assert!(violates_auth_gate(&join, false));
        assert!(!violates_auth_gate(&join, true));
    }
}
