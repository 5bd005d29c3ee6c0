//! Process-wide session index.
//!
//! Sessions are reachable two ways: by connection id from the moment the
//! socket is accepted, and by user id once authentication binds one. The
//! notify endpoints resolve by uid and enqueue onto the session's outbox.

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use wordcard_protocol::Envelope;

/// Outbound handle to one session. Cheap to clone.
#[derive(Clone)]
pub struct SessionSender {
    pub conn_id: String,
    outbox: mpsc::Sender<Envelope>,
}

impl SessionSender {
    pub fn new(conn_id: String, outbox: mpsc::Sender<Envelope>) -> Self {
        Self { conn_id, outbox }
    }

    /// Enqueue an outbound envelope. A full outbox drops the message; the
    /// periodic state broadcasts re-converge the client.
    pub fn enqueue(&self, envelope: Envelope) -> bool {
        match self.outbox.try_send(envelope) {
            Ok(()) => true,
            Err(TrySendError::Full(env)) => {
                tracing::warn!(conn_id = %self.conn_id, id = env.id, "outbox full, dropping message");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }
}

#[derive(Default)]
pub struct SessionManager {
    by_conn: DashMap<String, SessionSender>,
    by_uid: DashMap<u64, SessionSender>,
}

impl SessionManager {
    pub fn insert(&self, sender: SessionSender) {
        self.by_conn.insert(sender.conn_id.clone(), sender);
    }

    /// Bind a uid to an accepted connection after auth. The latest login
    /// wins when a user connects twice.
    pub fn bind_uid(&self, uid: u64, conn_id: &str) {
        if let Some(sender) = self.by_conn.get(conn_id) {
            self.by_uid.insert(uid, sender.value().clone());
        } else {
            tracing::warn!(conn_id, uid, "bind for unknown connection");
        }
    }

    pub fn by_uid(&self, uid: u64) -> Option<SessionSender> {
        self.by_uid.get(&uid).map(|s| s.value().clone())
    }

    /// Remove a session from both indexes. The uid entry is only removed
    /// when it still points at this connection, so a newer login survives.
    pub fn remove(&self, conn_id: &str, uid: Option<u64>) {
        self.by_conn.remove(conn_id);
        if let Some(uid) = uid {
            self.by_uid
                .remove_if(&uid, |_, sender| sender.conn_id == conn_id);
        }
    }

    pub fn session_count(&self) -> usize {
        self.by_conn.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wordcard_protocol::MsgId;

    fn sender(conn_id: &str, depth: usize) -> (SessionSender, mpsc::Receiver<Envelope>) {
        let (tx, rx) = mpsc::channel(depth);
        (SessionSender::new(conn_id.to_string(), tx), rx)
    }

    #[test]
    fn bind_and_resolve_by_uid() {
        let manager = SessionManager::default();
        let (s, _rx) = sender("c1", 4);
        manager.insert(s);
        manager.bind_uid(7, "c1");

        assert_eq!(manager.by_uid(7).unwrap().conn_id, "c1");
        assert!(manager.by_uid(8).is_none());
    }

    #[test]
    fn newer_login_survives_old_session_removal() {
        let manager = SessionManager::default();
        let (s1, _rx1) = sender("c1", 4);
        let (s2, _rx2) = sender("c2", 4);
        manager.insert(s1);
        manager.bind_uid(7, "c1");
        manager.insert(s2);
        manager.bind_uid(7, "c2");

        // The stale session's cleanup must not unbind the fresh one.
        manager.remove("c1", Some(7));
        assert_eq!(manager.by_uid(7).unwrap().conn_id, "c2");

        manager.remove("c2", Some(7));
        assert!(manager.by_uid(7).is_none());
        assert_eq!(manager.session_count(), 0);
    }

    #[test]
    fn full_outbox_drops_instead_of_blocking() {
        let (s, mut rx) = sender("c1", 1);
        assert!(s.enqueue(Envelope::notification(MsgId::RoomStateNotification, vec![])));
        assert!(!s.enqueue(Envelope::notification(MsgId::RoomStateNotification, vec![])));
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }
}
