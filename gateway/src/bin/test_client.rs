//! Scripted smoke client for a locally running stack.
//!
//! Seeds two guest sessions in the store (standing in for the login
//! service), connects two framed-TCP clients, and drives the happy path:
//! auth, create/join room, ready up, first card placement. Notifications
//! received along the way are printed as they arrive.
//!
//! Run with the gateway, room service, match service and redis up:
//!
//! ```text
//! cargo run --bin test_client
//! ```

use std::collections::VecDeque;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use prost::Message;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use wordcard_protocol::wire::{
    self, game_action, ActionType, GameAction, PlaceCardAction,
};
use wordcard_protocol::{frame_message, Envelope, ErrorCode, FrameBuffer, MsgId};
use wordcard_store::identity::SessionData;
use wordcard_store::Store;

struct TestClient {
    name: &'static str,
    stream: TcpStream,
    buffer: FrameBuffer,
    pending: VecDeque<Envelope>,
    serial: i32,
}

impl TestClient {
    async fn connect(name: &'static str, addr: &str) -> anyhow::Result<Self> {
        Ok(Self {
            name,
            stream: TcpStream::connect(addr).await?,
            buffer: FrameBuffer::new(),
            pending: VecDeque::new(),
            serial: 0,
        })
    }

    /// Send a request and wait for its paired response, printing any
    /// notifications that arrive in between.
    async fn call(&mut self, id: MsgId, data: Vec<u8>) -> anyhow::Result<Envelope> {
        self.serial += 1;
        let request = Envelope {
            client_id: self.name.to_string(),
            msg_serial_no: self.serial,
            id: id as i32,
            data,
        };
        self.stream
            .write_all(&frame_message(&request.encode_to_vec()))
            .await?;

        loop {
            let envelope = self.next_envelope().await?;
            if envelope.id == id as i32 + 1 && envelope.msg_serial_no == self.serial {
                return Ok(envelope);
            }
            self.print_notification(&envelope);
        }
    }

    /// Wait for one notification of the given kind, printing others.
    async fn wait_for(&mut self, id: MsgId) -> anyhow::Result<Envelope> {
        loop {
            let envelope = self.next_envelope().await?;
            self.print_notification(&envelope);
            if envelope.id == id as i32 {
                return Ok(envelope);
            }
        }
    }

    async fn next_envelope(&mut self) -> anyhow::Result<Envelope> {
        loop {
            if let Some(envelope) = self.pending.pop_front() {
                return Ok(envelope);
            }

            let mut chunk = [0u8; 4096];
            let n = self.stream.read(&mut chunk).await?;
            anyhow::ensure!(n > 0, "{}: connection closed", self.name);
            for frame in self.buffer.push(&chunk[..n]) {
                let frame = frame?;
                self.pending.push_back(Envelope::decode(frame.as_slice())?);
            }
        }
    }

    fn print_notification(&self, envelope: &Envelope) {
        match MsgId::try_from(envelope.id) {
            Ok(MsgId::RoomStateNotification) => {
                if let Ok(detail) = wire::RoomDetail::decode(envelope.data.as_slice()) {
                    println!(
                        "[{}] room update: {} players",
                        self.name,
                        detail.current_players.len()
                    );
                }
            }
            Ok(MsgId::GameStartNotification) => {
                if let Ok(start) = wire::GameStartNotification::decode(envelope.data.as_slice()) {
                    println!("[{}] game started in room {}", self.name, start.room_id);
                }
            }
            Ok(MsgId::GameStateNotification) => {
                if let Ok(notify) = wire::GameStateNotify::decode(envelope.data.as_slice()) {
                    let state = notify.state.unwrap_or_default();
                    let sentence = state
                        .card_table
                        .map(|t| t.sentence)
                        .unwrap_or_default();
                    println!(
                        "[{}] game state: turn={} sentence={sentence:?}",
                        self.name, state.current_turn
                    );
                }
            }
            Ok(MsgId::GameEndNotification) => {
                println!("[{}] game over", self.name);
            }
            Ok(MsgId::GameActionNotification) => {
                if let Ok(notify) = wire::PlayerActionNotify::decode(envelope.data.as_slice()) {
                    println!("[{}] action by player {}", self.name, notify.player_id);
                }
            }
            Ok(MsgId::MatchResultNotification) => {
                println!("[{}] match result", self.name);
            }
            _ => println!("[{}] message id {}", self.name, envelope.id),
        }
    }
}

/// Stand in for the login service: mint a guest session directly in the
/// store.
async fn seed_session(store: &Store, token: &str, openid: &str, username: &str) -> anyhow::Result<()> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    let session = SessionData {
        user_id: 0,
        openid: openid.to_string(),
        username: username.to_string(),
        login_time: now,
        expires_at: now + 3600,
        app_id: "smoke".to_string(),
    };
    store
        .set_json(&format!("session:{token}"), &session, Some(Duration::from_secs(3600)))
        .await?;
    Ok(())
}

async fn auth(client: &mut TestClient, token: &str) -> anyhow::Result<u64> {
    let request = wire::AuthRequest {
        token: token.to_string(),
        is_guest: true,
    };
    let response = client
        .call(MsgId::AuthRequest, request.encode_to_vec())
        .await?;
    let auth = wire::AuthResponse::decode(response.data.as_slice())?;
    anyhow::ensure!(
        auth.ret == ErrorCode::Ok as i32,
        "{}: auth failed: {}",
        client.name,
        auth.error_msg
    );
    println!("[{}] authenticated as uid {} ({})", client.name, auth.uid, auth.nickname);
    Ok(auth.uid)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let gateway_addr =
        std::env::var("GATEWAY_TCP_ADDR").unwrap_or_else(|_| "127.0.0.1:8690".to_string());
    let redis_url =
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());

    let store = Store::connect(&redis_url).await?;
    seed_session(&store, "smoke-token-1", "guest_smoke_1", "SmokeOne").await?;
    seed_session(&store, "smoke-token-2", "guest_smoke_2", "SmokeTwo").await?;

    let mut alice = TestClient::connect("alice", &gateway_addr).await?;
    let mut bob = TestClient::connect("bob", &gateway_addr).await?;

    let alice_uid = auth(&mut alice, "smoke-token-1").await?;
    auth(&mut bob, "smoke-token-2").await?;

    // Alice opens a room, Bob joins it.
    let response = alice
        .call(
            MsgId::CreateRoomRequest,
            wire::CreateRoomRequest {
                name: "smoke".to_string(),
            }
            .encode_to_vec(),
        )
        .await?;
    let created = wire::CreateRoomResponse::decode(response.data.as_slice())?;
    anyhow::ensure!(created.ret == ErrorCode::Ok as i32, "create room failed");
    let room_id = created
        .room
        .and_then(|d| d.room)
        .map(|r| r.id)
        .unwrap_or_default();
    println!("[alice] created room {room_id}");

    let response = bob
        .call(
            MsgId::JoinRoomRequest,
            wire::JoinRoomRequest {
                room_id: room_id.clone(),
            }
            .encode_to_vec(),
        )
        .await?;
    let joined = wire::JoinRoomResponse::decode(response.data.as_slice())?;
    anyhow::ensure!(joined.ret == ErrorCode::Ok as i32, "join room failed");
    println!("[bob] joined room {room_id}");

    // Both ready up; the room starts the game.
    for client in [&mut alice, &mut bob] {
        let response = client
            .call(
                MsgId::GetReadyRequest,
                wire::GetReadyRequest { is_ready: true }.encode_to_vec(),
            )
            .await?;
        let ready = wire::GetReadyResponse::decode(response.data.as_slice())?;
        anyhow::ensure!(ready.ret == ErrorCode::Ok as i32, "ready failed");
    }

    let state_env = alice.wait_for(MsgId::GameStateNotification).await?;
    let state = wire::GameStateNotify::decode(state_env.data.as_slice())?
        .state
        .unwrap_or_default();

    // Whoever holds the turn plays their first card at the head.
    let turn_uid = state
        .players
        .get(state.current_turn as usize)
        .map(|p| p.id)
        .unwrap_or_default();
    let actor = if turn_uid == alice_uid { &mut alice } else { &mut bob };
    println!("[{}] placing first card", actor.name);

    let action = GameAction {
        player_id: turn_uid,
        action_type: ActionType::PlaceCard as i32,
        timestamp: 0,
        detail: Some(game_action::Detail::PlaceCard(PlaceCardAction {
            card_id: 0,
            target_index: 0,
        })),
    };
    let response = actor
        .call(
            MsgId::GameActionRequest,
            wire::GameActionRequest {
                action: Some(action),
            }
            .encode_to_vec(),
        )
        .await?;
    let result = wire::GameActionResponse::decode(response.data.as_slice())?;
    println!("[{}] placement result: {:?}", actor.name, ErrorCode::try_from(result.ret));

    // Let the resulting broadcasts land before leaving.
    let _ = tokio::time::timeout(
        Duration::from_secs(1),
        alice.wait_for(MsgId::GameStateNotification),
    )
    .await;

    println!("smoke run complete");
    Ok(())
}
