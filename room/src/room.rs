//! Room actor: single authoritative owner of one game room.
//!
//! All state lives inside the actor task; callers talk to it through
//! [`RoomHandle`] commands answered over oneshot channels. The loop selects
//! over the command queue, a 100 ms game-over tick and nothing else; no
//! other task ever touches room fields.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot};

use wordcard_protocol::wire::{
    game_action, ActionType, CharacterMoveAction, GameAction, GameEndNotification,
    GameStartNotification, Room, RoomDetail, RoomPlayer,
};
use wordcard_protocol::ErrorCode;

use crate::game::{create_game, EventSink, Game, GamePlayer, GameRules, GameType};
use crate::notify::Notify;

/// Cadence of the game-over check.
pub const GAME_TICK: Duration = Duration::from_millis(100);
/// Command queue depth per room.
pub const COMMAND_QUEUE_DEPTH: usize = 100;
/// Advertised seat count.
pub const ROOM_MAX_PLAYERS: i32 = 4;

const ROOM_NAME: &str = "Battle Room";

/// Process-wide room bookkeeping shared between the RPC surface and the
/// actors. A player maps to at most one room across the whole service.
#[derive(Default)]
pub struct RoomIndex {
    pub rooms: DashMap<String, RoomHandle>,
    pub player_in_room: DashMap<u64, String>,
}

#[derive(Clone)]
pub struct RoomHandle {
    pub room_id: String,
    cmd_tx: mpsc::Sender<RoomCommand>,
}

pub enum RoomCommand {
    AddPlayer {
        player_id: u64,
        name: String,
        reply: oneshot::Sender<RoomDetail>,
    },
    RemovePlayer {
        player_id: u64,
        reply: oneshot::Sender<ErrorCode>,
    },
    SetReady {
        player_id: u64,
        is_ready: bool,
        reply: oneshot::Sender<ErrorCode>,
    },
    /// Fire-and-forget action enqueue.
    Action { player_id: u64, action: GameAction },
    /// Action with the result code reported back to the caller.
    ActionWithResult {
        player_id: u64,
        action: GameAction,
        reply: oneshot::Sender<ErrorCode>,
    },
    Detail { reply: oneshot::Sender<RoomDetail> },
    Stop,
}

impl RoomHandle {
    /// Seat a player. Idempotent. `None` means the room is gone.
    pub async fn add_player(&self, player_id: u64, name: String) -> Option<RoomDetail> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(RoomCommand::AddPlayer {
                player_id,
                name,
                reply,
            })
            .await
            .ok()?;
        rx.await.ok()
    }

    pub async fn remove_player(&self, player_id: u64) -> Option<ErrorCode> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(RoomCommand::RemovePlayer { player_id, reply })
            .await
            .ok()?;
        rx.await.ok()
    }

    pub async fn set_ready(&self, player_id: u64, is_ready: bool) -> Option<ErrorCode> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(RoomCommand::SetReady {
                player_id,
                is_ready,
                reply,
            })
            .await
            .ok()?;
        rx.await.ok()
    }

    /// Push an action without waiting for its outcome.
    pub async fn enqueue_action(&self, player_id: u64, action: GameAction) -> bool {
        self.cmd_tx
            .send(RoomCommand::Action { player_id, action })
            .await
            .is_ok()
    }

    /// Push an action and wait for the result code.
    pub async fn action_with_result(&self, player_id: u64, action: GameAction) -> Option<ErrorCode> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(RoomCommand::ActionWithResult {
                player_id,
                action,
                reply,
            })
            .await
            .ok()?;
        rx.await.ok()
    }

    pub async fn detail(&self) -> Option<RoomDetail> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx.send(RoomCommand::Detail { reply }).await.ok()?;
        rx.await.ok()
    }

    pub async fn stop(&self) {
        let _ = self.cmd_tx.send(RoomCommand::Stop).await;
    }
}

struct Member {
    name: String,
    position_x: i32,
    position_y: i32,
    sent_initial_position: bool,
}

enum Flow {
    Continue,
    Stop,
}

pub struct RoomActor<N: Notify> {
    room_id: String,
    game_type: GameType,
    members: BTreeMap<u64, Member>,
    ready: HashSet<u64>,
    game: Option<Box<dyn Game>>,
    rules: Arc<GameRules>,
    notifier: N,
    index: Arc<RoomIndex>,
    cmd_rx: mpsc::Receiver<RoomCommand>,
}

impl<N: Notify> RoomActor<N> {
    /// Spawn the actor task and hand back its command handle. The caller is
    /// responsible for inserting the handle into the index.
    pub fn spawn(
        room_id: String,
        game_type: GameType,
        rules: Arc<GameRules>,
        notifier: N,
        index: Arc<RoomIndex>,
    ) -> RoomHandle {
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let handle = RoomHandle {
            room_id: room_id.clone(),
            cmd_tx,
        };
        let actor = RoomActor {
            room_id,
            game_type,
            members: BTreeMap::new(),
            ready: HashSet::new(),
            game: None,
            rules,
            notifier,
            index,
            cmd_rx,
        };
        tokio::spawn(actor.run());
        handle
    }

    async fn run(mut self) {
        let mut tick = tokio::time::interval(GAME_TICK);
        loop {
            tokio::select! {
                cmd = self.cmd_rx.recv() => {
                    match cmd {
                        Some(cmd) => {
                            if let Flow::Stop = self.handle_command(cmd).await {
                                break;
                            }
                        }
                        None => {
                            self.teardown();
                            break;
                        }
                    }
                }
                _ = tick.tick() => {
                    if self.game.as_ref().is_some_and(|g| g.is_game_over()) {
                        self.finish_game().await;
                        break;
                    }
                }
            }
        }
        tracing::info!(room_id = %self.room_id, "room stopped");
    }

    async fn handle_command(&mut self, cmd: RoomCommand) -> Flow {
        match cmd {
            RoomCommand::AddPlayer {
                player_id,
                name,
                reply,
            } => {
                let newcomer = !self.members.contains_key(&player_id);
                self.members.entry(player_id).or_insert(Member {
                    name: name.clone(),
                    position_x: 0,
                    position_y: 0,
                    sent_initial_position: false,
                });
                if newcomer {
                    tracing::info!(room_id = %self.room_id, player_id, name = %name, "player joined");
                    self.broadcast_room_status().await;
                    self.sync_positions_to(player_id).await;
                }
                let _ = reply.send(self.detail());
                Flow::Continue
            }

            RoomCommand::RemovePlayer { player_id, reply } => {
                let existed = self.members.remove(&player_id).is_some();
                self.ready.remove(&player_id);
                self.index
                    .player_in_room
                    .remove_if(&player_id, |_, room| room == &self.room_id);

                if !existed {
                    let _ = reply.send(ErrorCode::Ok);
                    return Flow::Continue;
                }
                tracing::info!(room_id = %self.room_id, player_id, "player removed");

                if let Some(game) = self.game.as_mut() {
                    game.remove_player(player_id);
                }

                if self.members.is_empty() {
                    let _ = reply.send(ErrorCode::Ok);
                    tracing::info!(room_id = %self.room_id, "room empty, stopping");
                    self.teardown();
                    return Flow::Stop;
                }

                self.broadcast_room_status().await;
                let _ = reply.send(ErrorCode::Ok);
                Flow::Continue
            }

            RoomCommand::SetReady {
                player_id,
                is_ready,
                reply,
            } => {
                if !self.members.contains_key(&player_id) {
                    let _ = reply.send(ErrorCode::InvalidRoom);
                    return Flow::Continue;
                }
                if is_ready {
                    self.ready.insert(player_id);
                } else {
                    self.ready.remove(&player_id);
                }
                self.broadcast_room_status().await;
                let _ = reply.send(ErrorCode::Ok);

                if self.game.is_none()
                    && self.members.len() >= 2
                    && self.ready.len() == self.members.len()
                {
                    self.start_game().await;
                }
                Flow::Continue
            }

            RoomCommand::Action { player_id, action } => {
                let _ = self.apply_action(player_id, &action).await;
                Flow::Continue
            }

            RoomCommand::ActionWithResult {
                player_id,
                action,
                reply,
            } => {
                let ret = self.apply_action(player_id, &action).await;
                let _ = reply.send(ret);
                Flow::Continue
            }

            RoomCommand::Detail { reply } => {
                let _ = reply.send(self.detail());
                Flow::Continue
            }

            RoomCommand::Stop => {
                self.teardown();
                Flow::Stop
            }
        }
    }

    /// Room-layer actions are handled before the game gate; everything else
    /// is delegated to the game instance.
    async fn apply_action(&mut self, player_id: u64, action: &GameAction) -> ErrorCode {
        if action.action_type == ActionType::CharMove as i32 {
            return self.handle_char_move(player_id, action).await;
        }

        let Some(game) = self.game.as_mut() else {
            tracing::warn!(
                room_id = %self.room_id,
                player_id,
                action_type = action.action_type,
                "game not started, ignoring game action"
            );
            return ErrorCode::InvalidState;
        };

        let mut sink = EventSink::default();
        let ret = game.handle_action(player_id, action, &mut sink);
        for echoed in sink.actions {
            self.broadcast_player_action(echoed).await;
        }
        if ret == ErrorCode::Ok {
            self.broadcast_game_state().await;
        }
        ret
    }

    /// Position updates work in the lobby and mid-game alike.
    async fn handle_char_move(&mut self, player_id: u64, action: &GameAction) -> ErrorCode {
        let Some(mv) = action.char_move() else {
            return ErrorCode::InvalidParam;
        };
        let Some(member) = self.members.get_mut(&player_id) else {
            tracing::warn!(room_id = %self.room_id, player_id, "move from non-member");
            return ErrorCode::InvalidUser;
        };

        let first = !member.sent_initial_position;
        member.position_x = mv.to_x;
        member.position_y = mv.to_y;
        member.sent_initial_position = true;
        if first {
            tracing::debug!(room_id = %self.room_id, player_id, x = mv.to_x, y = mv.to_y, "first position");
        }

        self.broadcast_player_action(action.clone()).await;
        ErrorCode::Ok
    }

    async fn start_game(&mut self) {
        tracing::info!(room_id = %self.room_id, players = self.members.len(), "all players ready, starting game");

        let players: Vec<GamePlayer> = self
            .members
            .iter()
            .map(|(id, m)| GamePlayer::new(*id, m.name.clone()))
            .collect();
        let mut game = create_game(self.game_type, &self.rules, players);
        game.start();
        self.game = Some(game);
        // Readiness does not carry over into the next lobby phase.
        self.ready.clear();

        let start = GameStartNotification {
            room_id: self.room_id.clone(),
            players: self.player_list(),
        };
        for uid in self.member_ids() {
            self.notifier.game_start(uid, start.clone()).await;
        }
        self.broadcast_game_state().await;
    }

    async fn finish_game(&mut self) {
        let Some(mut game) = self.game.take() else {
            return;
        };
        let state = game.state();
        game.end();

        let end = GameEndNotification {
            room_id: self.room_id.clone(),
            players: state.players,
        };
        tracing::info!(room_id = %self.room_id, "game over");
        for uid in self.member_ids() {
            self.notifier.game_end(uid, end.clone()).await;
        }
        self.teardown();
    }

    /// Unmap members and drop the room from the service index. Safe to call
    /// on every exit path; the guarded removals make it idempotent.
    fn teardown(&mut self) {
        for uid in self.member_ids() {
            self.index
                .player_in_room
                .remove_if(&uid, |_, room| room == &self.room_id);
        }
        self.index.rooms.remove(&self.room_id);
    }

    /// Send every existing member's last known position to the newcomer as
    /// synthetic moves. The newcomer's own position stays private until they
    /// move themselves.
    async fn sync_positions_to(&self, new_player: u64) {
        for (&uid, member) in &self.members {
            if uid == new_player {
                continue;
            }
            let action = GameAction {
                player_id: uid,
                action_type: ActionType::CharMove as i32,
                timestamp: now_ms(),
                detail: Some(game_action::Detail::CharMove(CharacterMoveAction {
                    from_x: 0,
                    from_y: 0,
                    to_x: member.position_x,
                    to_y: member.position_y,
                })),
            };
            self.notifier
                .player_action(new_player, &self.room_id, action)
                .await;
        }
    }

    async fn broadcast_room_status(&self) {
        let detail = self.detail();
        for uid in self.member_ids() {
            self.notifier.room_status(uid, detail.clone()).await;
        }
    }

    async fn broadcast_game_state(&self) {
        let Some(game) = self.game.as_ref() else {
            return;
        };
        let state = game.state();
        tracing::debug!(
            room_id = %self.room_id,
            current_turn = state.current_turn,
            players = state.players.len(),
            "broadcasting game state"
        );
        for uid in self.member_ids() {
            self.notifier
                .game_state(uid, &self.room_id, state.clone())
                .await;
        }
    }

    async fn broadcast_player_action(&self, action: GameAction) {
        for uid in self.member_ids() {
            self.notifier
                .player_action(uid, &self.room_id, action.clone())
                .await;
        }
    }

    fn member_ids(&self) -> Vec<u64> {
        self.members.keys().copied().collect()
    }

    fn player_list(&self) -> Vec<RoomPlayer> {
        self.members
            .iter()
            .map(|(&uid, m)| RoomPlayer {
                uid,
                name: m.name.clone(),
                position_x: m.position_x,
                position_y: m.position_y,
                is_ready: self.ready.contains(&uid),
            })
            .collect()
    }

    fn detail(&self) -> RoomDetail {
        RoomDetail {
            room: Some(Room {
                id: self.room_id.clone(),
                name: ROOM_NAME.to_string(),
                max_players: ROOM_MAX_PLAYERS,
                current_players: self.members.len() as i32,
            }),
            current_players: self.player_list(),
        }
    }
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::GameRules;
    use crate::notify::Notify;
    use std::sync::Mutex;
    use wordcard_protocol::wire::{GameState, PlaceCardAction};

    #[derive(Debug)]
    enum Event {
        RoomStatus(u64, RoomDetail),
        GameState(u64, GameState),
        PlayerAction(u64, GameAction),
        GameStart(u64),
        GameEnd(u64, GameEndNotification),
    }

    #[derive(Clone, Default)]
    struct RecordingNotify {
        events: Arc<Mutex<Vec<Event>>>,
    }

    impl RecordingNotify {
        fn take(&self) -> Vec<Event> {
            let mut events = self.events.lock().unwrap();
            std::mem::take(&mut *events)
        }
    }

    impl Notify for RecordingNotify {
        async fn room_status(&self, uid: u64, room: RoomDetail) {
            self.events.lock().unwrap().push(Event::RoomStatus(uid, room));
        }
        async fn game_state(&self, uid: u64, _room_id: &str, state: GameState) {
            self.events.lock().unwrap().push(Event::GameState(uid, state));
        }
        async fn player_action(&self, uid: u64, _room_id: &str, action: GameAction) {
            self.events.lock().unwrap().push(Event::PlayerAction(uid, action));
        }
        async fn game_start(&self, uid: u64, _start: GameStartNotification) {
            self.events.lock().unwrap().push(Event::GameStart(uid));
        }
        async fn game_end(&self, uid: u64, end: GameEndNotification) {
            self.events.lock().unwrap().push(Event::GameEnd(uid, end));
        }
    }

    fn rules() -> Arc<GameRules> {
        let entries: Vec<String> = (0..10)
            .map(|i| format!(r#"{{"word":"w{i}","pos":"Adj"}}"#))
            .collect();
        Arc::new(GameRules::from_word_table(&format!("[{}]", entries.join(","))).unwrap())
    }

    fn spawn_room(
        notify: RecordingNotify,
        index: Arc<RoomIndex>,
    ) -> RoomHandle {
        let handle = RoomActor::spawn(
            "7".to_string(),
            GameType::WordCard,
            rules(),
            notify,
            Arc::clone(&index),
        );
        index.rooms.insert(handle.room_id.clone(), handle.clone());
        handle
    }

    fn char_move(player_id: u64, to_x: i32, to_y: i32) -> GameAction {
        GameAction {
            player_id,
            action_type: ActionType::CharMove as i32,
            timestamp: 0,
            detail: Some(game_action::Detail::CharMove(CharacterMoveAction {
                from_x: 0,
                from_y: 0,
                to_x,
                to_y,
            })),
        }
    }

    #[tokio::test]
    async fn ready_set_and_start_trigger() {
        let notify = RecordingNotify::default();
        let index = Arc::new(RoomIndex::default());
        let room = spawn_room(notify.clone(), index);

        room.add_player(1, "ada".into()).await.unwrap();
        room.add_player(2, "bob".into()).await.unwrap();

        // Ready toggles are idempotent presence ops.
        assert_eq!(room.set_ready(1, true).await, Some(ErrorCode::Ok));
        assert_eq!(room.set_ready(1, true).await, Some(ErrorCode::Ok));
        let detail = room.detail().await.unwrap();
        assert_eq!(
            detail.current_players.iter().filter(|p| p.is_ready).count(),
            1
        );

        notify.take();
        assert_eq!(room.set_ready(2, true).await, Some(ErrorCode::Ok));

        let events = notify.take();
        let starts: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, Event::GameStart(_)))
            .collect();
        assert_eq!(starts.len(), 2, "both players get the start notification");
        assert!(events.iter().any(|e| matches!(e, Event::GameState(_, _))));

        // Ready set is cleared on start.
        let detail = room.detail().await.unwrap();
        assert!(detail.current_players.iter().all(|p| !p.is_ready));
    }

    #[tokio::test]
    async fn char_move_broadcasts_in_lobby_and_newcomer_gets_positions() {
        let notify = RecordingNotify::default();
        let index = Arc::new(RoomIndex::default());
        let room = spawn_room(notify.clone(), index);

        room.add_player(1, "ada".into()).await.unwrap();
        notify.take();

        // Lobby movement is broadcast even without a game.
        assert_eq!(
            room.action_with_result(1, char_move(1, 5, 9)).await,
            Some(ErrorCode::Ok)
        );
        let events = notify.take();
        assert!(events
            .iter()
            .any(|e| matches!(e, Event::PlayerAction(1, a) if a.char_move().unwrap().to_y == 9)));

        // A joining player receives existing positions as synthetic moves,
        // and nobody is told the newcomer's own (unsent) position.
        room.add_player(2, "bob".into()).await.unwrap();
        let events = notify.take();
        let synced: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                Event::PlayerAction(to, a) => Some((*to, a)),
                _ => None,
            })
            .collect();
        assert_eq!(synced.len(), 1);
        assert_eq!(synced[0].0, 2);
        assert_eq!(synced[0].1.player_id, 1);
        assert_eq!(synced[0].1.char_move().unwrap().to_x, 5);
    }

    #[tokio::test]
    async fn game_actions_gated_until_start() {
        let notify = RecordingNotify::default();
        let index = Arc::new(RoomIndex::default());
        let room = spawn_room(notify.clone(), index);
        room.add_player(1, "ada".into()).await.unwrap();

        let action = GameAction {
            player_id: 1,
            action_type: ActionType::PlaceCard as i32,
            timestamp: 0,
            detail: Some(game_action::Detail::PlaceCard(PlaceCardAction {
                card_id: 0,
                target_index: 0,
            })),
        };
        assert_eq!(
            room.action_with_result(1, action).await,
            Some(ErrorCode::InvalidState)
        );
    }

    #[tokio::test]
    async fn off_turn_action_is_rejected_with_result() {
        let notify = RecordingNotify::default();
        let index = Arc::new(RoomIndex::default());
        let room = spawn_room(notify.clone(), index);

        room.add_player(1, "ada".into()).await.unwrap();
        room.add_player(2, "bob".into()).await.unwrap();
        room.set_ready(1, true).await.unwrap();
        room.set_ready(2, true).await.unwrap();

        // Learn whose turn it is from the start broadcast.
        let events = notify.take();
        let state = events
            .iter()
            .find_map(|e| match e {
                Event::GameState(_, s) => Some(s.clone()),
                _ => None,
            })
            .expect("game state broadcast after start");
        let off_turn_uid = state.players[(state.current_turn as usize + 1) % 2].id;

        let skip = GameAction {
            player_id: off_turn_uid,
            action_type: ActionType::SkipTurn as i32,
            timestamp: 0,
            detail: None,
        };
        assert_eq!(
            room.action_with_result(off_turn_uid, skip).await,
            Some(ErrorCode::NotYourTurn)
        );
    }

    #[tokio::test]
    async fn empty_room_stops_and_unmaps() {
        let notify = RecordingNotify::default();
        let index = Arc::new(RoomIndex::default());
        let room = spawn_room(notify, Arc::clone(&index));

        room.add_player(1, "ada".into()).await.unwrap();
        index.player_in_room.insert(1, room.room_id.clone());

        assert_eq!(room.remove_player(1).await, Some(ErrorCode::Ok));
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(index.rooms.is_empty());
        assert!(index.player_in_room.is_empty());
        assert!(room.detail().await.is_none(), "actor is gone");
    }

    #[tokio::test]
    async fn under_population_ends_running_game() {
        let notify = RecordingNotify::default();
        let index = Arc::new(RoomIndex::default());
        let room = spawn_room(notify.clone(), Arc::clone(&index));

        room.add_player(1, "ada".into()).await.unwrap();
        room.add_player(2, "bob".into()).await.unwrap();
        index.player_in_room.insert(1, room.room_id.clone());
        index.player_in_room.insert(2, room.room_id.clone());
        room.set_ready(1, true).await.unwrap();
        room.set_ready(2, true).await.unwrap();

        // One player leaves mid-game; the tick notices the dead game.
        room.remove_player(2).await.unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;

        let events = notify.take();
        assert!(events.iter().any(|e| matches!(e, Event::GameEnd(1, _))));
        assert!(index.rooms.is_empty());
        assert!(index.player_in_room.is_empty());
    }

    #[tokio::test]
    async fn add_player_is_idempotent() {
        let notify = RecordingNotify::default();
        let index = Arc::new(RoomIndex::default());
        let room = spawn_room(notify, index);

        room.add_player(1, "ada".into()).await.unwrap();
        let detail = room.add_player(1, "ada".into()).await.unwrap();
        assert_eq!(detail.current_players.len(), 1);
    }
}
