//! Client wire protocol.
//!
//! Every client-facing message is a length-framed [`Envelope`] whose `data`
//! field carries the prost-encoded payload selected by `id`. Requests are
//! numbered by the client; responses echo `id + 1` and the same serial so the
//! client can correlate. Message types double as the JSON bodies of the
//! inter-service RPC layer, so the shared shapes also derive serde.

use prost::Message;
use serde::{Deserialize, Serialize};

/// Serial number used for server-initiated notifications.
pub const NOTIFICATION_SERIAL: i32 = -1;

/// Message ids carried in the envelope. Response id is always request id + 1.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration, Serialize, Deserialize,
)]
#[repr(i32)]
pub enum MsgId {
    Unknown = 0,

    AuthRequest = 1,
    AuthResponse = 2,
    GetUserInfoRequest = 3,
    GetUserInfoResponse = 4,

    CreateRoomRequest = 11,
    CreateRoomResponse = 12,
    JoinRoomRequest = 13,
    JoinRoomResponse = 14,
    LeaveRoomRequest = 15,
    LeaveRoomResponse = 16,
    GetRoomListRequest = 17,
    GetRoomListResponse = 18,
    GetReadyRequest = 19,
    GetReadyResponse = 20,
    GameActionRequest = 21,
    GameActionResponse = 22,

    MatchRequest = 31,
    MatchResponse = 32,
    CancelMatchRequest = 33,
    CancelMatchResponse = 34,

    RoomStateNotification = 101,
    GameStateNotification = 102,
    GameActionNotification = 103,
    GameStartNotification = 104,
    GameEndNotification = 105,
    MatchResultNotification = 106,
}

/// Result codes shared by the client wire and the inter-service RPC layer.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, prost::Enumeration, Serialize, Deserialize,
)]
#[repr(i32)]
pub enum ErrorCode {
    Ok = 0,
    InvalidParam = 1,
    InvalidAction = 2,
    InvalidUser = 3,
    InvalidRoom = 4,
    InvalidCard = 5,
    InvalidOrder = 6,
    InvalidState = 7,
    NotYourTurn = 8,
    NotFound = 9,
    AuthFailed = 10,
    PlayerAlreadyInRoom = 11,
    AlreadyExists = 12,
    Timeout = 13,
    ServerError = 14,
}

/// Game action discriminator.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, prost::Enumeration, Serialize, Deserialize,
)]
#[repr(i32)]
pub enum ActionType {
    Unspecified = 0,
    PlaceCard = 1,
    SkipTurn = 2,
    CharMove = 3,
    Surrender = 4,
}

/// Self-describing record exchanged on the socket, inside the length framing.
#[derive(Clone, PartialEq, Message)]
pub struct Envelope {
    /// Opaque client identifier, echoed back in responses.
    #[prost(string, tag = "1")]
    pub client_id: String,
    /// Request serial assigned by the client; notifications use -1.
    #[prost(int32, tag = "2")]
    pub msg_serial_no: i32,
    #[prost(enumeration = "MsgId", tag = "3")]
    pub id: i32,
    /// Payload encoded per `id`.
    #[prost(bytes = "vec", tag = "4")]
    pub data: Vec<u8>,
}

impl Envelope {
    /// Build the response envelope for a request: id + 1, same serial and
    /// client id.
    pub fn response_to(request: &Envelope, data: Vec<u8>) -> Envelope {
        Envelope {
            client_id: request.client_id.clone(),
            msg_serial_no: request.msg_serial_no,
            id: request.id + 1,
            data,
        }
    }

    /// Build a server-initiated notification envelope.
    pub fn notification(id: MsgId, data: Vec<u8>) -> Envelope {
        Envelope {
            client_id: String::new(),
            msg_serial_no: NOTIFICATION_SERIAL,
            id: id as i32,
            data,
        }
    }
}

// ============================================================================
// Auth and user info
// ============================================================================

#[derive(Clone, PartialEq, Message)]
pub struct AuthRequest {
    /// Session token minted by the identity service.
    #[prost(string, tag = "1")]
    pub token: String,
    #[prost(bool, tag = "2")]
    pub is_guest: bool,
}

#[derive(Clone, PartialEq, Message)]
pub struct AuthResponse {
    #[prost(enumeration = "ErrorCode", tag = "1")]
    pub ret: i32,
    #[prost(uint64, tag = "2")]
    pub uid: u64,
    #[prost(string, tag = "3")]
    pub conn_id: String,
    #[prost(string, tag = "4")]
    pub nickname: String,
    #[prost(int32, tag = "5")]
    pub level: i32,
    #[prost(int64, tag = "6")]
    pub exp: i64,
    #[prost(int64, tag = "7")]
    pub gold: i64,
    #[prost(int64, tag = "8")]
    pub diamond: i64,
    #[prost(bool, tag = "9")]
    pub is_guest: bool,
    #[prost(int64, tag = "10")]
    pub session_expiry: i64,
    #[prost(string, tag = "11")]
    pub error_msg: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct GetUserInfoRequest {}

#[derive(Clone, PartialEq, Message)]
pub struct GetUserInfoResponse {
    #[prost(enumeration = "ErrorCode", tag = "1")]
    pub ret: i32,
    #[prost(uint64, tag = "2")]
    pub uid: u64,
    #[prost(string, tag = "3")]
    pub nickname: String,
    #[prost(int32, tag = "4")]
    pub level: i32,
    #[prost(int64, tag = "5")]
    pub exp: i64,
    #[prost(int64, tag = "6")]
    pub gold: i64,
    #[prost(int64, tag = "7")]
    pub diamond: i64,
}

// ============================================================================
// Rooms
// ============================================================================

#[derive(Clone, PartialEq, Message, Serialize, Deserialize)]
pub struct Room {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(string, tag = "2")]
    pub name: String,
    #[prost(int32, tag = "3")]
    pub max_players: i32,
    #[prost(int32, tag = "4")]
    pub current_players: i32,
}

/// Per-member snapshot inside a room detail.
#[derive(Clone, PartialEq, Message, Serialize, Deserialize)]
pub struct RoomPlayer {
    #[prost(uint64, tag = "1")]
    pub uid: u64,
    #[prost(string, tag = "2")]
    pub name: String,
    #[prost(int32, tag = "3")]
    pub position_x: i32,
    #[prost(int32, tag = "4")]
    pub position_y: i32,
    #[prost(bool, tag = "5")]
    pub is_ready: bool,
}

/// Membership snapshot broadcast on every room change.
#[derive(Clone, PartialEq, Message, Serialize, Deserialize)]
pub struct RoomDetail {
    #[prost(message, optional, tag = "1")]
    pub room: Option<Room>,
    #[prost(message, repeated, tag = "2")]
    pub current_players: Vec<RoomPlayer>,
}

#[derive(Clone, PartialEq, Message)]
pub struct CreateRoomRequest {
    #[prost(string, tag = "1")]
    pub name: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct CreateRoomResponse {
    #[prost(enumeration = "ErrorCode", tag = "1")]
    pub ret: i32,
    #[prost(message, optional, tag = "2")]
    pub room: Option<RoomDetail>,
}

#[derive(Clone, PartialEq, Message)]
pub struct JoinRoomRequest {
    #[prost(string, tag = "1")]
    pub room_id: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct JoinRoomResponse {
    #[prost(enumeration = "ErrorCode", tag = "1")]
    pub ret: i32,
    #[prost(message, optional, tag = "2")]
    pub room: Option<RoomDetail>,
}

#[derive(Clone, PartialEq, Message)]
pub struct LeaveRoomRequest {}

#[derive(Clone, PartialEq, Message)]
pub struct LeaveRoomResponse {
    #[prost(enumeration = "ErrorCode", tag = "1")]
    pub ret: i32,
    #[prost(string, tag = "2")]
    pub room_id: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct GetRoomListRequest {}

#[derive(Clone, PartialEq, Message)]
pub struct GetRoomListResponse {
    #[prost(enumeration = "ErrorCode", tag = "1")]
    pub ret: i32,
    #[prost(message, repeated, tag = "2")]
    pub rooms: Vec<Room>,
}

#[derive(Clone, PartialEq, Message)]
pub struct GetReadyRequest {
    #[prost(bool, tag = "1")]
    pub is_ready: bool,
}

#[derive(Clone, PartialEq, Message)]
pub struct GetReadyResponse {
    #[prost(enumeration = "ErrorCode", tag = "1")]
    pub ret: i32,
    #[prost(string, tag = "2")]
    pub room_id: String,
}

// ============================================================================
// Game actions
// ============================================================================

#[derive(Clone, PartialEq, Message, Serialize, Deserialize)]
pub struct PlaceCardAction {
    /// Index into the acting player's hand.
    #[prost(int32, tag = "1")]
    pub card_id: i32,
    /// Insertion point on the table; past-the-end appends.
    #[prost(int32, tag = "2")]
    pub target_index: i32,
}

#[derive(Clone, PartialEq, Message, Serialize, Deserialize)]
pub struct CharacterMoveAction {
    #[prost(int32, tag = "1")]
    pub from_x: i32,
    #[prost(int32, tag = "2")]
    pub from_y: i32,
    #[prost(int32, tag = "3")]
    pub to_x: i32,
    #[prost(int32, tag = "4")]
    pub to_y: i32,
}

#[derive(Clone, PartialEq, Message, Serialize, Deserialize)]
pub struct GameAction {
    #[prost(uint64, tag = "1")]
    pub player_id: u64,
    #[prost(enumeration = "ActionType", tag = "2")]
    pub action_type: i32,
    /// Milliseconds since the Unix epoch.
    #[prost(int64, tag = "3")]
    pub timestamp: i64,
    #[prost(oneof = "game_action::Detail", tags = "4, 5")]
    pub detail: Option<game_action::Detail>,
}

pub mod game_action {
    use serde::{Deserialize, Serialize};

    #[derive(Clone, PartialEq, prost::Oneof, Serialize, Deserialize)]
    pub enum Detail {
        #[prost(message, tag = "4")]
        PlaceCard(super::PlaceCardAction),
        #[prost(message, tag = "5")]
        CharMove(super::CharacterMoveAction),
    }
}

impl GameAction {
    /// The place-card detail, when this action carries one.
    pub fn place_card(&self) -> Option<&PlaceCardAction> {
        match &self.detail {
            Some(game_action::Detail::PlaceCard(p)) => Some(p),
            _ => None,
        }
    }

    /// The character-move detail, when this action carries one.
    pub fn char_move(&self) -> Option<&CharacterMoveAction> {
        match &self.detail {
            Some(game_action::Detail::CharMove(m)) => Some(m),
            _ => None,
        }
    }
}

#[derive(Clone, PartialEq, Message)]
pub struct GameActionRequest {
    #[prost(message, optional, tag = "1")]
    pub action: Option<GameAction>,
}

#[derive(Clone, PartialEq, Message)]
pub struct GameActionResponse {
    #[prost(enumeration = "ErrorCode", tag = "1")]
    pub ret: i32,
}

// ============================================================================
// Game state
// ============================================================================

#[derive(Clone, PartialEq, Message, Serialize, Deserialize)]
pub struct WordCard {
    #[prost(string, tag = "1")]
    pub word: String,
    /// Part-of-speech tag used by the grammar check.
    #[prost(string, tag = "2")]
    pub word_class: String,
}

#[derive(Clone, PartialEq, Message, Serialize, Deserialize)]
pub struct CardTable {
    #[prost(message, repeated, tag = "1")]
    pub cards: Vec<WordCard>,
    /// Concatenation of the table words, for display.
    #[prost(string, tag = "2")]
    pub sentence: String,
}

#[derive(Clone, PartialEq, Message, Serialize, Deserialize)]
pub struct GamePlayer {
    #[prost(uint64, tag = "1")]
    pub id: u64,
    #[prost(string, tag = "2")]
    pub name: String,
    #[prost(int32, tag = "3")]
    pub current_score: i32,
    #[prost(message, repeated, tag = "4")]
    pub cards: Vec<WordCard>,
}

#[derive(Clone, PartialEq, Message, Serialize, Deserialize)]
pub struct GameState {
    /// Index into `players` of the player whose turn it is.
    #[prost(int32, tag = "1")]
    pub current_turn: i32,
    #[prost(message, repeated, tag = "2")]
    pub players: Vec<GamePlayer>,
    #[prost(message, optional, tag = "3")]
    pub card_table: Option<CardTable>,
}

// ============================================================================
// Notifications
// ============================================================================

#[derive(Clone, PartialEq, Message, Serialize, Deserialize)]
pub struct GameStateNotify {
    #[prost(string, tag = "1")]
    pub room_id: String,
    #[prost(message, optional, tag = "2")]
    pub state: Option<GameState>,
}

#[derive(Clone, PartialEq, Message, Serialize, Deserialize)]
pub struct PlayerActionNotify {
    #[prost(string, tag = "1")]
    pub room_id: String,
    #[prost(uint64, tag = "2")]
    pub player_id: u64,
    #[prost(message, optional, tag = "3")]
    pub action: Option<GameAction>,
}

#[derive(Clone, PartialEq, Message, Serialize, Deserialize)]
pub struct GameStartNotification {
    #[prost(string, tag = "1")]
    pub room_id: String,
    #[prost(message, repeated, tag = "2")]
    pub players: Vec<RoomPlayer>,
}

#[derive(Clone, PartialEq, Message, Serialize, Deserialize)]
pub struct GameEndNotification {
    #[prost(string, tag = "1")]
    pub room_id: String,
    /// Final per-player standings.
    #[prost(message, repeated, tag = "2")]
    pub players: Vec<GamePlayer>,
}

#[derive(Clone, PartialEq, Message, Serialize, Deserialize)]
pub struct MatchResultNotify {
    #[prost(enumeration = "ErrorCode", tag = "1")]
    pub ret: i32,
    /// Present on success: the room the player was placed into.
    #[prost(message, optional, tag = "2")]
    pub room: Option<RoomDetail>,
}

// ============================================================================
// Matchmaking requests
// ============================================================================

#[derive(Clone, PartialEq, Message)]
pub struct MatchRequest {}

#[derive(Clone, PartialEq, Message)]
pub struct MatchResponse {
    #[prost(enumeration = "ErrorCode", tag = "1")]
    pub ret: i32,
}

#[derive(Clone, PartialEq, Message)]
pub struct CancelMatchRequest {}

#[derive(Clone, PartialEq, Message)]
pub struct CancelMatchResponse {
    #[prost(enumeration = "ErrorCode", tag = "1")]
    pub ret: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_roundtrip() {
        let env = Envelope {
            client_id: "c1".into(),
            msg_serial_no: 7,
            id: MsgId::AuthRequest as i32,
            data: vec![1, 2, 3],
        };
        let bytes = env.encode_to_vec();
        let decoded = Envelope::decode(bytes.as_slice()).unwrap();
        assert_eq!(decoded, env);
    }

    #[test]
    fn response_pairs_with_request() {
        let req = Envelope {
            client_id: "c1".into(),
            msg_serial_no: 42,
            id: MsgId::JoinRoomRequest as i32,
            data: vec![],
        };
        let resp = Envelope::response_to(&req, vec![]);
        assert_eq!(resp.id, MsgId::JoinRoomResponse as i32);
        assert_eq!(resp.msg_serial_no, 42);
        assert_eq!(resp.client_id, "c1");
    }

    #[test]
    fn notification_serial_is_reserved() {
        let env = Envelope::notification(MsgId::GameStateNotification, vec![]);
        assert_eq!(env.msg_serial_no, NOTIFICATION_SERIAL);
        assert_eq!(env.id, MsgId::GameStateNotification as i32);
    }

    #[test]
    fn action_detail_accessors() {
        let action = GameAction {
            player_id: 9,
            action_type: ActionType::PlaceCard as i32,
            timestamp: 0,
            detail: Some(game_action::Detail::PlaceCard(PlaceCardAction {
                card_id: 2,
                target_index: 0,
            })),
        };
        assert_eq!(action.place_card().unwrap().card_id, 2);
        assert!(action.char_move().is_none());
    }
}
