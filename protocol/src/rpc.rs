//! Inter-service RPC types.
//!
//! The gateway, room service and match service talk JSON over HTTP. Request
//! and response bodies live here so both sides of every call share one
//! definition. Game-state shapes are reused from [`crate::wire`]; they derive
//! serde alongside their prost encoding.

use serde::{Deserialize, Serialize};

use crate::wire::{
    ErrorCode, GameAction, GameEndNotification, GameStartNotification, GameState,
    MatchResultNotify, Room, RoomDetail,
};

/// Identity handed to the room service when seating a player.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerInitData {
    pub player_id: u64,
    pub player_name: String,
}

// ============================================================================
// Room service
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRoomRpcRequest {
    pub player: PlayerInitData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRoomRpcResponse {
    pub ret: ErrorCode,
    pub room: Option<RoomDetail>,
}

/// Room creation on behalf of the match service: all paired players are
/// seated atomically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchCreateRoomRpcRequest {
    pub players: Vec<PlayerInitData>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinRoomRpcRequest {
    pub room_id: String,
    pub player: PlayerInitData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinRoomRpcResponse {
    pub ret: ErrorCode,
    pub room: Option<RoomDetail>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaveRoomRpcRequest {
    pub player_id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaveRoomRpcResponse {
    pub ret: ErrorCode,
    pub room_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetReadyRpcRequest {
    pub player_id: u64,
    pub is_ready: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetReadyRpcResponse {
    pub ret: ErrorCode,
    pub room_id: String,
}

/// The target room is resolved server-side from the player's membership,
/// not named by the caller; a gateway never learns the room id of a
/// match-seated player.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerActionRpcRequest {
    pub player_id: u64,
    pub action: GameAction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerActionRpcResponse {
    pub ret: ErrorCode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetRoomListRpcResponse {
    pub ret: ErrorCode,
    pub rooms: Vec<Room>,
}

// ============================================================================
// Match service
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartMatchRpcRequest {
    pub player: PlayerInitData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartMatchRpcResponse {
    pub ret: ErrorCode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelMatchRpcRequest {
    pub player_id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelMatchRpcResponse {
    pub ret: ErrorCode,
}

// ============================================================================
// Gateway notification endpoints
// ============================================================================

/// Every notify body names the user the gateway should route to; delivery is
/// best effort and the caller drops on `NotFound`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomStatusNotifyRpc {
    pub be_notified_uid: u64,
    pub room: RoomDetail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameStateNotifyRpc {
    pub be_notified_uid: u64,
    pub room_id: String,
    pub state: GameState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerActionNotifyRpc {
    pub be_notified_uid: u64,
    pub room_id: String,
    pub action: GameAction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameStartNotifyRpc {
    pub be_notified_uid: u64,
    pub start: GameStartNotification,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameEndNotifyRpc {
    pub be_notified_uid: u64,
    pub end: GameEndNotification,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchResultNotifyRpc {
    pub be_notified_uid: u64,
    pub result: MatchResultNotify,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyRpcResponse {
    pub ret: ErrorCode,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{ActionType, CharacterMoveAction, game_action};

    #[test]
    fn action_rpc_json_roundtrip() {
        let req = PlayerActionRpcRequest {
            player_id: 3,
            action: GameAction {
                player_id: 3,
                action_type: ActionType::CharMove as i32,
                timestamp: 12345,
                detail: Some(game_action::Detail::CharMove(CharacterMoveAction {
                    from_x: 0,
                    from_y: 0,
                    to_x: 4,
                    to_y: 9,
                })),
            },
        };
        let json = serde_json::to_string(&req).unwrap();
        let back: PlayerActionRpcRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(back.action.char_move().unwrap().to_y, 9);
    }

    #[test]
    fn error_code_serialises_by_name() {
        let json = serde_json::to_string(&ErrorCode::NotYourTurn).unwrap();
        assert_eq!(json, "\"NotYourTurn\"");
    }
}
