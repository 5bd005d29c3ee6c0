//! Shared protocol for the word-card backend: the client wire envelope and
//! payloads, socket framing, and the JSON types of the inter-service RPC
//! layer.

pub mod framing;
pub mod rpc;
pub mod wire;

pub use framing::{frame_message, FrameBuffer, FramingError, MAX_FRAME_SIZE};
pub use wire::{ActionType, Envelope, ErrorCode, MsgId};
