// vibenet_protocol: wire protocol for the VibeNet signaling relay.
//
// This crate defines the message types and JSON codec used by the relay
// (`vibenet_relay`) and its clients. It has no networking code; the relay
// carries these messages as WebSocket text frames.
//
// Module overview:
// - `types.rs`:    `ConnectionId`, `RoomId` (UUID v4), `Role`.
// - `message.rs`:  `ClientMessage` and `ServerMessage`, internally tagged on
//                  the JSON `type` field.
// - `codec.rs`:    One text frame <-> one typed message, with a size cap.
// - `error.rs`:    `ProtocolError`.
//
// Design decisions:
// - **Closed message enums.** Every `type` value gets a variant; unknown types
//   land in `ClientMessage::Unknown` so callers match exhaustively and drop.
// - **Opaque negotiation payloads.** Offer/answer/candidate bodies are
//   `Payload`, the raw JSON text. The relay forwards it and never parses it.

pub mod codec;
pub mod error;
pub mod message;
pub mod types;

pub use codec::{MAX_MESSAGE_SIZE, decode_client, decode_server, encode_client, encode_server};
pub use error::ProtocolError;
pub use message::{CONNECTED_GREETING, ClientMessage, Payload, ServerMessage};
pub use types::{ConnectionId, InvalidRoomId, Role, RoomId};
