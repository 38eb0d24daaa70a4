// Errors produced while decoding or encoding wire messages.
//
// The relay treats every `ProtocolError` on inbound traffic as "malformed
// input": the frame is logged and dropped, never echoed back to the client
// and never a reason to close the socket.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("message too large: {len} bytes (max {})", crate::codec::MAX_MESSAGE_SIZE)]
    TooLarge { len: usize },
    #[error("invalid JSON message: {0}")]
    Json(#[from] serde_json::Error),
}
