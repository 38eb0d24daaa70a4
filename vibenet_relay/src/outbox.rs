// The send seam between the matchmaking core and the connection registry.
//
// The core never owns sockets. Whenever the matchmaker or a room's relay
// wants to deliver a message it calls `Outbox::send`, which is
// fire-and-forget: no result, no waiting for delivery. A send to a handle the
// registry no longer knows (the peer is mid-disconnect) is simply lost; the
// registry's own `disconnected` event will arrive shortly and clean up.
//
// `server.rs` implements this for live WebSocket connections. Tests use
// `RecordingOutbox`, which keeps every send in order so scenarios can assert
// on exactly who was told what.

use vibenet_protocol::{ConnectionId, ServerMessage};

/// Fire-and-forget delivery of a message to one connection.
pub trait Outbox {
    fn send(&mut self, to: ConnectionId, msg: &ServerMessage);
}

/// An `Outbox` that records every send, in order.
#[derive(Debug, Default)]
pub struct RecordingOutbox {
    pub sent: Vec<(ConnectionId, ServerMessage)>,
}

impl RecordingOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages delivered to `to`, in order.
    pub fn to(&self, to: ConnectionId) -> Vec<&ServerMessage> {
        self.sent
            .iter()
            .filter(|(id, _)| *id == to)
            .map(|(_, msg)| msg)
            .collect()
    }

    /// Take everything recorded so far, leaving the outbox empty.
    pub fn drain(&mut self) -> Vec<(ConnectionId, ServerMessage)> {
        std::mem::take(&mut self.sent)
    }
}

impl Outbox for RecordingOutbox {
    fn send(&mut self, to: ConnectionId, msg: &ServerMessage) {
        self.sent.push((to, msg.clone()));
    }
}
