// Per-room message router.
//
// A `Relay` is created the instant the matchmaker pairs two connections and
// lives exactly as long as the room. It records which member holds which
// negotiation role and enforces the direction/type table:
//
//   type          from sender            from receiver
//   createoffer   -> receiver            dropped
//   createanswer  dropped                -> sender
//   icecandidate  -> receiver            -> sender
//   chat          -> receiver            -> sender
//   nextuser      nextuser to both       nextuser to both
//   deleteuser    deleteuser to other    deleteuser to other
//
// Relayed payloads are copied across verbatim. Anything not in the table,
// anything from a non-member, anything naming a different room, and anything
// arriving after `dissolve()` is dropped and reported as such; nothing here
// ever fails loudly.
//
// The relay holds no buffers and no history. Lifecycle operations
// (removing the room, blocking, re-queueing) belong to `matchmaker.rs`; the
// relay only decides who receives what.

use tracing::debug;
use vibenet_protocol::{ClientMessage, ConnectionId, Role, RoomId, ServerMessage};

use crate::outbox::Outbox;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RelayState {
    Active,
    Dissolved,
}

/// What `Relay::forward` did with a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Forwarded {
    /// Sent to the other member.
    Delivered { to: ConnectionId },
    /// Sent to both members.
    Broadcast,
    Dropped(DropReason),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DropReason {
    /// The relay has already been dissolved.
    Dissolved,
    /// The sending connection is not a member of this room.
    NotMember,
    /// The message names a different room.
    WrongRoom,
    /// The type is not permitted from the sender's role.
    WrongRole,
    /// The type is not one the relay forwards.
    Unrecognized,
    /// No live room has this id (set by the matchmaker before any relay is
    /// consulted; usually a message racing a split).
    UnknownRoom,
}

#[derive(Debug)]
pub struct Relay {
    room_id: RoomId,
    sender: ConnectionId,
    receiver: ConnectionId,
    state: RelayState,
}

impl Relay {
    pub fn new(room_id: RoomId, sender: ConnectionId, receiver: ConnectionId) -> Self {
        Self {
            room_id,
            sender,
            receiver,
            state: RelayState::Active,
        }
    }

    pub fn room_id(&self) -> RoomId {
        self.room_id
    }

    pub fn sender(&self) -> ConnectionId {
        self.sender
    }

    pub fn receiver(&self) -> ConnectionId {
        self.receiver
    }

    pub fn state(&self) -> RelayState {
        self.state
    }

    /// Both members, sender first.
    pub fn members(&self) -> [ConnectionId; 2] {
        [self.sender, self.receiver]
    }

    pub fn role_of(&self, conn: ConnectionId) -> Option<Role> {
        if conn == self.sender {
            Some(Role::Sender)
        } else if conn == self.receiver {
            Some(Role::Receiver)
        } else {
            None
        }
    }

    /// The member that is not `conn`. `None` if `conn` is not a member.
    pub fn other(&self, conn: ConnectionId) -> Option<ConnectionId> {
        Some(self.holder(self.role_of(conn)?.opposite()))
    }

    /// The member holding `role`.
    fn holder(&self, role: Role) -> ConnectionId {
        match role {
            Role::Sender => self.sender,
            Role::Receiver => self.receiver,
        }
    }

    /// Move to the terminal state. Returns false if already dissolved.
    pub fn dissolve(&mut self) -> bool {
        if self.state == RelayState::Dissolved {
            return false;
        }
        self.state = RelayState::Dissolved;
        true
    }

    /// Route one message from `from` according to the direction/type table.
    pub fn forward(
        &self,
        from: ConnectionId,
        msg: &ClientMessage,
        out: &mut impl Outbox,
    ) -> Forwarded {
        let result = self.forward_inner(from, msg, out);
        debug!(
            conn = %from,
            room = %self.room_id,
            kind = msg.kind(),
            ?result,
            "relay forward"
        );
        result
    }

    fn forward_inner(
        &self,
        from: ConnectionId,
        msg: &ClientMessage,
        out: &mut impl Outbox,
    ) -> Forwarded {
        if self.state == RelayState::Dissolved {
            return Forwarded::Dropped(DropReason::Dissolved);
        }
        let Some(role) = self.role_of(from) else {
            return Forwarded::Dropped(DropReason::NotMember);
        };
        if msg.room_id().is_some_and(|id| id != self.room_id) {
            return Forwarded::Dropped(DropReason::WrongRoom);
        }
        let other = self.holder(role.opposite());
        let room_id = self.room_id;

        let outbound = match (msg, role) {
            (ClientMessage::CreateOffer { data, .. }, Role::Sender) => ServerMessage::CreateOffer {
                room_id,
                data: data.clone(),
            },
            (ClientMessage::CreateAnswer { data, .. }, Role::Receiver) => {
                ServerMessage::CreateAnswer {
                    room_id,
                    data: data.clone(),
                }
            }
            (ClientMessage::CreateOffer { .. }, Role::Receiver)
            | (ClientMessage::CreateAnswer { .. }, Role::Sender) => {
                return Forwarded::Dropped(DropReason::WrongRole);
            }
            (ClientMessage::IceCandidate { data, .. }, _) => ServerMessage::IceCandidate {
                room_id,
                data: data.clone(),
            },
            (ClientMessage::Chat { message, .. }, _) => ServerMessage::Chat {
                room_id,
                message: message.clone(),
            },
            (ClientMessage::NextUser { .. }, _) => {
                out.send(self.receiver, &ServerMessage::NextUser);
                out.send(self.sender, &ServerMessage::NextUser);
                return Forwarded::Broadcast;
            }
            (ClientMessage::DeleteUser { .. }, _) => ServerMessage::DeleteUser,
            (ClientMessage::Unknown, _) => return Forwarded::Dropped(DropReason::Unrecognized),
        };

        out.send(other, &outbound);
        Forwarded::Delivered { to: other }
    }
}
