// Matchmaker: waiting queue, block set, and room table.
//
// `Matchmaker` is the central data structure that `server.rs` drives. It
// decides which two connections become a room, creates the room's `Relay`,
// and handles the three ways a room ends:
//
// - `next_user`: either member asks for a new partner. Both get `nextuser`,
//   the pair is blocked from each other, and both are re-admitted (the
//   partner first, then the requester).
// - `leave`: a member ends the call with `deleteuser`. The partner is told
//   and re-admitted; the leaver goes idle until its socket closes.
// - `retire`: a member's socket closed. Same as `leave` from the partner's
//   point of view.
//
// Pairing (`admit`) scans the waiting queue for the first eligible candidate:
// not the handle itself, not the partner it just left, and not blocked. A
// fresh connection scans newest-first; a connection re-entering after a
// split scans oldest-first. The admitted handle becomes the room's sender,
// the candidate its receiver.
//
// All mutation happens through `&mut self` from the server's single event
// loop, so every operation is atomic with respect to every other one without
// internal locking. Delivery goes through the injected `Outbox` and never
// blocks.

use std::collections::{HashMap, HashSet, VecDeque};

use thiserror::Error;
use tracing::{debug, error, info, warn};
use vibenet_prng::RoomRng;
use vibenet_protocol::{ClientMessage, ConnectionId, Role, RoomId, ServerMessage, decode_client};

use crate::outbox::Outbox;
use crate::relay::{DropReason, Forwarded, Relay};

/// What happens to a handle's block-set entries when it disconnects.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BlockPolicy {
    /// Keep every entry for the life of the process.
    #[default]
    Retain,
    /// Drop the departing handle's entries and its appearances in other
    /// handles' sets. Handles are never reused, so this only frees memory.
    PruneOnDisconnect,
}

/// Internal consistency failures. Logged, repaired, never sent to clients.
#[derive(Debug, Error)]
pub enum MatchmakerError {
    #[error("{handle} is already in room {existing}; cannot also join room {incoming}")]
    InvariantViolation {
        handle: ConnectionId,
        existing: RoomId,
        incoming: RoomId,
    },
    #[error("{handle} is mapped to room {room}, which does not list it as a member")]
    StaleMembership { handle: ConnectionId, room: RoomId },
}

pub struct Matchmaker<O> {
    waiting: VecDeque<ConnectionId>,
    blocked: HashMap<ConnectionId, HashSet<ConnectionId>>,
    rooms: HashMap<RoomId, Relay>,
    membership: HashMap<ConnectionId, RoomId>,
    rng: RoomRng,
    block_policy: BlockPolicy,
    outbox: O,
}

impl<O: Outbox> Matchmaker<O> {
    pub fn new(outbox: O, seed: u64, block_policy: BlockPolicy) -> Self {
        Self {
            waiting: VecDeque::new(),
            blocked: HashMap::new(),
            rooms: HashMap::new(),
            membership: HashMap::new(),
            rng: RoomRng::new(seed),
            block_policy,
            outbox,
        }
    }

    /// Try to pair `handle`; queue it if nobody eligible is waiting.
    ///
    /// `previous_partner` is the handle it was just split from, if any.
    /// Returns the new room's id when a pairing was made. Admitting a handle
    /// that is already waiting or already in a room does nothing.
    pub fn admit(
        &mut self,
        handle: ConnectionId,
        previous_partner: Option<ConnectionId>,
    ) -> Option<RoomId> {
        if self.is_waiting(handle) || self.membership.contains_key(&handle) {
            warn!(conn = %handle, "duplicate admission ignored");
            return None;
        }

        match self.find_candidate(handle, previous_partner) {
            Some(index) => {
                let candidate = self.waiting.remove(index)?;
                Some(self.open_room(handle, candidate))
            }
            None => {
                self.waiting.push_back(handle);
                info!(conn = %handle, waiting = self.waiting.len(), "waiting for a partner");
                None
            }
        }
    }

    /// A connection closed. Safe to call for handles in any state, any
    /// number of times.
    pub fn retire(&mut self, handle: ConnectionId) {
        if let Some(index) = self.waiting.iter().position(|c| *c == handle) {
            self.waiting.remove(index);
            self.prune_blocks(handle);
            info!(conn = %handle, "retired while waiting");
            return;
        }

        let Some(room_id) = self.membership.get(&handle).copied() else {
            self.prune_blocks(handle);
            debug!(conn = %handle, "retire: not waiting or paired");
            return;
        };

        let notice = ClientMessage::DeleteUser {
            room_id: Some(room_id),
        };
        let Some(other) = self.split(handle, room_id, &notice) else {
            let err = MatchmakerError::StaleMembership {
                handle,
                room: room_id,
            };
            error!(error = %err, "dropping stale membership");
            self.membership.remove(&handle);
            self.prune_blocks(handle);
            return;
        };
        self.prune_blocks(handle);
        info!(conn = %handle, partner = %other, room = %room_id, "retired from room");
        self.admit(other, Some(handle));
    }

    /// Parse one raw inbound frame and dispatch it. Malformed input is
    /// dropped.
    pub fn on_message(&mut self, from: ConnectionId, raw: &str) {
        match decode_client(raw) {
            Ok(msg) => self.handle_message(from, msg),
            Err(e) => debug!(conn = %from, error = %e, "dropping malformed message"),
        }
    }

    /// Dispatch one parsed message: room-lifecycle types are handled here,
    /// everything else goes to the room's relay.
    pub fn handle_message(&mut self, from: ConnectionId, msg: ClientMessage) {
        match msg {
            ClientMessage::NextUser { room_id } => self.next_user(from, room_id),
            ClientMessage::DeleteUser { room_id } => self.leave(from, room_id),
            ClientMessage::Unknown => debug!(conn = %from, "dropping unrecognized message type"),
            msg => {
                self.route(from, &msg);
            }
        }
    }

    /// Forward a createoffer/createanswer/icecandidate/chat message to the
    /// relay of the room it names.
    ///
    /// `nextuser` and `deleteuser` change room membership and must go through
    /// `next_user`/`leave` (or `handle_message`); they are not routed here.
    pub fn route(&mut self, from: ConnectionId, msg: &ClientMessage) -> Forwarded {
        if matches!(
            msg,
            ClientMessage::NextUser { .. } | ClientMessage::DeleteUser { .. }
        ) {
            return Forwarded::Dropped(DropReason::Unrecognized);
        }
        let Some(room_id) = msg.room_id() else {
            return Forwarded::Dropped(DropReason::Unrecognized);
        };
        let Some(relay) = self.rooms.get(&room_id) else {
            debug!(conn = %from, room = %room_id, kind = msg.kind(), "no such room; dropping");
            return Forwarded::Dropped(DropReason::UnknownRoom);
        };
        relay.forward(from, msg, &mut self.outbox)
    }

    /// Split the room on request of one of its members and re-queue both.
    pub fn next_user(&mut self, handle: ConnectionId, room_id: RoomId) {
        let notice = ClientMessage::NextUser { room_id };
        let Some(other) = self.split(handle, room_id, &notice) else {
            debug!(conn = %handle, room = %room_id, "nextuser for a room it is not in; dropping");
            return;
        };
        info!(conn = %handle, partner = %other, room = %room_id, "split by nextuser");
        self.admit(other, Some(handle));
        self.admit(handle, Some(other));
    }

    /// End the call on request of one of its members. The partner is
    /// re-queued; `handle` is left idle.
    ///
    /// Clients normally name the room; if they don't, the room `handle` is
    /// currently in is used.
    pub fn leave(&mut self, handle: ConnectionId, room_id: Option<RoomId>) {
        let Some(room_id) = room_id.or_else(|| self.membership.get(&handle).copied()) else {
            debug!(conn = %handle, "deleteuser outside any room; dropping");
            return;
        };
        let notice = ClientMessage::DeleteUser {
            room_id: Some(room_id),
        };
        let Some(other) = self.split(handle, room_id, &notice) else {
            debug!(conn = %handle, room = %room_id, "deleteuser for a room it is not in; dropping");
            return;
        };
        info!(conn = %handle, partner = %other, room = %room_id, "left room");
        self.admit(other, Some(handle));
    }

    pub fn is_waiting(&self, handle: ConnectionId) -> bool {
        self.waiting.contains(&handle)
    }

    /// Snapshot of the waiting queue, oldest first.
    pub fn waiting(&self) -> Vec<ConnectionId> {
        self.waiting.iter().copied().collect()
    }

    pub fn room_of(&self, handle: ConnectionId) -> Option<RoomId> {
        self.membership.get(&handle).copied()
    }

    pub fn room(&self, room_id: RoomId) -> Option<&Relay> {
        self.rooms.get(&room_id)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_blocked(&self, a: ConnectionId, b: ConnectionId) -> bool {
        self.blocked.get(&a).is_some_and(|peers| peers.contains(&b))
    }

    /// Number of handles with at least one block entry.
    pub fn blocked_count(&self) -> usize {
        self.blocked.len()
    }

    pub fn outbox(&self) -> &O {
        &self.outbox
    }

    pub fn outbox_mut(&mut self) -> &mut O {
        &mut self.outbox
    }

    /// Index of the first eligible waiting candidate for `handle`.
    fn find_candidate(
        &self,
        handle: ConnectionId,
        previous_partner: Option<ConnectionId>,
    ) -> Option<usize> {
        let eligible = |c: &ConnectionId| {
            *c != handle && Some(*c) != previous_partner && !self.is_blocked(handle, *c)
        };
        if previous_partner.is_some() {
            self.waiting.iter().position(eligible)
        } else {
            self.waiting.iter().rposition(eligible)
        }
    }

    /// Register a new room and tell both members their roles.
    fn open_room(&mut self, sender: ConnectionId, receiver: ConnectionId) -> RoomId {
        let room_id = self.mint_room_id();

        for member in [sender, receiver] {
            if let Some(existing) = self.membership.get(&member).copied() {
                let err = MatchmakerError::InvariantViolation {
                    handle: member,
                    existing,
                    incoming: room_id,
                };
                error!(error = %err, "dropping stale room");
                self.discard_room(existing);
            }
        }

        self.rooms
            .insert(room_id, Relay::new(room_id, sender, receiver));
        self.membership.insert(sender, room_id);
        self.membership.insert(receiver, room_id);

        self.outbox.send(
            sender,
            &ServerMessage::Ownership {
                room_id,
                data: Role::Sender,
            },
        );
        self.outbox.send(
            receiver,
            &ServerMessage::Ownership {
                room_id,
                data: Role::Receiver,
            },
        );
        info!(room = %room_id, %sender, %receiver, rooms = self.rooms.len(), "paired");
        room_id
    }

    /// Deliver `notice` through the room's relay, then dissolve the room and
    /// block its two members from each other. Returns the member that is not
    /// `from`, or `None` (and changes nothing) if the room doesn't exist or
    /// `from` isn't in it.
    fn split(
        &mut self,
        from: ConnectionId,
        room_id: RoomId,
        notice: &ClientMessage,
    ) -> Option<ConnectionId> {
        let relay = self.rooms.get(&room_id)?;
        let other = relay.other(from)?;
        relay.forward(from, notice, &mut self.outbox);

        let mut relay = self.rooms.remove(&room_id)?;
        relay.dissolve();
        self.membership.remove(&from);
        self.membership.remove(&other);
        self.block(from, other);
        Some(other)
    }

    /// Remove a room without notifying anyone.
    fn discard_room(&mut self, room_id: RoomId) {
        if let Some(mut relay) = self.rooms.remove(&room_id) {
            relay.dissolve();
            for member in relay.members() {
                if self.membership.get(&member) == Some(&room_id) {
                    self.membership.remove(&member);
                }
            }
        }
    }

    fn block(&mut self, a: ConnectionId, b: ConnectionId) {
        self.blocked.entry(a).or_default().insert(b);
        self.blocked.entry(b).or_default().insert(a);
    }

    fn prune_blocks(&mut self, handle: ConnectionId) {
        if self.block_policy != BlockPolicy::PruneOnDisconnect {
            return;
        }
        let Some(peers) = self.blocked.remove(&handle) else {
            return;
        };
        for peer in peers {
            if let Some(set) = self.blocked.get_mut(&peer) {
                set.remove(&handle);
                if set.is_empty() {
                    self.blocked.remove(&peer);
                }
            }
        }
    }

    fn mint_room_id(&mut self) -> RoomId {
        loop {
            let id = RoomId::from_bytes(self.rng.next_uuid_v4());
            if !self.rooms.contains_key(&id) {
                return id;
            }
        }
    }
}
