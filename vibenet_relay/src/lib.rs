// vibenet_relay: the VibeNet signaling relay.
//
// The relay pairs anonymous WebSocket clients two at a time and forwards
// WebRTC negotiation messages (offer, answer, candidates) plus chat between
// the members of each pair. It never inspects negotiation payloads and never
// carries media; once the peers are connected directly, the relay only
// matters again when one of them asks for a new partner or leaves.
//
// Module overview:
// - `matchmaker.rs`: waiting queue, block set, room table. Decides pairings
//                    and handles room splits. The core data structure that
//                    `server.rs` drives.
// - `relay.rs`:      Per-room router enforcing which role may send what.
// - `outbox.rs`:     The fire-and-forget send seam between the core and the
//                    live connections.
// - `server.rs`:     WebSocket listener, one task per connection, and the
//                    event loop that owns the `Matchmaker`.
// - `client.rs`:     Async test client.
//
// Dependencies: `vibenet_protocol` (wire types and JSON codec) and
// `vibenet_prng` (room id generation).
//
// The relay can run as a standalone binary (`main.rs`) or be embedded via
// the library API (`start_relay`).

pub mod client;
pub mod matchmaker;
pub mod outbox;
pub mod relay;
pub mod server;

pub use client::SignalClient;
pub use matchmaker::{BlockPolicy, Matchmaker, MatchmakerError};
pub use outbox::{Outbox, RecordingOutbox};
pub use relay::{DropReason, Forwarded, Relay};
pub use server::{RelayConfig, RelayError, RelayHandle, start_relay};
