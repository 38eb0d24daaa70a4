// The signaling vocabulary, one enum per direction:
// - `ClientMessage`: browser -> relay.
// - `ServerMessage`: relay -> browser.
//
// Every wire message is a flat JSON object tagged by its `type` field, such as
// `{"type":"chat","Roomid":"…","message":"hi"}`. The room id travels in a
// field literally named `Roomid`, matching the deployed clients; `roomId` is
// accepted as an input alias.
//
// Negotiation payloads (`data` on createoffer/createanswer/icecandidate) are
// held as `Payload`, the exact source text of the JSON value. The relay never
// parses them, so key order, number spelling, and precision survive the trip
// byte for byte.
//
// Encoding uses serde's internally tagged derive. Decoding goes through a flat
// `Envelope` struct first: serde buffers internally tagged input into its own
// value tree before picking a variant, and raw JSON text does not survive that
// buffering.
//
// Unrecognized `type` values decode to `ClientMessage::Unknown` rather than
// failing, so a newer client speaking extra message types is tolerated.

use std::fmt;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use serde_json::value::RawValue;

use crate::error::ProtocolError;
use crate::types::{Role, RoomId};

/// An opaque JSON value, kept as the exact text it arrived as.
#[derive(Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(Box<RawValue>);

impl Payload {
    /// Wrap JSON text verbatim. Fails if `text` is not a single JSON value.
    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        Ok(Self(RawValue::from_string(text.to_owned())?))
    }

    /// Compact encoding of an in-memory value.
    pub fn from_value(value: &Value) -> Result<Self, ProtocolError> {
        Ok(Self(serde_json::value::to_raw_value(value)?))
    }

    /// The JSON text, exactly as received.
    pub fn as_str(&self) -> &str {
        self.0.get()
    }
}

/// Byte equality of the JSON text: `{"a":1,"b":2}` and `{"b":2,"a":1}` differ.
impl PartialEq for Payload {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Eq for Payload {}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Payload({})", self.as_str())
    }
}

/// Inbound frames, as parsed from a client.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    /// Negotiation offer. Accepted only from the room's sender.
    CreateOffer {
        #[serde(rename = "Roomid")]
        room_id: RoomId,
        #[serde(skip_serializing_if = "Option::is_none")]
        data: Option<Payload>,
    },
    /// Negotiation answer. Accepted only from the room's receiver.
    CreateAnswer {
        #[serde(rename = "Roomid")]
        room_id: RoomId,
        #[serde(skip_serializing_if = "Option::is_none")]
        data: Option<Payload>,
    },
    /// Connectivity candidate, either direction.
    IceCandidate {
        #[serde(rename = "Roomid")]
        room_id: RoomId,
        #[serde(skip_serializing_if = "Option::is_none")]
        data: Option<Payload>,
    },
    /// Free-text chat line, either direction.
    Chat {
        #[serde(rename = "Roomid")]
        room_id: RoomId,
        message: String,
    },
    /// Abandon the current partner and re-enter the waiting queue.
    NextUser {
        #[serde(rename = "Roomid")]
        room_id: RoomId,
    },
    /// End the call. The partner is told and re-queued; the sender is not.
    DeleteUser {
        #[serde(rename = "Roomid", skip_serializing_if = "Option::is_none")]
        room_id: Option<RoomId>,
    },
    /// Any `type` this relay does not know.
    Unknown,
}

impl ClientMessage {
    /// The wire `type` literal for this message.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::CreateOffer { .. } => "createoffer",
            ClientMessage::CreateAnswer { .. } => "createanswer",
            ClientMessage::IceCandidate { .. } => "icecandidate",
            ClientMessage::Chat { .. } => "chat",
            ClientMessage::NextUser { .. } => "nextuser",
            ClientMessage::DeleteUser { .. } => "deleteuser",
            ClientMessage::Unknown => "unknown",
        }
    }

    /// The room this message names, if any.
    pub fn room_id(&self) -> Option<RoomId> {
        match self {
            ClientMessage::CreateOffer { room_id, .. }
            | ClientMessage::CreateAnswer { room_id, .. }
            | ClientMessage::IceCandidate { room_id, .. }
            | ClientMessage::Chat { room_id, .. }
            | ClientMessage::NextUser { room_id } => Some(*room_id),
            ClientMessage::DeleteUser { room_id } => *room_id,
            ClientMessage::Unknown => None,
        }
    }
}

/// Outbound frames, as written to a client.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    /// Sent once, right after the socket is accepted. Advisory only.
    Connected { message: String },
    /// A pairing was made; tells this member its room and role.
    Ownership {
        #[serde(rename = "Roomid")]
        room_id: RoomId,
        data: Role,
    },
    /// Relayed offer from the sender.
    CreateOffer {
        #[serde(rename = "Roomid")]
        room_id: RoomId,
        #[serde(skip_serializing_if = "Option::is_none")]
        data: Option<Payload>,
    },
    /// Relayed answer from the receiver.
    CreateAnswer {
        #[serde(rename = "Roomid")]
        room_id: RoomId,
        #[serde(skip_serializing_if = "Option::is_none")]
        data: Option<Payload>,
    },
    /// Relayed connectivity candidate.
    IceCandidate {
        #[serde(rename = "Roomid")]
        room_id: RoomId,
        #[serde(skip_serializing_if = "Option::is_none")]
        data: Option<Payload>,
    },
    /// Relayed chat line.
    Chat {
        #[serde(rename = "Roomid")]
        room_id: RoomId,
        message: String,
    },
    /// The room was split by `nextuser`; sent to both former members.
    NextUser,
    /// The partner left (disconnect or end-call).
    DeleteUser,
}

/// Greeting text carried by `ServerMessage::Connected`.
pub const CONNECTED_GREETING: &str = "You are connected to the server";

/// Every field any message may carry, before the `type` is looked at.
#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(rename = "Roomid", alias = "roomId", default)]
    room_id: Option<RoomId>,
    #[serde(default)]
    data: Option<Payload>,
    #[serde(default)]
    message: Option<String>,
}

impl Envelope {
    fn require_room<E: serde::de::Error>(&self) -> Result<RoomId, E> {
        self.room_id.ok_or_else(|| E::missing_field("Roomid"))
    }
}

impl<'de> Deserialize<'de> for ClientMessage {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let env = Envelope::deserialize(deserializer)?;
        Ok(match env.kind.as_str() {
            "createoffer" => ClientMessage::CreateOffer {
                room_id: env.require_room()?,
                data: env.data,
            },
            "createanswer" => ClientMessage::CreateAnswer {
                room_id: env.require_room()?,
                data: env.data,
            },
            "icecandidate" => ClientMessage::IceCandidate {
                room_id: env.require_room()?,
                data: env.data,
            },
            "chat" => ClientMessage::Chat {
                room_id: env.require_room()?,
                message: env.message.unwrap_or_default(),
            },
            "nextuser" => ClientMessage::NextUser {
                room_id: env.require_room()?,
            },
            "deleteuser" => ClientMessage::DeleteUser {
                room_id: env.room_id,
            },
            _ => ClientMessage::Unknown,
        })
    }
}

const SERVER_TYPES: &[&str] = &[
    "connected",
    "ownership",
    "createoffer",
    "createanswer",
    "icecandidate",
    "chat",
    "nextuser",
    "deleteuser",
];

impl<'de> Deserialize<'de> for ServerMessage {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let env = Envelope::deserialize(deserializer)?;
        Ok(match env.kind.as_str() {
            "connected" => ServerMessage::Connected {
                message: env.message.unwrap_or_default(),
            },
            "ownership" => {
                let room_id = env.require_room()?;
                let data = env.data.ok_or_else(|| D::Error::missing_field("data"))?;
                let role = serde_json::from_str(data.as_str()).map_err(D::Error::custom)?;
                ServerMessage::Ownership {
                    room_id,
                    data: role,
                }
            }
            "createoffer" => ServerMessage::CreateOffer {
                room_id: env.require_room()?,
                data: env.data,
            },
            "createanswer" => ServerMessage::CreateAnswer {
                room_id: env.require_room()?,
                data: env.data,
            },
            "icecandidate" => ServerMessage::IceCandidate {
                room_id: env.require_room()?,
                data: env.data,
            },
            "chat" => ServerMessage::Chat {
                room_id: env.require_room()?,
                message: env.message.unwrap_or_default(),
            },
            "nextuser" => ServerMessage::NextUser,
            "deleteuser" => ServerMessage::DeleteUser,
            other => return Err(D::Error::unknown_variant(other, SERVER_TYPES)),
        })
    }
}
