// Core ID types for the signaling protocol.
//
// `ConnectionId` is the relay-assigned handle for one live socket; it never
// crosses the wire. `RoomId` is a UUID v4 minted by the matchmaker and shared
// with both members in the `ownership` message; clients echo it back in the
// `Roomid` field of every room-scoped message. `Role` is the negotiation role
// a member holds within its room.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Relay-assigned connection handle. Monotonic, never reused in a process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// A room identifier: 128 bits laid out as an RFC 4122 UUID.
///
/// Serialized as the 8-4-4-4-12 lowercase hex string. Parsing accepts the
/// same form (hyphens optional, either case); anything else fails, which
/// makes the enclosing message malformed.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoomId([u8; 16]);

impl RoomId {
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }
}

/// Error returned when a string is not a valid room id.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("invalid room id")]
pub struct InvalidRoomId;

impl FromStr for RoomId {
    type Err = InvalidRoomId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex: String = s.chars().filter(|c| *c != '-').collect();
        if hex.len() != 32 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(InvalidRoomId);
        }
        let value = u128::from_str_radix(&hex, 16).map_err(|_| InvalidRoomId)?;
        Ok(Self(value.to_be_bytes()))
    }
}

impl Serialize for RoomId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for RoomId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl fmt::Debug for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RoomId({self})")
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let n = u128::from_be_bytes(self.0);
        write!(
            f,
            "{:08x}-{:04x}-{:04x}-{:04x}-{:012x}",
            n >> 96,
            (n >> 80) & 0xffff,
            (n >> 64) & 0xffff,
            (n >> 48) & 0xffff,
            n & 0xffff_ffff_ffff,
        )
    }
}

/// Negotiation role within a room.
///
/// Only the `Sender` may originate `createoffer`; only the `Receiver` may
/// originate `createanswer`. The receiver literal on the wire is `"reciever"`,
/// which deployed clients compare against; `"receiver"` is accepted on input.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "sender")]
    Sender,
    #[serde(rename = "reciever", alias = "receiver")]
    Receiver,
}

impl Role {
    /// The role held by the other member of the room.
    pub fn opposite(self) -> Self {
        match self {
            Role::Sender => Role::Receiver,
            Role::Receiver => Role::Sender,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Sender => f.write_str("sender"),
            Role::Receiver => f.write_str("receiver"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_id_display_is_hyphenated_lowercase() {
        let id = RoomId::from_bytes([
            0xDE, 0xAD, 0xBE, 0xEF, 0x00, 0x01, 0x42, 0x02, 0x83, 0x04, 0x0A, 0x0B, 0x0C, 0x0D,
            0x0E, 0x0F,
        ]);
        assert_eq!(id.to_string(), "deadbeef-0001-4202-8304-0a0b0c0d0e0f");
    }

    #[test]
    fn room_id_parses_its_own_display() {
        let id = RoomId::from_bytes([7; 16]);
        let parsed: RoomId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn room_id_parse_accepts_uppercase_and_no_hyphens() {
        let parsed: RoomId = "DEADBEEF0001420283040A0B0C0D0E0F".parse().unwrap();
        assert_eq!(parsed.to_string(), "deadbeef-0001-4202-8304-0a0b0c0d0e0f");
    }

    #[test]
    fn room_id_parse_rejects_garbage() {
        assert!("not-a-room".parse::<RoomId>().is_err());
        assert!("".parse::<RoomId>().is_err());
        // 32 bytes but multibyte chars must not panic on slicing.
        assert!("é".repeat(16).parse::<RoomId>().is_err());
        assert!("zzzzzzzz-zzzz-zzzz-zzzz-zzzzzzzzzzzz".parse::<RoomId>().is_err());
    }

    #[test]
    fn role_wire_literals() {
        assert_eq!(serde_json::to_string(&Role::Sender).unwrap(), r#""sender""#);
        assert_eq!(
            serde_json::to_string(&Role::Receiver).unwrap(),
            r#""reciever""#
        );
        let alt: Role = serde_json::from_str(r#""receiver""#).unwrap();
        assert_eq!(alt, Role::Receiver);
    }

    #[test]
    fn role_opposite() {
        assert_eq!(Role::Sender.opposite(), Role::Receiver);
        assert_eq!(Role::Receiver.opposite(), Role::Sender);
    }
}
