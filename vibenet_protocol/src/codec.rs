// JSON text-frame codec.
//
// The transport (WebSocket) already delimits messages, so this module only
// converts between one text frame and one typed message. `decode_*` enforce
// `MAX_MESSAGE_SIZE` before touching serde so an oversized frame is rejected
// without being parsed. The same limit is handed to the WebSocket layer as its
// maximum message size, so in practice the check here only matters for
// callers that feed text in from elsewhere (tests, alternative transports).

use crate::error::ProtocolError;
use crate::message::{ClientMessage, ServerMessage};

/// Maximum accepted frame size (256 KB). Session descriptions with many
/// codecs and candidates are the largest legitimate payloads and stay well
/// under this.
pub const MAX_MESSAGE_SIZE: usize = 256 * 1024;

/// Parse one inbound text frame.
pub fn decode_client(raw: &str) -> Result<ClientMessage, ProtocolError> {
    check_len(raw)?;
    Ok(serde_json::from_str(raw)?)
}

/// Encode one outbound message as a text frame.
pub fn encode_server(msg: &ServerMessage) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(msg)?)
}

/// Parse a relay-to-client frame (client side).
pub fn decode_server(raw: &str) -> Result<ServerMessage, ProtocolError> {
    check_len(raw)?;
    Ok(serde_json::from_str(raw)?)
}

/// Encode a client-to-relay frame (client side).
pub fn encode_client(msg: &ClientMessage) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(msg)?)
}

fn check_len(raw: &str) -> Result<(), ProtocolError> {
    if raw.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::TooLarge { len: raw.len() });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Payload;
    use crate::types::RoomId;

    const ROOM: &str = "0f1e2d3c-4b5a-4978-8a6b-5c4d3e2f1a0b";

    #[test]
    fn decodes_lowercase_type_tags() {
        let raw = format!(r#"{{"type":"nextuser","Roomid":"{ROOM}"}}"#);
        let msg = decode_client(&raw).unwrap();
        assert_eq!(
            msg,
            ClientMessage::NextUser {
                room_id: ROOM.parse().unwrap()
            }
        );
    }

    #[test]
    fn accepts_camel_case_room_id_alias() {
        let raw = format!(r#"{{"type":"chat","roomId":"{ROOM}","message":"hey"}}"#);
        match decode_client(&raw).unwrap() {
            ClientMessage::Chat { room_id, message } => {
                assert_eq!(room_id.to_string(), ROOM);
                assert_eq!(message, "hey");
            }
            other => panic!("expected Chat, got {other:?}"),
        }
    }

    #[test]
    fn unknown_type_is_not_an_error() {
        let raw = format!(r#"{{"type":"screenshare","Roomid":"{ROOM}","data":1}}"#);
        assert_eq!(decode_client(&raw).unwrap(), ClientMessage::Unknown);
    }

    #[test]
    fn malformed_json_is_an_error() {
        let err = decode_client("{not json").unwrap_err();
        assert!(matches!(err, ProtocolError::Json(_)));
    }

    #[test]
    fn missing_type_is_an_error() {
        let err = decode_client(r#"{"Roomid":"x"}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::Json(_)));
    }

    #[test]
    fn bad_room_id_is_an_error() {
        let err = decode_client(r#"{"type":"nextuser","Roomid":"lobby"}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::Json(_)));
    }

    #[test]
    fn oversized_frame_rejected_before_parsing() {
        let raw = "x".repeat(MAX_MESSAGE_SIZE + 1);
        let err = decode_client(&raw).unwrap_err();
        assert!(matches!(err, ProtocolError::TooLarge { len } if len == MAX_MESSAGE_SIZE + 1));
    }

    #[test]
    fn deleteuser_room_id_is_optional() {
        assert_eq!(
            decode_client(r#"{"type":"deleteuser"}"#).unwrap(),
            ClientMessage::DeleteUser { room_id: None }
        );
    }

    /// Slice out the text of the top-level `data` member.
    fn data_text(frame: &str) -> &str {
        let start = frame.find(r#""data":"#).unwrap() + r#""data":"#.len();
        let end = frame.rfind('}').unwrap();
        &frame[start..end]
    }

    #[test]
    fn negotiation_payload_bytes_pass_through() {
        // Unsorted keys, an integer wider than 64 bits, a decimal past f64
        // precision, and exponent spelling all have to come out as they went in.
        let payload = r#"{"z":1,"a":12345678901234567890123,"p":0.10000000000000000555,"e":1e308,"sdp":"v=0\r\no=- 46117 2 IN IP4 127.0.0.1\r\n"}"#;
        let raw = format!(r#"{{"type":"createoffer","Roomid":"{ROOM}","data":{payload}}}"#);
        let ClientMessage::CreateOffer { room_id, data } = decode_client(&raw).unwrap() else {
            panic!("expected CreateOffer");
        };
        assert_eq!(data.as_ref().map(Payload::as_str), Some(payload));

        let out = encode_server(&ServerMessage::CreateOffer { room_id, data }).unwrap();
        assert_eq!(data_text(&out), payload);
        assert_eq!(
            out,
            format!(r#"{{"type":"createoffer","Roomid":"{ROOM}","data":{payload}}}"#)
        );
    }

    #[test]
    fn payload_survives_client_side_decode() {
        let payload = r#"[{"b":2,"a":1},18446744073709551616]"#;
        let raw = format!(r#"{{"type":"icecandidate","Roomid":"{ROOM}","data":{payload}}}"#);
        match decode_server(&raw).unwrap() {
            ServerMessage::IceCandidate { data: Some(data), .. } => {
                assert_eq!(data.as_str(), payload);
            }
            other => panic!("expected IceCandidate, got {other:?}"),
        }
    }

    #[test]
    fn null_or_missing_payload_is_none() {
        let raw = format!(r#"{{"type":"icecandidate","Roomid":"{ROOM}","data":null}}"#);
        assert_eq!(
            decode_client(&raw).unwrap(),
            ClientMessage::IceCandidate {
                room_id: ROOM.parse().unwrap(),
                data: None
            }
        );
        let raw = format!(r#"{{"type":"createanswer","Roomid":"{ROOM}"}}"#);
        assert_eq!(
            decode_client(&raw).unwrap(),
            ClientMessage::CreateAnswer {
                room_id: ROOM.parse().unwrap(),
                data: None
            }
        );
    }

    #[test]
    fn server_frames_decode_for_clients() {
        let raw = format!(r#"{{"type":"ownership","Roomid":"{ROOM}","data":"reciever"}}"#);
        assert_eq!(
            decode_server(&raw).unwrap(),
            ServerMessage::Ownership {
                room_id: ROOM.parse().unwrap(),
                data: crate::Role::Receiver
            }
        );
        assert_eq!(
            decode_server(r#"{"type":"nextuser"}"#).unwrap(),
            ServerMessage::NextUser
        );
        assert!(decode_server(r#"{"type":"hologram"}"#).is_err());
    }

    #[test]
    fn control_messages_encode_as_bare_type() {
        assert_eq!(
            encode_server(&ServerMessage::NextUser).unwrap(),
            r#"{"type":"nextuser"}"#
        );
        assert_eq!(
            encode_server(&ServerMessage::DeleteUser).unwrap(),
            r#"{"type":"deleteuser"}"#
        );
    }

    #[test]
    fn ownership_uses_wire_field_names() {
        let room_id: RoomId = ROOM.parse().unwrap();
        let out = encode_server(&ServerMessage::Ownership {
            room_id,
            data: crate::Role::Receiver,
        })
        .unwrap();
        assert_eq!(
            out,
            format!(r#"{{"type":"ownership","Roomid":"{ROOM}","data":"reciever"}}"#)
        );
    }
}
