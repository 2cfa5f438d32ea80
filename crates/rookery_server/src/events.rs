//! Live-channel wire format.
//!
//! Every frame is a JSON envelope `{"type": ..., "payload": ...}`.

use rookery_core::{ParticipantId, ResultReason, Session, Winner};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// An encoded server-to-client frame, shared by all recipients of a broadcast.
pub type Frame = Arc<str>;

/// Envelope type tag.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    /// Full session state.
    GameUpdate,
    /// The session finished.
    GameOver,
    /// A subscriber left the session.
    PlayerDisconnected,
    /// A request from this connection failed.
    Error,
    /// Client move submission.
    Move,
}

/// Outbound envelope borrowing its payload.
#[derive(Debug, Serialize)]
struct OutboundEnvelope<'a, P: Serialize + ?Sized> {
    #[serde(rename = "type")]
    kind: EventType,
    payload: &'a P,
}

/// Inbound envelope; the payload is decoded once the type is known.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    /// Type tag as sent by the client.
    #[serde(rename = "type")]
    pub kind: String,
    /// Type-specific payload.
    #[serde(default)]
    pub payload: Value,
}

/// Payload of a `MOVE` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovePayload {
    /// Move notation.
    #[serde(rename = "move")]
    pub notation: String,
}

/// Payload of `GAME_OVER`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameOverPayload {
    /// Winning participant id, or `"draw"`.
    pub winner: Winner,
    /// Why the session ended.
    pub reason: ResultReason,
}

impl GameOverPayload {
    /// Builds the payload for a finished session.
    pub fn from_session(session: &Session) -> Option<Self> {
        match (session.winner(), session.result_reason()) {
            (Some(winner), Some(reason)) => Some(Self {
                winner: winner.clone(),
                reason: *reason,
            }),
            _ => None,
        }
    }
}

/// Payload of `PLAYER_DISCONNECTED`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerDisconnectedPayload {
    /// Identity of the connection that left.
    pub participant_id: ParticipantId,
}

/// Client request decoded from an envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Submit a move.
    Move(MovePayload),
}

impl Inbound {
    /// Decodes a text frame; `None` for anything that is not a valid request.
    pub fn decode(text: &str) -> Option<Self> {
        let envelope: Envelope = serde_json::from_str(text).ok()?;
        match envelope.kind.parse::<EventType>().ok()? {
            EventType::Move => serde_json::from_value(envelope.payload)
                .ok()
                .map(Inbound::Move),
            _ => None,
        }
    }
}

/// Encodes an outbound frame.
///
/// # Errors
///
/// Returns the serializer error if the payload cannot be encoded.
pub fn encode<P: Serialize + ?Sized>(
    kind: EventType,
    payload: &P,
) -> Result<Frame, serde_json::Error> {
    serde_json::to_string(&OutboundEnvelope { kind, payload }).map(Frame::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_move_request() {
        let inbound = Inbound::decode(r#"{"type":"MOVE","payload":{"move":"e4"}}"#);
        assert_eq!(
            inbound,
            Some(Inbound::Move(MovePayload {
                notation: "e4".to_string()
            }))
        );
    }

    #[test]
    fn discards_malformed_frames() {
        assert_eq!(Inbound::decode("not json"), None);
        assert_eq!(Inbound::decode(r#"{"type":"MOVE"}"#), None);
        assert_eq!(Inbound::decode(r#"{"type":"DANCE","payload":{}}"#), None);
        assert_eq!(Inbound::decode(r#"{"type":"GAME_UPDATE","payload":{}}"#), None);
    }

    #[test]
    fn error_payload_is_a_bare_string() {
        let frame = encode(EventType::Error, "It is not your turn").unwrap();
        assert_eq!(
            &*frame,
            r#"{"type":"ERROR","payload":"It is not your turn"}"#
        );
    }

    #[test]
    fn disconnect_payload_names_participant() {
        let payload = PlayerDisconnectedPayload {
            participant_id: "b".to_string(),
        };
        let frame = encode(EventType::PlayerDisconnected, &payload).unwrap();
        assert_eq!(
            &*frame,
            r#"{"type":"PLAYER_DISCONNECTED","payload":{"participant_id":"b"}}"#
        );
    }
}
