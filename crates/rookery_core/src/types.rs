//! Core domain types for chess sessions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

/// Unique identifier for a participant (player or spectator).
pub type ParticipantId = String;

/// Literal used on the wire for a drawn game's winner field.
pub const DRAW: &str = "draw";

/// Unique identifier for a game session.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
    derive_more::Display,
)]
#[serde(transparent)]
#[display("{_0}")]
pub struct SessionId(Uuid);

impl SessionId {
    /// Generates a fresh random session id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for SessionId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Side of the board.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Color {
    /// White (moves first).
    White,
    /// Black.
    Black,
}

impl Color {
    /// Returns the other side.
    pub fn opponent(self) -> Self {
        match self {
            Color::White => Color::Black,
            Color::Black => Color::White,
        }
    }
}

/// Whether a participant currently has a live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PresenceStatus {
    /// At least one live connection.
    #[default]
    Online,
    /// No live connection.
    Offline,
}

/// Time budget fixed at session creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeControl {
    /// Initial budget per participant, in seconds.
    pub initial_time: u64,
    /// Seconds added to the mover after each accepted move.
    pub increment: u64,
}

impl TimeControl {
    /// Creates a time control from whole seconds.
    pub fn new(initial_time: u64, increment: u64) -> Self {
        Self {
            initial_time,
            increment,
        }
    }

    /// Initial budget as a duration.
    pub fn initial(&self) -> Duration {
        Duration::from_secs(self.initial_time)
    }

    /// Increment as a duration.
    pub fn increment(&self) -> Duration {
        Duration::from_secs(self.increment)
    }
}

/// One of the two players seated in a session.
///
/// Serialized with both the raw budget in nanoseconds and a derived
/// `time_remaining` in floating-point seconds. The derived value is computed
/// at serialization time and ignored when reading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "ParticipantRecord", from = "ParticipantRecord")]
pub struct Participant {
    user_id: ParticipantId,
    status: PresenceStatus,
    time_remaining: Duration,
}

impl Participant {
    /// Seats a participant with the given budget.
    pub fn new(user_id: ParticipantId, time_remaining: Duration) -> Self {
        Self {
            user_id,
            status: PresenceStatus::Online,
            time_remaining,
        }
    }

    /// Participant's user id.
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Connectivity status (observational only).
    pub fn status(&self) -> PresenceStatus {
        self.status
    }

    /// Remaining clock budget. Never negative.
    pub fn time_remaining(&self) -> Duration {
        self.time_remaining
    }

    /// Remaining budget for display, in seconds.
    pub fn time_remaining_secs(&self) -> f64 {
        self.time_remaining.as_secs_f64()
    }

    pub(crate) fn set_time_remaining(&mut self, remaining: Duration) {
        self.time_remaining = remaining;
    }

    pub(crate) fn set_status(&mut self, status: PresenceStatus) {
        self.status = status;
    }
}

#[derive(Serialize, Deserialize)]
struct ParticipantRecord {
    user_id: ParticipantId,
    status: PresenceStatus,
    time_remaining_raw: u64,
    #[serde(default, skip_deserializing)]
    time_remaining: f64,
}

impl From<Participant> for ParticipantRecord {
    fn from(p: Participant) -> Self {
        Self {
            time_remaining: p.time_remaining_secs(),
            time_remaining_raw: u64::try_from(p.time_remaining.as_nanos()).unwrap_or(u64::MAX),
            user_id: p.user_id,
            status: p.status,
        }
    }
}

impl From<ParticipantRecord> for Participant {
    fn from(r: ParticipantRecord) -> Self {
        Self {
            user_id: r.user_id,
            status: r.status,
            time_remaining: Duration::from_nanos(r.time_remaining_raw),
        }
    }
}

/// A single accepted move, appended to the session history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveRecord {
    /// Position before the move was applied.
    pub position_before: String,
    /// The move as submitted.
    pub notation: String,
    /// Who made the move.
    pub player_id: ParticipantId,
    /// When the move was accepted.
    pub timestamp: DateTime<Utc>,
}

/// Why a session finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ResultReason {
    /// The side to move was checkmated.
    Checkmate,
    /// The side to move has no legal move and is not in check.
    Stalemate,
    /// Neither side can deliver mate.
    InsufficientMaterial,
    /// A participant's clock reached zero.
    Timeout,
}

/// Winner of a finished session.
///
/// On the wire this is either the winning participant's id or the literal
/// `"draw"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum Winner {
    /// A participant won.
    Participant(ParticipantId),
    /// Nobody won.
    Draw,
}

impl Winner {
    /// Returns the winning participant id, if the game was not drawn.
    pub fn participant(&self) -> Option<&str> {
        match self {
            Winner::Participant(id) => Some(id),
            Winner::Draw => None,
        }
    }
}

impl std::fmt::Display for Winner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Winner::Participant(id) => f.write_str(id),
            Winner::Draw => f.write_str(DRAW),
        }
    }
}

impl From<Winner> for String {
    fn from(w: Winner) -> Self {
        w.to_string()
    }
}

impl From<String> for Winner {
    fn from(s: String) -> Self {
        if s == DRAW {
            Winner::Draw
        } else {
            Winner::Participant(s)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn participant_serializes_display_seconds() {
        let p = Participant::new("a".to_string(), Duration::from_millis(1500));
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["time_remaining_raw"], 1_500_000_000u64);
        assert_eq!(json["time_remaining"], 1.5);
        assert_eq!(json["status"], "online");
    }

    #[test]
    fn participant_ignores_stale_display_value() {
        let json = r#"{"user_id":"a","status":"offline","time_remaining_raw":2000000000,"time_remaining":99.0}"#;
        let p: Participant = serde_json::from_str(json).unwrap();
        assert_eq!(p.time_remaining(), Duration::from_secs(2));
        assert_eq!(p.status(), PresenceStatus::Offline);
    }

    #[test]
    fn winner_wire_format() {
        assert_eq!(serde_json::to_string(&Winner::Draw).unwrap(), "\"draw\"");
        let w: Winner = serde_json::from_str("\"alice\"").unwrap();
        assert_eq!(w, Winner::Participant("alice".to_string()));
    }

    #[test]
    fn result_reason_wire_format() {
        assert_eq!(
            serde_json::to_string(&ResultReason::InsufficientMaterial).unwrap(),
            "\"INSUFFICIENT_MATERIAL\""
        );
        assert_eq!(ResultReason::Timeout.to_string(), "TIMEOUT");
    }

    #[test]
    fn session_id_parses_its_display() {
        let id = SessionId::new();
        let parsed: SessionId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }
}
