//! Boundary to the move-legality engine.
//!
//! The session state machine never inspects a position itself. Positions are
//! opaque strings; everything derived from them is recomputed by the engine
//! on each call, so the stored string stays the single source of truth.

use crate::{Color, ResultReason};

/// Why a position is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum TerminalStatus {
    /// The side to move is mated. The side that just moved wins.
    Checkmate,
    /// The side to move has no legal moves and is not in check.
    Stalemate,
    /// Neither side has enough material to mate.
    InsufficientMaterial,
}

impl TerminalStatus {
    /// Reason recorded on the finished session.
    pub fn reason(self) -> ResultReason {
        match self {
            TerminalStatus::Checkmate => ResultReason::Checkmate,
            TerminalStatus::Stalemate => ResultReason::Stalemate,
            TerminalStatus::InsufficientMaterial => ResultReason::InsufficientMaterial,
        }
    }

    /// True when the mover wins; false for draws.
    pub fn is_decisive(self) -> bool {
        matches!(self, TerminalStatus::Checkmate)
    }
}

/// Errors reported by a rules engine.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
pub enum RulesError {
    /// The position string could not be parsed.
    #[display("Invalid position '{}'", _0)]
    InvalidPosition(String),

    /// The move is not legal (or not parseable) in the given position.
    #[display("Illegal move '{}'", _0)]
    IllegalMove(String),
}

impl std::error::Error for RulesError {}

/// Capability interface over a chess rules implementation.
pub trait RulesEngine: Send + Sync {
    /// Position every new session starts from.
    fn initial_position(&self) -> String;

    /// Checks that a stored position can be loaded.
    fn validate_position(&self, position: &str) -> Result<(), RulesError> {
        self.side_to_move(position).map(|_| ())
    }

    /// Whose turn it is in `position`.
    fn side_to_move(&self, position: &str) -> Result<Color, RulesError>;

    /// Applies `notation` to `position`, returning the resulting position.
    fn apply_move(&self, position: &str, notation: &str) -> Result<String, RulesError>;

    /// Reports whether `position` ends the game and why.
    fn terminal_status(&self, position: &str) -> Result<Option<TerminalStatus>, RulesError>;
}
