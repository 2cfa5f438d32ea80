//! Errors raised by the session state machine.

use crate::{ParticipantId, RulesError};

/// A move was rejected. None of these leave a trace on the session.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
pub enum MoveError {
    /// The session has already finished.
    #[display("Game is already finished")]
    AlreadyFinished,

    /// The actor is not the side to move (or not seated at all).
    #[display("It is not {}'s turn", _0)]
    WrongTurn(ParticipantId),

    /// The opening move must be made by White.
    #[display("White must make the first move")]
    NotWhiteStart,

    /// The engine refused the move.
    #[display("Invalid move: {}", _0)]
    IllegalMove(String),

    /// The stored position could not be read by the engine.
    #[display("Rules engine failure: {}", _0)]
    Engine(RulesError),
}

impl std::error::Error for MoveError {}

/// A session could not be created from the given participants.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
pub enum CreateError {
    /// A participant id was empty.
    #[display("Participant id must not be empty")]
    EmptyParticipant,

    /// Both seats were given the same participant.
    #[display("White and Black must be different participants, got '{}' twice", _0)]
    SameParticipant(ParticipantId),

    /// The id collides with a reserved wire literal.
    #[display("Participant id '{}' is reserved", _0)]
    ReservedParticipant(ParticipantId),
}

impl std::error::Error for CreateError {}
