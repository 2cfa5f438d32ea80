//! Rookery core - turn-based chess sessions with clocks.
//!
//! Pure game logic with no I/O:
//!
//! - **Clock**: per-participant elapsed-time accounting and increments
//! - **Rules**: the [`RulesEngine`] boundary, plus [`StandardChess`]
//! - **Session**: the authoritative game record and its move state machine
//!
//! # Example
//!
//! ```
//! use chrono::Utc;
//! use rookery_core::{Session, StandardChess, TimeControl, Transition};
//!
//! let engine = StandardChess::new();
//! let mut session = Session::create(
//!     "alice".to_string(),
//!     "bob".to_string(),
//!     TimeControl::new(600, 0),
//!     &engine,
//!     Utc::now(),
//! )
//! .unwrap();
//!
//! let step = session.apply_move(&engine, "alice", "e4", Utc::now()).unwrap();
//! assert_eq!(step, Transition::Moved);
//! assert_eq!(session.history().len(), 1);
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod clock;
mod error;
mod rules;
mod session;
mod standard;
mod types;

pub use clock::ClockOutcome;
pub use error::{CreateError, MoveError};
pub use rules::{RulesEngine, RulesError, TerminalStatus};
pub use session::{Session, Transition};
pub use standard::{STARTING_FEN, StandardChess};
pub use types::{
    Color, DRAW, MoveRecord, Participant, ParticipantId, PresenceStatus, ResultReason, SessionId,
    TimeControl, Winner,
};
