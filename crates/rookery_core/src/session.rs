//! The authoritative game record and its move state machine.
//!
//! A [`Session`] is `active` until it is `finished`, and there is no way back.
//! [`Session::apply_move`] is the only transition; it either rejects the move
//! without touching the session or produces exactly one next state.

use crate::clock::{apply_think, elapsed_since};
use crate::{
    Color, CreateError, DRAW, MoveError, MoveRecord, Participant, ParticipantId, PresenceStatus,
    ResultReason, RulesEngine, RulesError, SessionId, TimeControl, Winner,
};
use chrono::{DateTime, Utc};
use derive_getters::Getters;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// What an accepted [`Session::apply_move`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The move was played and the game goes on.
    Moved,
    /// The session is now finished for the given reason. On a timeout the
    /// submitted move was not played.
    Finished(ResultReason),
}

/// One game between White and Black.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Getters)]
pub struct Session {
    /// Session id.
    id: SessionId,
    /// White's seat.
    white: Participant,
    /// Black's seat.
    black: Participant,
    /// Clock settings, fixed at creation.
    time_control: TimeControl,
    /// Accepted moves, oldest first.
    history: Vec<MoveRecord>,
    /// Current position, as understood by the rules engine.
    position: String,
    /// When the session was created.
    created_at: DateTime<Utc>,
    /// When the last move (or termination) happened.
    updated_at: DateTime<Utc>,
    #[getter(skip)]
    finished: bool,
    /// Winner, once finished.
    winner: Option<Winner>,
    /// Why the session finished.
    result_reason: Option<ResultReason>,
}

impl Session {
    /// Seats two participants at the engine's initial position.
    ///
    /// # Errors
    ///
    /// Returns [`CreateError`] if either id is empty, both ids are equal, or
    /// an id is the reserved literal `"draw"`.
    #[instrument(skip(engine))]
    pub fn create(
        white_id: ParticipantId,
        black_id: ParticipantId,
        time_control: TimeControl,
        engine: &dyn RulesEngine,
        now: DateTime<Utc>,
    ) -> Result<Self, CreateError> {
        for id in [&white_id, &black_id] {
            if id.trim().is_empty() {
                return Err(CreateError::EmptyParticipant);
            }
            if id == DRAW {
                return Err(CreateError::ReservedParticipant(id.clone()));
            }
        }
        if white_id == black_id {
            return Err(CreateError::SameParticipant(white_id));
        }

        let session = Self {
            id: SessionId::new(),
            white: Participant::new(white_id, time_control.initial()),
            black: Participant::new(black_id, time_control.initial()),
            time_control,
            history: Vec::new(),
            position: engine.initial_position(),
            created_at: now,
            updated_at: now,
            finished: false,
            winner: None,
            result_reason: None,
        };
        info!(session_id = %session.id, "Session created");
        Ok(session)
    }

    /// True once the game is over. No further moves are accepted.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// The participant in the given seat.
    pub fn participant(&self, color: Color) -> &Participant {
        match color {
            Color::White => &self.white,
            Color::Black => &self.black,
        }
    }

    fn participant_mut(&mut self, color: Color) -> &mut Participant {
        match color {
            Color::White => &mut self.white,
            Color::Black => &mut self.black,
        }
    }

    /// Which seat a participant occupies, if any. Spectators have none.
    pub fn color_of(&self, participant_id: &str) -> Option<Color> {
        if self.white.user_id() == participant_id {
            Some(Color::White)
        } else if self.black.user_id() == participant_id {
            Some(Color::Black)
        } else {
            None
        }
    }

    /// Applies a move submitted by `actor` at time `now`.
    ///
    /// On `Err` the session is left exactly as it was. On a clock timeout the
    /// session finishes in the opponent's favour whether or not the move was
    /// legal, and the move itself is discarded.
    ///
    /// # Errors
    ///
    /// Returns [`MoveError`] if the session is finished, it is not the
    /// actor's turn, Black tries to open, or the engine rejects the move.
    #[instrument(skip(self, engine), fields(session_id = %self.id))]
    pub fn apply_move(
        &mut self,
        engine: &dyn RulesEngine,
        actor: &str,
        notation: &str,
        now: DateTime<Utc>,
    ) -> Result<Transition, MoveError> {
        if self.finished {
            return Err(MoveError::AlreadyFinished);
        }

        let to_move = engine.side_to_move(&self.position).map_err(MoveError::Engine)?;
        let opening = self.history.is_empty();
        let actor_color = self.color_of(actor);

        if opening && actor_color != Some(Color::White) {
            warn!(actor, "Opening move attempted by non-White participant");
            return Err(MoveError::NotWhiteStart);
        }
        if actor_color != Some(to_move) {
            warn!(actor, expected = %to_move, "Move out of turn");
            return Err(MoveError::WrongTurn(actor.to_string()));
        }

        let elapsed = if opening {
            None
        } else {
            elapsed_since(Some(self.updated_at), now)
        };
        let clock = apply_think(
            self.participant(to_move).time_remaining(),
            elapsed,
            &self.time_control,
        );

        if clock.is_flagged() {
            self.participant_mut(to_move).set_time_remaining(Duration::ZERO);
            let winner = Winner::Participant(self.participant(to_move.opponent()).user_id().to_string());
            self.finish(winner, ResultReason::Timeout, now);
            return Ok(Transition::Finished(ResultReason::Timeout));
        }

        let next = engine
            .apply_move(&self.position, notation)
            .map_err(|e| match e {
                RulesError::IllegalMove(n) => MoveError::IllegalMove(n),
                other => MoveError::Engine(other),
            })?;
        let terminal = engine.terminal_status(&next).map_err(MoveError::Engine)?;

        self.participant_mut(to_move).set_time_remaining(clock.remaining());
        let before = std::mem::replace(&mut self.position, next);
        self.history.push(MoveRecord {
            position_before: before,
            notation: notation.to_string(),
            player_id: actor.to_string(),
            timestamp: now,
        });
        self.updated_at = now;
        debug!(moves = self.history.len(), "Move applied");

        match terminal {
            None => Ok(Transition::Moved),
            Some(status) => {
                let winner = if status.is_decisive() {
                    Winner::Participant(actor.to_string())
                } else {
                    Winner::Draw
                };
                self.finish(winner, status.reason(), now);
                Ok(Transition::Finished(status.reason()))
            }
        }
    }

    /// Records a participant's connectivity. Returns false if nothing
    /// changed: the participant is not seated, already has that status, or
    /// the session is finished.
    pub fn set_presence(&mut self, participant_id: &str, status: PresenceStatus) -> bool {
        if self.finished {
            return false;
        }
        let Some(color) = self.color_of(participant_id) else {
            return false;
        };
        let seat = self.participant_mut(color);
        if seat.status() == status {
            return false;
        }
        seat.set_status(status);
        true
    }

    fn finish(&mut self, winner: Winner, reason: ResultReason, now: DateTime<Utc>) {
        info!(session_id = %self.id, %winner, %reason, "Session finished");
        self.finished = true;
        self.winner = Some(winner);
        self.result_reason = Some(reason);
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StandardChess;
    use chrono::TimeDelta;

    fn new_session(initial: u64, increment: u64) -> (Session, DateTime<Utc>) {
        let now = Utc::now();
        let session = Session::create(
            "a".to_string(),
            "b".to_string(),
            TimeControl::new(initial, increment),
            &StandardChess,
            now,
        )
        .unwrap();
        (session, now)
    }

    #[test]
    fn opening_move_costs_nothing() {
        let (mut s, t0) = new_session(600, 0);
        let t = t0 + TimeDelta::seconds(30);
        assert_eq!(s.apply_move(&StandardChess, "a", "e4", t), Ok(Transition::Moved));
        assert_eq!(s.white().time_remaining(), Duration::from_secs(600));
        assert_eq!(s.black().time_remaining(), Duration::from_secs(600));
        assert_eq!(s.history().len(), 1);
        assert_eq!(*s.updated_at(), t);
    }

    #[test]
    fn black_cannot_open() {
        let (mut s, t0) = new_session(600, 0);
        let before = s.clone();
        assert_eq!(
            s.apply_move(&StandardChess, "b", "e5", t0),
            Err(MoveError::NotWhiteStart)
        );
        assert_eq!(s, before);
    }

    #[test]
    fn spectator_cannot_open() {
        let (mut s, t0) = new_session(600, 0);
        assert_eq!(
            s.apply_move(&StandardChess, "watcher", "e4", t0),
            Err(MoveError::NotWhiteStart)
        );
    }

    #[test]
    fn turns_alternate() {
        let (mut s, t0) = new_session(600, 0);
        s.apply_move(&StandardChess, "a", "e4", t0).unwrap();
        assert_eq!(
            s.apply_move(&StandardChess, "a", "d4", t0),
            Err(MoveError::WrongTurn("a".to_string()))
        );
        s.apply_move(&StandardChess, "b", "e5", t0).unwrap();
        assert_eq!(
            s.apply_move(&StandardChess, "b", "d5", t0),
            Err(MoveError::WrongTurn("b".to_string()))
        );
        assert_eq!(s.history().len(), 2);
    }

    #[test]
    fn mover_is_charged_and_credited() {
        let (mut s, t0) = new_session(60, 2);
        s.apply_move(&StandardChess, "a", "e4", t0).unwrap();
        s.apply_move(&StandardChess, "b", "e5", t0 + TimeDelta::seconds(10))
            .unwrap();
        assert_eq!(s.black().time_remaining(), Duration::from_secs(52));
        assert_eq!(s.white().time_remaining(), Duration::from_secs(60));
    }

    #[test]
    fn illegal_move_leaves_session_untouched() {
        let (mut s, t0) = new_session(60, 0);
        s.apply_move(&StandardChess, "a", "e4", t0).unwrap();
        let before = s.clone();
        let err = s
            .apply_move(&StandardChess, "b", "e4", t0 + TimeDelta::seconds(5))
            .unwrap_err();
        assert_eq!(err, MoveError::IllegalMove("e4".to_string()));
        assert_eq!(s, before);
    }

    #[test]
    fn timeout_finishes_even_with_garbage_notation() {
        let (mut s, t0) = new_session(1, 0);
        s.apply_move(&StandardChess, "a", "e4", t0).unwrap();
        s.apply_move(&StandardChess, "b", "e5", t0).unwrap();
        let position = s.position().clone();

        let outcome = s.apply_move(&StandardChess, "a", "not-a-move", t0 + TimeDelta::seconds(5));
        assert_eq!(outcome, Ok(Transition::Finished(ResultReason::Timeout)));
        assert!(s.is_finished());
        assert_eq!(s.winner(), &Some(Winner::Participant("b".to_string())));
        assert_eq!(s.white().time_remaining(), Duration::ZERO);
        assert_eq!(s.history().len(), 2);
        assert_eq!(s.position(), &position);
    }

    #[test]
    fn checkmate_credits_the_mover() {
        let (mut s, t0) = new_session(600, 0);
        for (actor, mv) in [("a", "f3"), ("b", "e5"), ("a", "g4"), ("b", "Qh4")] {
            s.apply_move(&StandardChess, actor, mv, t0).unwrap();
        }
        assert!(s.is_finished());
        assert_eq!(s.winner(), &Some(Winner::Participant("b".to_string())));
        assert_eq!(s.result_reason(), &Some(ResultReason::Checkmate));
    }

    #[test]
    fn finished_session_rejects_moves() {
        let (mut s, t0) = new_session(600, 0);
        for (actor, mv) in [("a", "f3"), ("b", "e5"), ("a", "g4"), ("b", "Qh4")] {
            s.apply_move(&StandardChess, actor, mv, t0).unwrap();
        }
        assert_eq!(
            s.apply_move(&StandardChess, "a", "e4", t0),
            Err(MoveError::AlreadyFinished)
        );
    }

    #[test]
    fn rejects_bad_participants() {
        let tc = TimeControl::new(60, 0);
        let now = Utc::now();
        let create = |w: &str, b: &str| Session::create(w.into(), b.into(), tc, &StandardChess, now);
        assert_eq!(create("", "b").unwrap_err(), CreateError::EmptyParticipant);
        assert_eq!(
            create("a", "a").unwrap_err(),
            CreateError::SameParticipant("a".to_string())
        );
        assert_eq!(
            create("draw", "b").unwrap_err(),
            CreateError::ReservedParticipant("draw".to_string())
        );
    }

    #[test]
    fn presence_only_tracks_seated_players() {
        let (mut s, _) = new_session(60, 0);
        assert!(s.set_presence("a", PresenceStatus::Offline));
        assert!(!s.set_presence("a", PresenceStatus::Offline));
        assert!(!s.set_presence("watcher", PresenceStatus::Offline));
        assert_eq!(s.white().status(), PresenceStatus::Offline);
    }

    #[test]
    fn serialized_session_round_trips() {
        let (mut s, t0) = new_session(60, 0);
        s.apply_move(&StandardChess, "a", "e4", t0).unwrap();
        let json = serde_json::to_string(&s).unwrap();
        let back: Session = serde_json::from_str(&json).unwrap();
        assert_eq!(back, s);
    }
}
