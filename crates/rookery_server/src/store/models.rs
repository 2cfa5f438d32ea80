//! Archive records and their database mapping.

use chrono::{DateTime, NaiveDateTime, Utc};
use derive_getters::Getters;
use diesel::prelude::*;
use rookery_core::{MoveRecord, ResultReason, Session, SessionId, TimeControl, Winner};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::instrument;

use crate::store::{StoreError, schema};

/// A finished session as kept in the archive. Written once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Getters)]
pub struct ArchivedGame {
    /// Session id.
    id: SessionId,
    /// White's participant id.
    white_id: String,
    /// Black's participant id.
    black_id: String,
    /// Position at the end of the game.
    final_position: String,
    /// Every accepted move.
    history: Vec<MoveRecord>,
    /// Winner, or draw.
    winner: Option<Winner>,
    /// Why the game ended.
    result_reason: Option<ResultReason>,
    /// Clock settings the game was played with.
    time_control: TimeControl,
    /// When the session was created.
    created_at: DateTime<Utc>,
    /// When the archive record was written.
    archived_at: DateTime<Utc>,
    /// The final session exactly as it was when archived.
    session: Session,
}

impl ArchivedGame {
    /// Builds the archive record for a finished session.
    #[instrument(skip(session), fields(session_id = %session.id()))]
    pub fn from_session(session: &Session, archived_at: DateTime<Utc>) -> Self {
        Self {
            id: *session.id(),
            white_id: session.white().user_id().to_string(),
            black_id: session.black().user_id().to_string(),
            final_position: session.position().clone(),
            history: session.history().clone(),
            winner: session.winner().clone(),
            result_reason: *session.result_reason(),
            time_control: *session.time_control(),
            created_at: *session.created_at(),
            archived_at,
            session: session.clone(),
        }
    }
}

/// Archive row as stored in SQLite.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = schema::archived_games)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub(crate) struct ArchivedGameRow {
    id: String,
    white_id: String,
    black_id: String,
    final_position: String,
    history: String,
    winner: Option<String>,
    result_reason: Option<String>,
    initial_time: i64,
    increment: i64,
    created_at: NaiveDateTime,
    archived_at: NaiveDateTime,
    session: String,
}

/// Insertable archive row.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = schema::archived_games)]
pub(crate) struct NewArchivedGame {
    id: String,
    white_id: String,
    black_id: String,
    final_position: String,
    history: String,
    winner: Option<String>,
    result_reason: Option<String>,
    initial_time: i64,
    increment: i64,
    created_at: NaiveDateTime,
    archived_at: NaiveDateTime,
    session: String,
}

fn seconds_to_db(seconds: u64) -> Result<i64, StoreError> {
    i64::try_from(seconds).map_err(|_| StoreError::corrupt(format!("{} seconds does not fit", seconds)))
}

fn seconds_from_db(seconds: i64) -> Result<u64, StoreError> {
    u64::try_from(seconds).map_err(|_| StoreError::corrupt(format!("Negative duration {}", seconds)))
}

impl TryFrom<&ArchivedGame> for NewArchivedGame {
    type Error = StoreError;

    fn try_from(game: &ArchivedGame) -> Result<Self, Self::Error> {
        Ok(Self {
            id: game.id.to_string(),
            white_id: game.white_id.clone(),
            black_id: game.black_id.clone(),
            final_position: game.final_position.clone(),
            history: serde_json::to_string(&game.history)?,
            winner: game.winner.clone().map(String::from),
            result_reason: game.result_reason.map(|r| r.to_string()),
            initial_time: seconds_to_db(game.time_control.initial_time)?,
            increment: seconds_to_db(game.time_control.increment)?,
            created_at: game.created_at.naive_utc(),
            archived_at: game.archived_at.naive_utc(),
            session: serde_json::to_string(&game.session)?,
        })
    }
}

impl TryFrom<ArchivedGameRow> for ArchivedGame {
    type Error = StoreError;

    fn try_from(row: ArchivedGameRow) -> Result<Self, Self::Error> {
        let id = SessionId::from_str(&row.id)
            .map_err(|e| StoreError::corrupt(format!("Invalid session id '{}': {}", row.id, e)))?;
        let result_reason = row
            .result_reason
            .as_deref()
            .map(ResultReason::from_str)
            .transpose()
            .map_err(|e| StoreError::corrupt(format!("Invalid result reason: {}", e)))?;

        Ok(Self {
            id,
            white_id: row.white_id,
            black_id: row.black_id,
            final_position: row.final_position,
            history: serde_json::from_str(&row.history)?,
            winner: row.winner.map(Winner::from),
            result_reason,
            time_control: TimeControl::new(
                seconds_from_db(row.initial_time)?,
                seconds_from_db(row.increment)?,
            ),
            created_at: row.created_at.and_utc(),
            archived_at: row.archived_at.and_utc(),
            session: serde_json::from_str(&row.session)?,
        })
    }
}
