//! Per-participant clock accounting.
//!
//! Only the mover's clock is ever debited, and only once a previous move
//! timestamp exists to measure against. The opening move is free.

use crate::TimeControl;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::{debug, instrument};

/// Result of charging a participant for one move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockOutcome {
    /// The participant still has time; this is the new budget.
    Running(Duration),
    /// The budget reached zero.
    Flagged,
}

impl ClockOutcome {
    /// Budget to store after this outcome. A flagged clock is clamped to zero.
    pub fn remaining(self) -> Duration {
        match self {
            ClockOutcome::Running(remaining) => remaining,
            ClockOutcome::Flagged => Duration::ZERO,
        }
    }

    /// Returns true if the participant ran out of time.
    pub fn is_flagged(self) -> bool {
        matches!(self, ClockOutcome::Flagged)
    }
}

/// Time spent thinking since the previous move.
///
/// Returns `None` when no previous move exists. A timestamp in the future
/// counts as zero elapsed time.
pub fn elapsed_since(previous: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Option<Duration> {
    previous.map(|prev| (now - prev).to_std().unwrap_or(Duration::ZERO))
}

/// Charges `elapsed` against `remaining`, then credits the increment.
///
/// With no elapsed measurement (opening move) the budget is returned
/// untouched and no increment is applied.
#[instrument(level = "debug")]
pub fn apply_think(
    remaining: Duration,
    elapsed: Option<Duration>,
    time_control: &TimeControl,
) -> ClockOutcome {
    let Some(elapsed) = elapsed else {
        debug!("Opening move, clock not charged");
        return ClockOutcome::Running(remaining);
    };

    let after = remaining.as_nanos() as i128 - elapsed.as_nanos() as i128
        + time_control.increment().as_nanos() as i128;

    if after <= 0 {
        debug!(?remaining, ?elapsed, "Clock flagged");
        ClockOutcome::Flagged
    } else {
        let after = u64::try_from(after).map(Duration::from_nanos).unwrap_or(Duration::MAX);
        ClockOutcome::Running(after)
    }
}
