//! Storage error types.

use derive_more::{Display, Error};
use tracing::instrument;

/// Category of a storage failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum StoreErrorKind {
    /// The call did not finish within the configured bound.
    Timeout,
    /// The backend reported a failure.
    Backend,
    /// A stored record could not be decoded.
    Corrupt,
    /// The archive already holds this session.
    AlreadyArchived,
}

/// Storage error with location tracking.
#[derive(Debug, Clone, Display, Error)]
#[display("Store error ({}): {} at {}:{}", kind, message, file, line)]
pub struct StoreError {
    /// What went wrong.
    pub kind: StoreErrorKind,
    /// Error message.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl StoreError {
    /// Creates a new storage error with caller location tracking.
    #[track_caller]
    #[instrument(skip(message))]
    pub fn new(kind: StoreErrorKind, message: impl Into<String>) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            kind,
            message: message.into(),
            line: loc.line(),
            file: loc.file(),
        }
    }

    /// A store call exceeded its deadline.
    #[track_caller]
    pub fn timeout(operation: &str) -> Self {
        Self::new(StoreErrorKind::Timeout, format!("{} timed out", operation))
    }

    /// The backend failed.
    #[track_caller]
    pub fn backend(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::Backend, message)
    }

    /// A stored record is unreadable.
    #[track_caller]
    pub fn corrupt(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::Corrupt, message)
    }

    /// Returns true if the archive already holds the record.
    pub fn is_already_archived(&self) -> bool {
        self.kind == StoreErrorKind::AlreadyArchived
    }
}

impl From<diesel::result::Error> for StoreError {
    #[track_caller]
    fn from(err: diesel::result::Error) -> Self {
        use diesel::result::{DatabaseErrorKind, Error};
        match err {
            Error::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => Self::new(
                StoreErrorKind::AlreadyArchived,
                format!("Duplicate archive record: {}", info.message()),
            ),
            other => Self::backend(format!("Diesel error: {}", other)),
        }
    }
}

impl From<diesel::ConnectionError> for StoreError {
    #[track_caller]
    fn from(err: diesel::ConnectionError) -> Self {
        Self::backend(format!("Connection error: {}", err))
    }
}

impl From<serde_json::Error> for StoreError {
    #[track_caller]
    fn from(err: serde_json::Error) -> Self {
        Self::corrupt(format!("Serialization error: {}", err))
    }
}

impl From<tokio::task::JoinError> for StoreError {
    #[track_caller]
    fn from(err: tokio::task::JoinError) -> Self {
        Self::backend(format!("Blocking task failed: {}", err))
    }
}
