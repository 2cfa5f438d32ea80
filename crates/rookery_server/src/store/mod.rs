//! Storage contracts for in-progress and finished sessions.
//!
//! The active store holds the authoritative copy of every session that is
//! still being played. The archive store receives each finished session
//! exactly once and never changes it afterwards.

mod error;
mod memory;
mod models;
mod schema; // Diesel generated schema - internal use only
mod sqlite;

pub use error::{StoreError, StoreErrorKind};
pub use memory::{InMemoryActiveStore, InMemoryArchiveStore};
pub use models::ArchivedGame;
pub use sqlite::SqliteArchiveStore;

use async_trait::async_trait;
use rookery_core::{Session, SessionId};

/// Fast mutable storage for sessions in progress.
#[async_trait]
pub trait ActiveStore: Send + Sync {
    /// Writes a session, replacing any previous version.
    async fn save(&self, session: &Session) -> Result<(), StoreError>;

    /// Loads a session. Expired or unknown ids yield `None`.
    async fn find(&self, id: SessionId) -> Result<Option<Session>, StoreError>;

    /// Overwrites an existing session.
    async fn update(&self, session: &Session) -> Result<(), StoreError> {
        self.save(session).await
    }

    /// Removes a session. Removing an unknown id is not an error.
    async fn delete(&self, id: SessionId) -> Result<(), StoreError>;
}

/// Write-once storage for finished sessions.
#[async_trait]
pub trait ArchiveStore: Send + Sync {
    /// Inserts a finished game.
    ///
    /// Fails with [`StoreErrorKind::AlreadyArchived`] if the id is present.
    async fn archive(&self, game: &ArchivedGame) -> Result<(), StoreError>;

    /// Loads a finished game.
    async fn find(&self, id: SessionId) -> Result<Option<ArchivedGame>, StoreError>;
}
