//! Durable archive backed by SQLite through Diesel.

use async_trait::async_trait;
use diesel::prelude::*;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use rookery_core::SessionId;
use tracing::{debug, info, instrument};

use super::models::{ArchivedGameRow, NewArchivedGame};
use super::{ArchiveStore, ArchivedGame, StoreError, schema};

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Archive store writing one row per finished game.
///
/// Every call opens its own connection on the blocking pool, so `db_path`
/// must name a file; `":memory:"` would give each call a fresh database.
#[derive(Debug, Clone)]
pub struct SqliteArchiveStore {
    db_path: String,
}

impl SqliteArchiveStore {
    /// Opens (creating if needed) the archive database and applies pending
    /// migrations.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the database cannot be opened or migrated.
    #[instrument(skip(db_path), fields(db_path = %db_path))]
    pub fn open(db_path: String) -> Result<Self, StoreError> {
        info!("Opening SQLite archive");
        let store = Self { db_path };
        let mut conn = store.connection()?;
        let applied = conn
            .run_pending_migrations(MIGRATIONS)
            .map_err(|e| StoreError::backend(format!("Migrations failed: {}", e)))?;
        info!(applied = applied.len(), "Archive schema ready");
        Ok(store)
    }

    /// Establishes a database connection.
    #[instrument(skip(self))]
    fn connection(&self) -> Result<SqliteConnection, StoreError> {
        debug!(path = %self.db_path, "Establishing connection");
        SqliteConnection::establish(&self.db_path).map_err(|e| {
            StoreError::backend(format!("Failed to connect to '{}': {}", self.db_path, e))
        })
    }

    fn insert(&self, row: NewArchivedGame) -> Result<(), StoreError> {
        let mut conn = self.connection()?;
        diesel::insert_into(schema::archived_games::table)
            .values(&row)
            .execute(&mut conn)?;
        Ok(())
    }

    fn select(&self, id: SessionId) -> Result<Option<ArchivedGame>, StoreError> {
        let mut conn = self.connection()?;
        schema::archived_games::table
            .filter(schema::archived_games::id.eq(id.to_string()))
            .select(ArchivedGameRow::as_select())
            .first::<ArchivedGameRow>(&mut conn)
            .optional()?
            .map(ArchivedGame::try_from)
            .transpose()
    }
}

#[async_trait]
impl ArchiveStore for SqliteArchiveStore {
    #[instrument(skip(self, game), fields(session_id = %game.id()))]
    async fn archive(&self, game: &ArchivedGame) -> Result<(), StoreError> {
        let row = NewArchivedGame::try_from(game)?;
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.insert(row)).await??;
        info!("Game archived");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn find(&self, id: SessionId) -> Result<Option<ArchivedGame>, StoreError> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.select(id)).await?
    }
}
