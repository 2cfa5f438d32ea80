//! In-process store implementations.

use async_trait::async_trait;
use rookery_core::{Session, SessionId};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, instrument};

use super::{ActiveStore, ArchiveStore, ArchivedGame, StoreError, StoreErrorKind};

#[derive(Debug)]
struct Slot {
    json: String,
    expires_at: Instant,
}

/// Active store keeping serialized sessions in memory with an idle expiry.
///
/// Sessions are stored as JSON so every load rebuilds the session from its
/// persisted form, the same as an external cache would.
#[derive(Debug)]
pub struct InMemoryActiveStore {
    slots: Mutex<HashMap<SessionId, Slot>>,
    ttl: Duration,
}

impl InMemoryActiveStore {
    /// Creates a store whose entries expire `ttl` after their last write.
    #[instrument]
    pub fn new(ttl: Duration) -> Self {
        info!(?ttl, "Creating in-memory active store");
        Self {
            slots: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Drops every expired entry. Returns how many were removed.
    #[instrument(skip(self))]
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut slots = self.slots.lock().await;
        let before = slots.len();
        slots.retain(|_, slot| slot.expires_at > now);
        let purged = before - slots.len();
        if purged > 0 {
            info!(purged, "Purged expired sessions");
        }
        purged
    }

    /// Number of live (unexpired) entries.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.slots
            .lock()
            .await
            .values()
            .filter(|slot| slot.expires_at > now)
            .count()
    }

    /// Returns true if no live entries remain.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl ActiveStore for InMemoryActiveStore {
    #[instrument(skip(self, session), fields(session_id = %session.id()))]
    async fn save(&self, session: &Session) -> Result<(), StoreError> {
        let json = serde_json::to_string(session)?;
        let expires_at = Instant::now() + self.ttl;
        self.slots
            .lock()
            .await
            .insert(*session.id(), Slot { json, expires_at });
        debug!("Session saved");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn find(&self, id: SessionId) -> Result<Option<Session>, StoreError> {
        let mut slots = self.slots.lock().await;
        match slots.entry(id) {
            Entry::Vacant(_) => Ok(None),
            Entry::Occupied(slot) if slot.get().expires_at <= Instant::now() => {
                debug!("Session expired");
                slot.remove();
                Ok(None)
            }
            Entry::Occupied(slot) => Ok(Some(serde_json::from_str(&slot.get().json)?)),
        }
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: SessionId) -> Result<(), StoreError> {
        self.slots.lock().await.remove(&id);
        debug!("Session deleted");
        Ok(())
    }
}

/// Archive store kept in memory. Useful for tests and single-process runs.
#[derive(Debug, Default)]
pub struct InMemoryArchiveStore {
    games: Mutex<HashMap<SessionId, ArchivedGame>>,
}

impl InMemoryArchiveStore {
    /// Creates an empty archive.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of archived games.
    pub async fn len(&self) -> usize {
        self.games.lock().await.len()
    }

    /// Returns true if nothing has been archived.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl ArchiveStore for InMemoryArchiveStore {
    #[instrument(skip(self, game), fields(session_id = %game.id()))]
    async fn archive(&self, game: &ArchivedGame) -> Result<(), StoreError> {
        match self.games.lock().await.entry(*game.id()) {
            Entry::Occupied(_) => Err(StoreError::new(
                StoreErrorKind::AlreadyArchived,
                format!("Session {} is already archived", game.id()),
            )),
            Entry::Vacant(slot) => {
                slot.insert(game.clone());
                info!("Game archived");
                Ok(())
            }
        }
    }

    #[instrument(skip(self))]
    async fn find(&self, id: SessionId) -> Result<Option<ArchivedGame>, StoreError> {
        Ok(self.games.lock().await.get(&id).cloned())
    }
}
