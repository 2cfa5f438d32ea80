//! Persistence orchestration for game sessions.
//!
//! The service is the only writer of both stores. Every mutation of a given
//! session (moves, presence, archival) runs under that session's lock, so two
//! requests can never load the same version and both save it.
//!
//! A finished session is first saved to the active store, then archived, then
//! evicted. If archiving fails the finished copy stays authoritative in the
//! active store until [`GameService::reconcile`] completes the hand-off.
//!
//! Accepted moves are published to the [`Hub`] before the session lock is
//! released, so subscribers see updates in the order they were applied.

use rookery_core::{
    CreateError, MoveError, ParticipantId, PresenceStatus, RulesEngine, Session, SessionId,
    TimeControl,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

use crate::hub::Hub;
use crate::locks::KeyedLocks;
use crate::store::{ActiveStore, ArchiveStore, ArchivedGame, StoreError};
use crate::time::{SystemTime, TimeSource};

/// Default bound on each individual store call.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);

/// Error returned by [`GameService`] operations.
#[derive(Debug, derive_more::Display)]
pub enum GameError {
    /// The move was rejected; nothing was stored.
    #[display("{}", _0)]
    Validation(MoveError),

    /// The session could not be created.
    #[display("{}", _0)]
    InvalidRequest(CreateError),

    /// No active session has this id.
    #[display("Session {} not found", _0)]
    NotFound(SessionId),

    /// A store call failed or timed out.
    #[display("{}", _0)]
    Persistence(StoreError),
}

impl std::error::Error for GameError {}

impl From<MoveError> for GameError {
    fn from(err: MoveError) -> Self {
        Self::Validation(err)
    }
}

impl From<CreateError> for GameError {
    fn from(err: CreateError) -> Self {
        Self::InvalidRequest(err)
    }
}

impl From<StoreError> for GameError {
    fn from(err: StoreError) -> Self {
        Self::Persistence(err)
    }
}

/// Creates, advances, and archives sessions.
#[derive(Clone)]
pub struct GameService {
    inner: Arc<Inner>,
}

struct Inner {
    active: Arc<dyn ActiveStore>,
    archive: Arc<dyn ArchiveStore>,
    engine: Arc<dyn RulesEngine>,
    time: Arc<dyn TimeSource>,
    hub: Arc<Hub>,
    locks: KeyedLocks<SessionId>,
    store_timeout: Duration,
}

impl std::fmt::Debug for GameService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameService")
            .field("store_timeout", &self.inner.store_timeout)
            .field("locked_sessions", &self.inner.locks.len())
            .finish()
    }
}

/// Builder for [`GameService`].
pub struct GameServiceBuilder {
    active: Arc<dyn ActiveStore>,
    archive: Arc<dyn ArchiveStore>,
    engine: Arc<dyn RulesEngine>,
    time: Arc<dyn TimeSource>,
    hub: Arc<Hub>,
    store_timeout: Duration,
}

impl GameServiceBuilder {
    /// Publishes accepted moves to `hub` instead of a private one.
    pub fn hub(mut self, hub: Arc<Hub>) -> Self {
        self.hub = hub;
        self
    }

    /// Replaces the system clock.
    pub fn time_source(mut self, time: Arc<dyn TimeSource>) -> Self {
        self.time = time;
        self
    }

    /// Sets the bound applied to every store call.
    pub fn store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    /// Builds the service.
    pub fn build(self) -> GameService {
        GameService {
            inner: Arc::new(Inner {
                active: self.active,
                archive: self.archive,
                engine: self.engine,
                time: self.time,
                hub: self.hub,
                locks: KeyedLocks::new(),
                store_timeout: self.store_timeout,
            }),
        }
    }
}

impl GameService {
    /// Starts building a service over the given stores and rules engine.
    pub fn builder(
        active: Arc<dyn ActiveStore>,
        archive: Arc<dyn ArchiveStore>,
        engine: Arc<dyn RulesEngine>,
    ) -> GameServiceBuilder {
        GameServiceBuilder {
            active,
            archive,
            engine,
            time: Arc::new(SystemTime),
            hub: Arc::new(Hub::new()),
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    /// Registry receiving every accepted move.
    pub fn hub(&self) -> &Arc<Hub> {
        &self.inner.hub
    }

    /// Runs one store call under the configured deadline.
    async fn bounded<T>(
        &self,
        operation: &str,
        call: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        tokio::time::timeout(self.inner.store_timeout, call)
            .await
            .map_err(|_| {
                warn!(operation, "Store call timed out");
                StoreError::timeout(operation)
            })?
    }

    /// Loads a session and checks that its position is usable.
    async fn load(&self, id: SessionId) -> Result<Session, GameError> {
        let session = self
            .bounded("active find", self.inner.active.find(id))
            .await?
            .ok_or(GameError::NotFound(id))?;
        self.inner
            .engine
            .validate_position(session.position())
            .map_err(|e| StoreError::corrupt(format!("Stored position unusable: {}", e)))?;
        Ok(session)
    }

    /// Archives a finished session, then evicts it from the active store.
    async fn archive_and_evict(&self, session: &Session) -> Result<(), StoreError> {
        let record = ArchivedGame::from_session(session, self.inner.time.now());
        match self.bounded("archive", self.inner.archive.archive(&record)).await {
            Ok(()) => {}
            Err(e) if e.is_already_archived() => {
                debug!(session_id = %session.id(), "Archive already holds session");
            }
            Err(e) => return Err(e),
        }
        self.bounded("active delete", self.inner.active.delete(*session.id()))
            .await?;
        info!(session_id = %session.id(), "Session archived and evicted");
        Ok(())
    }

    /// Creates a session and stores it.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::InvalidRequest`] for unusable participant ids, or
    /// [`GameError::Persistence`] if the session could not be stored.
    #[instrument(skip(self))]
    pub async fn create(
        &self,
        white_id: ParticipantId,
        black_id: ParticipantId,
        time_control: TimeControl,
    ) -> Result<Session, GameError> {
        let session = Session::create(
            white_id,
            black_id,
            time_control,
            self.inner.engine.as_ref(),
            self.inner.time.now(),
        )?;
        self.bounded("active save", self.inner.active.save(&session))
            .await?;
        Ok(session)
    }

    /// Applies a move to a stored session, persists the result, and
    /// publishes it to the session's subscribers.
    ///
    /// Moves for the same session are processed one at a time regardless of
    /// where they came from.
    ///
    /// # Errors
    ///
    /// - [`GameError::NotFound`] if the session is not in the active store
    /// - [`GameError::Validation`] if the move is rejected
    /// - [`GameError::Persistence`] if the new state could not be stored
    #[instrument(skip(self), fields(session_id = %id))]
    pub async fn process_move(
        &self,
        id: SessionId,
        participant: &str,
        notation: &str,
    ) -> Result<Session, GameError> {
        let _guard = self.inner.locks.acquire(id).await;
        let mut session = self.load(id).await?;

        if session.is_finished() {
            warn!("Finished session still in active store, completing archival");
            if let Err(e) = self.archive_and_evict(&session).await {
                error!(error = %e, "Archival retry failed");
            }
            return Err(MoveError::AlreadyFinished.into());
        }

        let transition = session.apply_move(
            self.inner.engine.as_ref(),
            participant,
            notation,
            self.inner.time.now(),
        )?;

        self.bounded("active update", self.inner.active.update(&session))
            .await?;
        if session.is_finished() {
            if let Err(e) = self.archive_and_evict(&session).await {
                error!(error = %e, "Archival failed, finished session kept in active store");
            }
        }
        // Still under the session lock: publication order is application order.
        self.inner.hub.publish_session(&session);

        info!(participant, notation, ?transition, moves = session.history().len(), "Move processed");
        Ok(session)
    }

    /// Loads a session from the active store.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::NotFound`] once the session has been archived.
    #[instrument(skip(self))]
    pub async fn get(&self, id: SessionId) -> Result<Session, GameError> {
        self.load(id).await
    }

    /// Loads a finished game from the archive.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::NotFound`] if the game has not been archived.
    #[instrument(skip(self))]
    pub async fn get_archived(&self, id: SessionId) -> Result<ArchivedGame, GameError> {
        self.bounded("archive find", self.inner.archive.find(id))
            .await?
            .ok_or(GameError::NotFound(id))
    }

    /// Records whether a seated participant is connected.
    ///
    /// Spectators and finished sessions are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::NotFound`] or [`GameError::Persistence`].
    #[instrument(skip(self))]
    pub async fn set_presence(
        &self,
        id: SessionId,
        participant: &str,
        status: PresenceStatus,
    ) -> Result<(), GameError> {
        let _guard = self.inner.locks.acquire(id).await;
        let mut session = self.load(id).await?;
        if session.set_presence(participant, status) {
            self.bounded("active update", self.inner.active.update(&session))
                .await?;
            debug!(%status, "Presence recorded");
        }
        Ok(())
    }

    /// Completes archival of a finished session left in the active store.
    ///
    /// Does nothing for sessions still in play.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::NotFound`] or [`GameError::Persistence`].
    #[instrument(skip(self))]
    pub async fn reconcile(&self, id: SessionId) -> Result<(), GameError> {
        let _guard = self.inner.locks.acquire(id).await;
        let session = self.load(id).await?;
        if session.is_finished() {
            self.archive_and_evict(&session).await?;
        }
        Ok(())
    }
}
