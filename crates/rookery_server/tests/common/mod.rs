//! Shared fixtures for server integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use rookery_core::{SessionId, StandardChess};
use rookery_server::{
    ArchiveStore, ArchivedGame, GameService, Hub, InMemoryActiveStore, InMemoryArchiveStore,
    StoreError, TimeSource,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualTime(Mutex<DateTime<Utc>>);

impl ManualTime {
    pub fn new() -> Arc<Self> {
        Arc::new(Self(Mutex::new(Utc::now())))
    }

    pub fn advance(&self, seconds: i64) {
        *self.0.lock().unwrap() += TimeDelta::seconds(seconds);
    }
}

impl TimeSource for ManualTime {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

/// Archive that rejects the first `failures` writes, then delegates.
#[derive(Debug, Default)]
pub struct FlakyArchive {
    failures: AtomicUsize,
    inner: InMemoryArchiveStore,
}

impl FlakyArchive {
    pub fn failing(failures: usize) -> Arc<Self> {
        Arc::new(Self {
            failures: AtomicUsize::new(failures),
            inner: InMemoryArchiveStore::new(),
        })
    }
}

#[async_trait]
impl ArchiveStore for FlakyArchive {
    async fn archive(&self, game: &ArchivedGame) -> Result<(), StoreError> {
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(StoreError::backend("archive unavailable"));
        }
        self.inner.archive(game).await
    }

    async fn find(&self, id: SessionId) -> Result<Option<ArchivedGame>, StoreError> {
        self.inner.find(id).await
    }
}

/// Service wired to in-memory stores, a manual clock and a shared hub.
pub struct Harness {
    pub service: GameService,
    pub hub: Arc<Hub>,
    pub active: Arc<InMemoryActiveStore>,
    pub archive: Arc<dyn ArchiveStore>,
    pub time: Arc<ManualTime>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_archive(Arc::new(InMemoryArchiveStore::new()))
    }

    pub fn with_archive(archive: Arc<dyn ArchiveStore>) -> Self {
        let active = Arc::new(InMemoryActiveStore::new(Duration::from_secs(86_400)));
        let time = ManualTime::new();
        let hub = Arc::new(Hub::new());
        let service = GameService::builder(active.clone(), archive.clone(), Arc::new(StandardChess))
            .time_source(time.clone())
            .hub(hub.clone())
            .build();
        Self {
            service,
            hub,
            active,
            archive,
            time,
        }
    }
}

/// Moves of the shortest checkmate, delivered by Black.
pub const FOOLS_MATE: [(&str, &str); 4] = [("a", "f3"), ("b", "e5"), ("a", "g4"), ("b", "Qh4#")];
