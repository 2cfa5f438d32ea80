//! Orchestrator behaviour against in-memory stores.

mod common;

use common::{FOOLS_MATE, FlakyArchive, Harness};
use rookery_core::{MoveError, PresenceStatus, ResultReason, SessionId, TimeControl, Winner};
use rookery_server::{ActiveStore, ArchiveStore, GameError, StoreErrorKind};
use std::sync::Arc;
use std::time::Duration;

fn tc(initial: u64, increment: u64) -> TimeControl {
    TimeControl::new(initial, increment)
}

#[tokio::test]
async fn test_create_move_and_reject_out_of_turn() {
    let h = Harness::new();
    let session = h.service.create("a".into(), "b".into(), tc(600, 0)).await.unwrap();
    let id = *session.id();

    h.time.advance(7);
    let after_e4 = h.service.process_move(id, "a", "e4").await.unwrap();
    assert_eq!(after_e4.history().len(), 1);
    assert_eq!(after_e4.white().time_remaining(), Duration::from_secs(600));
    assert_eq!(after_e4.black().time_remaining(), Duration::from_secs(600));

    h.time.advance(2);
    let after_e5 = h.service.process_move(id, "b", "e5").await.unwrap();
    assert_eq!(after_e5.history().len(), 2);
    assert_eq!(after_e5.black().time_remaining(), Duration::from_secs(598));

    let err = h.service.process_move(id, "b", "anything").await.unwrap_err();
    assert!(matches!(err, GameError::Validation(MoveError::WrongTurn(_))));

    // Rejected moves leave the stored session untouched.
    assert_eq!(h.service.get(id).await.unwrap(), after_e5);
}

#[tokio::test]
async fn test_black_cannot_open() {
    let h = Harness::new();
    let session = h.service.create("a".into(), "b".into(), tc(600, 0)).await.unwrap();
    let err = h.service.process_move(*session.id(), "b", "e5").await.unwrap_err();
    assert!(matches!(err, GameError::Validation(MoveError::NotWhiteStart)));
}

#[tokio::test]
async fn test_unknown_session_is_not_found() {
    let h = Harness::new();
    let missing = SessionId::new();
    assert!(matches!(h.service.get(missing).await, Err(GameError::NotFound(id)) if id == missing));
    assert!(matches!(
        h.service.process_move(missing, "a", "e4").await,
        Err(GameError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_invalid_participants_rejected() {
    let h = Harness::new();
    for (white, black) in [("", "b"), ("a", "a"), ("a", "draw")] {
        let err = h
            .service
            .create(white.into(), black.into(), tc(60, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, GameError::InvalidRequest(_)), "{white} vs {black}");
    }
}

#[tokio::test]
async fn test_timeout_finishes_and_archives() {
    let h = Harness::new();
    let session = h.service.create("a".into(), "b".into(), tc(1, 0)).await.unwrap();
    let id = *session.id();

    h.service.process_move(id, "a", "e4").await.unwrap();
    h.service.process_move(id, "b", "e5").await.unwrap();

    h.time.advance(5);
    // The clock flags before the notation is even looked at.
    let finished = h.service.process_move(id, "a", "not-a-move").await.unwrap();
    assert!(finished.is_finished());
    assert_eq!(finished.winner(), &Some(Winner::Participant("b".into())));
    assert_eq!(finished.result_reason(), &Some(ResultReason::Timeout));
    assert_eq!(finished.white().time_remaining(), Duration::ZERO);
    assert_eq!(finished.history().len(), 2);

    assert!(matches!(h.service.get(id).await, Err(GameError::NotFound(_))));
    let archived = h.service.get_archived(id).await.unwrap();
    assert_eq!(archived.session(), &finished);
}

#[tokio::test]
async fn test_finished_session_is_immutable_and_archived_exactly() {
    let h = Harness::new();
    let session = h.service.create("a".into(), "b".into(), tc(600, 0)).await.unwrap();
    let id = *session.id();

    let mut last = session;
    for (player, notation) in FOOLS_MATE {
        h.time.advance(1);
        last = h.service.process_move(id, player, notation).await.unwrap();
    }
    assert!(last.is_finished());
    assert_eq!(last.winner(), &Some(Winner::Participant("b".into())));
    assert_eq!(last.result_reason(), &Some(ResultReason::Checkmate));

    assert!(matches!(h.service.get(id).await, Err(GameError::NotFound(_))));
    assert!(matches!(
        h.service.process_move(id, "a", "e4").await,
        Err(GameError::NotFound(_))
    ));

    let archived = h.archive.find(id).await.unwrap().expect("Archived");
    assert_eq!(archived.session(), &last);
    assert_eq!(archived.history(), last.history());
    assert_eq!(archived.final_position(), last.position());
    assert_eq!(archived.white_id(), "a");
    assert_eq!(archived.black_id(), "b");
}

#[tokio::test]
async fn test_archive_failure_keeps_active_copy_until_reconciled() {
    let archive = FlakyArchive::failing(2);
    let h = Harness::with_archive(archive.clone());
    let session = h.service.create("a".into(), "b".into(), tc(600, 0)).await.unwrap();
    let id = *session.id();

    let mut last = session;
    for (player, notation) in FOOLS_MATE {
        last = h.service.process_move(id, player, notation).await.unwrap();
    }
    assert!(last.is_finished());

    // First archive attempt failed: the finished state is still authoritative.
    let held = h.service.get(id).await.unwrap();
    assert_eq!(held, last);
    assert!(archive.find(id).await.unwrap().is_none());

    // A late move is refused and retries archival, which fails once more.
    let err = h.service.process_move(id, "a", "e4").await.unwrap_err();
    assert!(matches!(err, GameError::Validation(MoveError::AlreadyFinished)));
    assert!(h.service.get(id).await.is_ok());

    h.service.reconcile(id).await.unwrap();
    assert!(matches!(h.service.get(id).await, Err(GameError::NotFound(_))));
    assert_eq!(archive.find(id).await.unwrap().unwrap().session(), &last);
}

#[tokio::test]
async fn test_reconcile_treats_existing_archive_as_confirmed() {
    let h = Harness::new();
    let session = h.service.create("a".into(), "b".into(), tc(600, 0)).await.unwrap();
    let id = *session.id();
    let mut last = session;
    for (player, notation) in FOOLS_MATE {
        last = h.service.process_move(id, player, notation).await.unwrap();
    }

    // Simulate a crash between archive and eviction.
    h.active.save(&last).await.unwrap();
    h.service.reconcile(id).await.unwrap();
    assert!(h.active.find(id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_reconcile_leaves_live_sessions_alone() {
    let h = Harness::new();
    let session = h.service.create("a".into(), "b".into(), tc(600, 0)).await.unwrap();
    h.service.reconcile(*session.id()).await.unwrap();
    assert!(h.service.get(*session.id()).await.is_ok());
}

#[tokio::test]
async fn test_concurrent_moves_accept_exactly_one() {
    let h = Harness::new();
    let session = h.service.create("a".into(), "b".into(), tc(600, 0)).await.unwrap();
    let id = *session.id();

    let candidates = ["e4", "d4", "c4", "Nf3", "g3", "b3", "e3", "d3"];
    let tasks: Vec<_> = candidates
        .iter()
        .map(|notation| {
            let service = h.service.clone();
            let notation = notation.to_string();
            tokio::spawn(async move { service.process_move(id, "a", &notation).await })
        })
        .collect();

    let mut accepted = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => accepted += 1,
            Err(GameError::Validation(MoveError::WrongTurn(_))) => {}
            Err(other) => panic!("Unexpected error: {other}"),
        }
    }
    assert_eq!(accepted, 1);

    let stored = h.service.get(id).await.unwrap();
    assert_eq!(stored.history().len(), 1);
    assert_eq!(stored.history()[0].player_id, "a");
}

#[tokio::test]
async fn test_presence_does_not_touch_updated_at() {
    let h = Harness::new();
    let session = h.service.create("a".into(), "b".into(), tc(600, 0)).await.unwrap();
    let id = *session.id();

    h.time.advance(30);
    h.service
        .set_presence(id, "b", PresenceStatus::Offline)
        .await
        .unwrap();
    h.service
        .set_presence(id, "spectator", PresenceStatus::Offline)
        .await
        .unwrap();

    let stored = h.service.get(id).await.unwrap();
    assert_eq!(stored.black().status(), PresenceStatus::Offline);
    assert_eq!(stored.white().status(), PresenceStatus::Online);
    assert_eq!(stored.updated_at(), session.updated_at());
}

#[tokio::test(start_paused = true)]
async fn test_slow_store_times_out() {
    use async_trait::async_trait;
    use rookery_core::Session;
    use rookery_server::{GameService, InMemoryArchiveStore, StoreError};

    struct StalledStore;

    #[async_trait]
    impl ActiveStore for StalledStore {
        async fn save(&self, _session: &Session) -> Result<(), StoreError> {
            std::future::pending().await
        }
        async fn find(&self, _id: SessionId) -> Result<Option<Session>, StoreError> {
            std::future::pending().await
        }
        async fn delete(&self, _id: SessionId) -> Result<(), StoreError> {
            std::future::pending().await
        }
    }

    let service = GameService::builder(
        Arc::new(StalledStore),
        Arc::new(InMemoryArchiveStore::new()),
        Arc::new(rookery_core::StandardChess),
    )
    .store_timeout(Duration::from_millis(200))
    .build();

    let err = service.get(SessionId::new()).await.unwrap_err();
    match err {
        GameError::Persistence(e) => assert_eq!(e.kind, StoreErrorKind::Timeout),
        other => panic!("Expected timeout, got {other}"),
    }
}
