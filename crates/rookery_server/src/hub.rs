//! Per-session registry of live connections.
//!
//! Each session id owns a room with its own lock. Registration, removal and
//! broadcast for one session are mutually exclusive; different sessions never
//! contend beyond a brief lookup in the room map. No lock is held across an
//! await: delivery is a non-blocking enqueue onto each subscriber's bounded
//! outbox.

use rookery_core::{ParticipantId, Session, SessionId};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, error, info, instrument, warn};

use crate::events::{self, EventType, Frame, GameOverPayload, PlayerDisconnectedPayload};

/// Identifies one registration in the hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
#[display("conn-{_0}")]
pub struct ConnectionId(u64);

/// Result of removing a connection.
#[derive(Debug, Clone, PartialEq, Eq, derive_getters::Getters)]
pub struct Departure {
    /// Identity the connection was registered under.
    participant: ParticipantId,
    /// Whether the participant still has other live connections.
    still_connected: bool,
}

#[derive(Debug)]
struct Subscriber {
    id: ConnectionId,
    participant: ParticipantId,
    outbox: mpsc::Sender<Frame>,
}

#[derive(Debug, Default)]
struct Room {
    members: Vec<Subscriber>,
    /// Set once the room emptied and is leaving the map; never reused.
    closed: bool,
}

impl Room {
    /// Enqueues `frame` to every member, evicting any whose outbox is full or
    /// closed. Each eviction is announced to the members that remain.
    fn deliver(&mut self, session: SessionId, frame: &Frame) -> usize {
        let mut delivered = 0;
        let mut evicted = Vec::new();
        self.members.retain(|member| match member.outbox.try_send(Frame::clone(frame)) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                warn!(%session, connection = %member.id, "Outbox full, evicting subscriber");
                evicted.push(member.participant.clone());
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!(%session, connection = %member.id, "Outbox closed, evicting subscriber");
                evicted.push(member.participant.clone());
                false
            }
        });
        for participant in evicted {
            self.announce_departure(session, participant);
        }
        delivered
    }

    fn announce_departure(&mut self, session: SessionId, participant: ParticipantId) {
        let payload = PlayerDisconnectedPayload {
            participant_id: participant,
        };
        match events::encode(EventType::PlayerDisconnected, &payload) {
            Ok(frame) => {
                self.deliver(session, &frame);
            }
            Err(e) => error!(error = %e, "Failed to encode disconnect notice"),
        }
    }
}

/// Registry of live subscribers, keyed by session id.
#[derive(Debug, Default)]
pub struct Hub {
    rooms: Mutex<HashMap<SessionId, Arc<Mutex<Room>>>>,
    next_id: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Hub {
    /// Creates an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    fn room(&self, session: SessionId) -> Option<Arc<Mutex<Room>>> {
        lock(&self.rooms).get(&session).cloned()
    }

    fn room_or_insert(&self, session: SessionId) -> Arc<Mutex<Room>> {
        Arc::clone(lock(&self.rooms).entry(session).or_default())
    }

    /// Removes `room` from the map if it is still the entry for `session`.
    fn drop_room(&self, session: SessionId, room: &Arc<Mutex<Room>>) {
        let mut rooms = lock(&self.rooms);
        if rooms.get(&session).is_some_and(|current| Arc::ptr_eq(current, room)) {
            rooms.remove(&session);
            debug!(%session, "Room closed");
        }
    }

    /// Adds a subscriber to a session's room.
    #[instrument(skip(self, outbox))]
    pub fn register(
        &self,
        session: SessionId,
        participant: ParticipantId,
        outbox: mpsc::Sender<Frame>,
    ) -> ConnectionId {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        loop {
            let room = self.room_or_insert(session);
            let mut guard = lock(&room);
            if guard.closed {
                // Lost a race with the last member leaving; the map entry is
                // about to go, so fetch a fresh room.
                drop(guard);
                self.drop_room(session, &room);
                continue;
            }
            guard.members.push(Subscriber {
                id,
                participant,
                outbox,
            });
            info!(%id, members = guard.members.len(), "Subscriber registered");
            return id;
        }
    }

    /// Removes a subscriber and tells the rest of the room who left.
    ///
    /// Returns `None` if the connection was not registered, e.g. because it
    /// was already evicted.
    #[instrument(skip(self))]
    pub fn unregister(&self, session: SessionId, connection: ConnectionId) -> Option<Departure> {
        let room = self.room(session)?;
        let (departure, emptied) = {
            let mut guard = lock(&room);
            let position = guard.members.iter().position(|m| m.id == connection)?;
            let member = guard.members.remove(position);
            let still_connected = guard
                .members
                .iter()
                .any(|m| m.participant == member.participant);
            info!(participant = %member.participant, members = guard.members.len(), "Subscriber unregistered");
            guard.announce_departure(session, member.participant.clone());
            let emptied = guard.members.is_empty();
            if emptied {
                guard.closed = true;
            }
            (
                Departure {
                    participant: member.participant,
                    still_connected,
                },
                emptied,
            )
        };
        if emptied {
            self.drop_room(session, &room);
        }
        Some(departure)
    }

    /// Sends one event to every subscriber of a session.
    ///
    /// Returns the number of subscribers the event was enqueued for.
    #[instrument(skip(self, payload))]
    pub fn broadcast<P: Serialize + ?Sized>(
        &self,
        session: SessionId,
        kind: EventType,
        payload: &P,
    ) -> usize {
        let frame = match events::encode(kind, payload) {
            Ok(frame) => frame,
            Err(e) => {
                error!(error = %e, "Failed to encode event");
                return 0;
            }
        };
        let Some(room) = self.room(session) else {
            return 0;
        };
        let (delivered, emptied) = {
            let mut guard = lock(&room);
            let delivered = guard.deliver(session, &frame);
            let emptied = guard.members.is_empty() && !guard.closed;
            if emptied {
                guard.closed = true;
            }
            (delivered, emptied)
        };
        if emptied {
            self.drop_room(session, &room);
        }
        debug!(delivered, "Event broadcast");
        delivered
    }

    /// Broadcasts the session state, plus the result if it just finished.
    pub fn publish_session(&self, session: &Session) -> usize {
        let delivered = self.broadcast(*session.id(), EventType::GameUpdate, session);
        if let Some(result) = GameOverPayload::from_session(session) {
            info!(session_id = %session.id(), winner = %result.winner, reason = %result.reason, "Publishing result");
            self.broadcast(*session.id(), EventType::GameOver, &result);
        }
        delivered
    }

    /// Number of live subscribers for a session.
    pub fn subscriber_count(&self, session: SessionId) -> usize {
        self.room(session)
            .map(|room| lock(&room).members.len())
            .unwrap_or(0)
    }

    /// Returns true if `participant` has a live connection to the session.
    pub fn is_connected(&self, session: SessionId, participant: &str) -> bool {
        self.room(session)
            .is_some_and(|room| lock(&room).members.iter().any(|m| m.participant == participant))
    }

    /// Number of sessions with at least one subscriber.
    pub fn room_count(&self) -> usize {
        lock(&self.rooms).len()
    }
}
