//! Rookery server: persistence, live fan-out and HTTP bindings for chess
//! sessions.
//!
//! # Architecture
//!
//! - [`GameService`] owns both stores and serializes every mutation of a
//!   session behind a per-session lock, publishing accepted moves to its hub
//!   before releasing it
//! - [`Hub`] tracks live subscribers per session and fans events out to their
//!   bounded outboxes
//! - [`connection::run`] drives one WebSocket subscriber
//! - [`router`] exposes the service over HTTP
//!
//! ```no_run
//! use rookery_core::StandardChess;
//! use rookery_server::{GameService, InMemoryActiveStore, InMemoryArchiveStore};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn demo() -> Result<(), rookery_server::GameError> {
//! let service = GameService::builder(
//!     Arc::new(InMemoryActiveStore::new(Duration::from_secs(86_400))),
//!     Arc::new(InMemoryArchiveStore::new()),
//!     Arc::new(StandardChess),
//! )
//! .build();
//!
//! let session = service
//!     .create("alice".into(), "bob".into(), rookery_core::TimeControl::new(600, 0))
//!     .await?;
//! service.process_move(*session.id(), "alice", "e4").await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod cli;
pub mod config;
pub mod connection;
pub mod events;
mod http;
mod hub;
mod locks;
mod service;
mod store;
mod time;

pub use config::{ConfigError, ServerConfig};
pub use connection::ConnectionConfig;
pub use events::{EventType, Frame};
pub use http::{AppState, ApiError, CreateGameRequest, LiveParams, MoveRequest, router};
pub use hub::{ConnectionId, Departure, Hub};
pub use locks::{KeyedGuard, KeyedLocks};
pub use service::{DEFAULT_STORE_TIMEOUT, GameError, GameService, GameServiceBuilder};
pub use store::{
    ActiveStore, ArchiveStore, ArchivedGame, InMemoryActiveStore, InMemoryArchiveStore,
    SqliteArchiveStore, StoreError, StoreErrorKind,
};
pub use time::{SystemTime, TimeSource};
