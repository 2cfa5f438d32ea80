//! One live subscriber of a session.
//!
//! A connection runs two tasks: a reader that decodes client requests and a
//! writer that drains the connection's outbox onto the socket and sends
//! keepalive pings. When either task ends the other is stopped and the
//! connection leaves the hub.
//!
//! The hub holds the only strong handle to the outbox. The connection keeps a
//! weak one for its own replies, so eviction by the hub closes the outbox and
//! ends the writer.

use axum::extract::ws::Message;
use derive_getters::Getters;
use futures::{Sink, SinkExt, Stream, StreamExt};
use rookery_core::{ParticipantId, PresenceStatus, SessionId};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior, interval_at, timeout};
use tracing::{Instrument, debug, info, instrument, warn};

use crate::events::{self, EventType, Frame, Inbound, MovePayload};
use crate::hub::Hub;
use crate::service::GameService;

/// Timing and buffering limits for live connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Getters, derive_new::new)]
pub struct ConnectionConfig {
    /// Frames that may queue for one connection before it is evicted.
    outbox_capacity: usize,
    /// Interval between keepalive pings; shorter than the peer's read deadline.
    keepalive: Duration,
    /// Longest silence tolerated from the peer.
    read_deadline: Duration,
    /// Bound on a single socket write.
    write_deadline: Duration,
    /// Largest inbound frame accepted, in bytes.
    max_frame: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            outbox_capacity: 256,
            keepalive: Duration::from_secs(54),
            read_deadline: Duration::from_secs(60),
            write_deadline: Duration::from_secs(10),
            max_frame: 512 * 1024,
        }
    }
}

/// Everything the reader needs to act on behalf of the connection.
#[derive(Clone)]
struct Context {
    service: GameService,
    hub: Arc<Hub>,
    session: SessionId,
    participant: ParticipantId,
    outbox: mpsc::WeakSender<Frame>,
}

impl Context {
    /// Queues a frame for this connection only.
    fn reply<P: Serialize + ?Sized>(&self, kind: EventType, payload: &P) {
        let Some(outbox) = self.outbox.upgrade() else {
            debug!("Outbox already closed, dropping reply");
            return;
        };
        match events::encode(kind, payload) {
            Ok(frame) => {
                if outbox.try_send(frame).is_err() {
                    warn!(%kind, "Outbox unavailable, dropping reply");
                }
            }
            Err(e) => warn!(error = %e, "Failed to encode reply"),
        }
    }

    async fn sync(&self) {
        match self.service.get(self.session).await {
            Ok(state) => self.reply(EventType::GameUpdate, &state),
            Err(e) => self.reply(EventType::Error, &e.to_string()),
        }
    }

    async fn handle_frame(&self, text: &str) {
        let Some(request) = Inbound::decode(text) else {
            debug!(len = text.len(), "Discarding malformed frame");
            return;
        };
        match request {
            Inbound::Move(MovePayload { notation }) => {
                // Accepted moves reach every subscriber through the hub.
                if let Err(e) = self
                    .service
                    .process_move(self.session, &self.participant, &notation)
                    .await
                {
                    debug!(error = %e, %notation, "Move rejected");
                    self.reply(EventType::Error, &e.to_string());
                }
            }
        }
    }

    async fn set_presence(&self, status: PresenceStatus) {
        if let Err(e) = self
            .service
            .set_presence(self.session, &self.participant, status)
            .await
        {
            debug!(error = %e, %status, "Presence not recorded");
        }
    }
}

/// Serves one subscriber until either side of the link fails.
///
/// `reader` and `writer` are the two halves of the socket. The connection
/// joins the hub owned by `service`.
#[instrument(skip_all, fields(session_id = %session, participant = %participant))]
pub async fn run<R, W>(
    service: GameService,
    config: ConnectionConfig,
    session: SessionId,
    participant: ParticipantId,
    reader: R,
    writer: W,
) where
    R: Stream<Item = Result<Message, axum::Error>> + Send + Unpin + 'static,
    W: Sink<Message, Error = axum::Error> + Send + Unpin + 'static,
{
    let hub = Arc::clone(service.hub());
    let (tx, rx) = mpsc::channel(config.outbox_capacity);
    let ctx = Context {
        service,
        hub: Arc::clone(&hub),
        session,
        participant: participant.clone(),
        outbox: tx.downgrade(),
    };
    let connection = hub.register(session, participant.clone(), tx);
    info!(%connection, "Connection opened");

    ctx.set_presence(PresenceStatus::Online).await;
    ctx.sync().await;

    let mut writer_task = tokio::spawn(write_loop(rx, writer, config).in_current_span());
    let mut reader_task =
        tokio::spawn(read_loop(reader, ctx.clone(), config.read_deadline).in_current_span());

    tokio::select! {
        _ = &mut reader_task => {
            let departure = hub.unregister(session, connection);
            // Unregistering drops the last sender; the writer flushes and closes.
            if timeout(config.write_deadline, &mut writer_task).await.is_err() {
                debug!("Writer did not finish in time, aborting");
                writer_task.abort();
            }
            finish(&ctx, departure.map(|d| *d.still_connected())).await;
        }
        _ = &mut writer_task => {
            reader_task.abort();
            let departure = hub.unregister(session, connection);
            finish(&ctx, departure.map(|d| *d.still_connected())).await;
        }
    }
    info!(%connection, "Connection closed");
}

async fn finish(ctx: &Context, still_connected: Option<bool>) {
    let still_connected =
        still_connected.unwrap_or_else(|| ctx.hub.is_connected(ctx.session, &ctx.participant));
    if !still_connected {
        ctx.set_presence(PresenceStatus::Offline).await;
    }
}

async fn read_loop<R>(mut reader: R, ctx: Context, read_deadline: Duration)
where
    R: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    loop {
        let message = match timeout(read_deadline, reader.next()).await {
            Err(_) => {
                warn!("Read deadline exceeded");
                return;
            }
            Ok(None) => {
                debug!("Peer closed stream");
                return;
            }
            Ok(Some(Err(e))) => {
                warn!(error = %e, "Transport error on read");
                return;
            }
            Ok(Some(Ok(message))) => message,
        };
        match message {
            Message::Text(text) => ctx.handle_frame(text.as_str()).await,
            Message::Binary(data) => match std::str::from_utf8(&data) {
                Ok(text) => ctx.handle_frame(text).await,
                Err(_) => debug!("Discarding non-UTF-8 binary frame"),
            },
            Message::Close(_) => {
                debug!("Peer sent close");
                return;
            }
            // Any traffic, pongs included, resets the read deadline.
            Message::Ping(_) | Message::Pong(_) => {}
        }
    }
}

async fn write_loop<W>(mut rx: mpsc::Receiver<Frame>, mut writer: W, config: ConnectionConfig)
where
    W: Sink<Message, Error = axum::Error> + Unpin,
{
    let mut keepalive = interval_at(Instant::now() + config.keepalive, config.keepalive);
    keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let message = tokio::select! {
            frame = rx.recv() => match frame {
                Some(frame) => Message::Text(String::from(&*frame).into()),
                None => {
                    debug!("Outbox closed, sending close frame");
                    if let Ok(Err(e)) = timeout(config.write_deadline, writer.send(Message::Close(None))).await {
                        debug!(error = %e, "Close frame not delivered");
                    }
                    return;
                }
            },
            _ = keepalive.tick() => Message::Ping(Default::default()),
        };
        match timeout(config.write_deadline, writer.send(message)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(error = %e, "Transport error on write");
                return;
            }
            Err(_) => {
                warn!("Write deadline exceeded");
                return;
            }
        }
    }
}
