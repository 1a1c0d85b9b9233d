//! WebSocket session lifecycle: handles a single authenticated client from
//! upgrade through disconnect.

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket, close_code};
use futures::{Sink, SinkExt, Stream, StreamExt};
use metrics::{counter, gauge, histogram};
use relay_core::errors::INVALID_PAYLOAD;
use relay_core::{ConnectionId, Identity, OutboundFrame};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{Instrument, debug, info, instrument, warn};

use super::connection::ClientConnection;
use super::handler::CommandProcessor;
use super::presence::PresenceBroadcaster;
use crate::config::SessionLimits;
use crate::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL,
};

/// Everything a session needs besides its socket.
pub struct SessionContext {
    /// Registry plus presence fan-out.
    pub presence: Arc<PresenceBroadcaster>,
    /// Inbound command handling.
    pub processor: Arc<CommandProcessor>,
    /// Per-connection limits.
    pub limits: SessionLimits,
}

/// Run a WebSocket session for an authenticated client.
///
/// 1. Registers the connection (superseding any previous one for the same
///    identity) and broadcasts presence
/// 2. Spawns the outbound loop, the only writer to the socket
/// 3. Reads inbound frames until the client leaves, the read deadline
///    expires, or the connection is closed from elsewhere
/// 4. Closes, unregisters, and re-broadcasts presence if still current
#[instrument(skip_all, fields(connection_id, identity = %identity))]
pub async fn run_ws_session(ws: WebSocket, identity: Identity, ctx: Arc<SessionContext>) {
    let (ws_tx, ws_rx) = ws.split();
    let (conn, queue) = ClientConnection::new(ConnectionId::new(), identity, ctx.limits.queue_capacity);
    let conn = Arc::new(conn);
    let _ = tracing::Span::current().record("connection_id", conn.id.as_str());

    info!("client connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    ctx.presence.join(&conn);

    let outbound = tokio::spawn(
        run_outbound(ws_tx, queue, conn.clone(), ctx.limits).in_current_span(),
    );

    run_inbound(ws_rx, &conn, &ctx.processor, ctx.limits.read_timeout).await;

    let _ = conn.close();
    let _ = ctx.presence.leave(&conn);
    let _ = outbound.await;

    let age = conn.age();
    info!(duration_secs = age.as_secs(), "client disconnected");
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(age.as_secs_f64());
}

/// Read frames until the stream ends, a read fails, the deadline passes, or
/// the connection is closed locally.
pub(crate) async fn run_inbound<S, E>(
    mut ws_rx: S,
    conn: &ClientConnection,
    processor: &CommandProcessor,
    read_timeout: Duration,
) where
    S: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    loop {
        let next = tokio::select! {
            () = conn.wait_closed() => {
                debug!("connection closed locally");
                break;
            }
            next = tokio::time::timeout(read_timeout, ws_rx.next()) => next,
        };

        let msg = match next {
            Err(_) => {
                info!(?read_timeout, "read deadline expired");
                break;
            }
            Ok(None) => {
                debug!("client stream ended");
                break;
            }
            Ok(Some(Err(e))) => {
                debug!(error = %e, "websocket read failed");
                break;
            }
            Ok(Some(Ok(msg))) => msg,
        };

        match msg {
            Message::Text(text) => respond(conn, processor, text.as_str()).await,
            Message::Binary(data) => {
                if let Ok(text) = std::str::from_utf8(&data) {
                    respond(conn, processor, text).await;
                } else {
                    debug!(len = data.len(), "non-UTF-8 binary frame");
                    let _ = conn.enqueue_frame(&OutboundFrame::error(INVALID_PAYLOAD));
                }
            }
            // Any frame, keepalives included, has already refreshed the deadline.
            Message::Ping(_) | Message::Pong(_) => {}
            Message::Close(_) => {
                info!("client sent close frame");
                break;
            }
        }
    }
}

async fn respond(conn: &ClientConnection, processor: &CommandProcessor, text: &str) {
    if let Some(reply) = processor.handle(conn.identity(), text).await {
        let _ = conn.enqueue_frame(&reply);
    }
}

/// Drain the outbound queue to the socket, pinging on an idle timer.
///
/// Exits on the first failed or overdue write, or after sending a close
/// frame once the queue is closed. Always closes the connection on exit.
pub(crate) async fn run_outbound<W>(
    mut ws_tx: W,
    mut queue: mpsc::Receiver<Arc<String>>,
    conn: Arc<ClientConnection>,
    limits: SessionLimits,
) where
    W: Sink<Message> + Unpin,
    W::Error: Display,
{
    let mut ping = tokio::time::interval(limits.ping_interval);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // Skip the immediate first tick
    let _ = ping.tick().await;

    loop {
        tokio::select! {
            biased;
            frame = queue.recv() => match frame {
                Some(json) => {
                    let msg = Message::Text(json.as_str().into());
                    if !write(&mut ws_tx, msg, limits.write_timeout).await {
                        break;
                    }
                }
                None => {
                    let close = Message::Close(Some(CloseFrame {
                        code: close_code::NORMAL,
                        reason: "".into(),
                    }));
                    let _ = write(&mut ws_tx, close, limits.write_timeout).await;
                    break;
                }
            },
            _ = ping.tick() => {
                if !write(&mut ws_tx, Message::Ping(Vec::new().into()), limits.write_timeout).await {
                    break;
                }
            }
        }
    }

    let _ = conn.close();
}

async fn write<W>(ws_tx: &mut W, msg: Message, deadline: Duration) -> bool
where
    W: Sink<Message> + Unpin,
    W::Error: Display,
{
    match tokio::time::timeout(deadline, ws_tx.send(msg)).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            debug!(error = %e, "websocket write failed");
            false
        }
        Err(_) => {
            warn!(?deadline, "websocket write deadline exceeded");
            false
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
