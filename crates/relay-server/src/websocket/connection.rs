//! Per-client connection state and bounded outbound queue.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use metrics::counter;
use parking_lot::Mutex;
use relay_core::{ConnectionId, Identity, OutboundFrame};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::metrics::WS_QUEUE_OVERFLOWS_TOTAL;

/// One authenticated WebSocket client.
///
/// Producers (presence, the bus bridge, the client's own inbound loop) never
/// write to the socket. They [`enqueue`](Self::enqueue) encoded frames and the
/// session's outbound loop drains them in order. When the queue is full the
/// connection is closed rather than blocking the producer.
pub struct ClientConnection {
    /// Unique connection ID.
    pub id: ConnectionId,
    identity: Identity,
    /// Dropped on close so the outbound loop sees the end of the queue.
    tx: Mutex<Option<mpsc::Sender<Arc<String>>>>,
    closed: AtomicBool,
    shutdown: CancellationToken,
    /// When this connection was established.
    pub connected_at: Instant,
}

impl ClientConnection {
    /// Create a connection whose queue holds up to `capacity` frames.
    ///
    /// The returned receiver belongs to the outbound loop.
    pub fn new(
        id: ConnectionId,
        identity: Identity,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let conn = Self {
            id,
            identity,
            tx: Mutex::new(Some(tx)),
            closed: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
            connected_at: Instant::now(),
        };
        (conn, rx)
    }

    /// Authenticated identity bound at upgrade time.
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Queue an encoded frame for delivery.
    ///
    /// Returns `false` when the frame was not queued. A full queue closes the
    /// connection; a closed connection silently drops the frame.
    pub fn enqueue(&self, frame: Arc<String>) -> bool {
        let result = {
            let guard = self.tx.lock();
            match guard.as_ref() {
                Some(tx) => tx.try_send(frame),
                None => return false,
            }
        };

        match result {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(
                    connection_id = %self.id,
                    identity = %self.identity,
                    "outbound queue full, closing slow consumer"
                );
                counter!(WS_QUEUE_OVERFLOWS_TOTAL).increment(1);
                let _ = self.close();
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Encode and queue a single frame.
    pub fn enqueue_frame(&self, frame: &OutboundFrame) -> bool {
        match frame.encode() {
            Ok(json) => self.enqueue(Arc::new(json)),
            Err(e) => {
                warn!(connection_id = %self.id, error = %e, "failed to encode outbound frame");
                false
            }
        }
    }

    /// Close the connection. Only the first call has an effect.
    ///
    /// Returns `true` if this call performed the close.
    pub fn close(&self) -> bool {
        if self
            .closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        drop(self.tx.lock().take());
        self.shutdown.cancel();
        true
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Resolves once the connection is closed.
    pub async fn wait_closed(&self) {
        self.shutdown.cancelled().await;
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

impl std::fmt::Debug for ClientConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConnection")
            .field("id", &self.id)
            .field("identity", &self.identity)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
