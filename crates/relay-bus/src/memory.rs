//! In-process bus over `tokio::sync::broadcast`.

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::{BusStream, EventBus};

/// Single-process bus. A subscriber that falls more than `capacity` events
/// behind skips the events it missed.
#[derive(Clone)]
pub struct InMemoryBus {
    tx: broadcast::Sender<String>,
}

impl InMemoryBus {
    /// Create a bus buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[async_trait]
impl EventBus for InMemoryBus {
    async fn publish(&self, payload: String) -> Result<()> {
        // Publishing with no subscribers is not an error on a best-effort bus.
        if self.tx.send(payload).is_err() {
            debug!("published with no subscribers");
        }
        Ok(())
    }

    async fn subscribe(&self) -> Result<BusStream> {
        let stream = BroadcastStream::new(self.tx.subscribe()).filter_map(|item| async move {
            match item {
                Ok(payload) => Some(payload),
                Err(BroadcastStreamRecvError::Lagged(n)) => {
                    warn!(lagged = n, "bus subscriber lagged, events skipped");
                    None
                }
            }
        });
        Ok(stream.boxed())
    }
}
