//! Event bridge: bus subscription to per-participant delivery.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use metrics::counter;
use relay_bus::{BusStream, EventBus};
use relay_core::BusEvent;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::registry::ConnectionRegistry;
use crate::metrics::{BUS_EVENTS_DELIVERED_TOTAL, BUS_EVENTS_MALFORMED_TOTAL, BUS_EVENTS_TOTAL};

/// Delivers bus events to the participants connected to this process.
pub struct EventBridge {
    bus: Arc<dyn EventBus>,
    registry: Arc<ConnectionRegistry>,
    shutdown: CancellationToken,
    resubscribe_delay: Duration,
}

impl EventBridge {
    /// Create a bridge that stops when `shutdown` is cancelled.
    pub fn new(
        bus: Arc<dyn EventBus>,
        registry: Arc<ConnectionRegistry>,
        shutdown: CancellationToken,
        resubscribe_delay: Duration,
    ) -> Self {
        Self {
            bus,
            registry,
            shutdown,
            resubscribe_delay,
        }
    }

    /// Subscribe and spawn the delivery task.
    ///
    /// The first subscription happens before spawning so a bus that cannot
    /// be reached at startup is reported to the caller.
    pub async fn start(self) -> relay_bus::Result<JoinHandle<()>> {
        let stream = self.bus.subscribe().await?;
        info!("event bridge subscribed");
        Ok(tokio::spawn(self.run(stream)))
    }

    #[instrument(skip_all, name = "event_bridge")]
    async fn run(self, mut stream: BusStream) {
        loop {
            self.pump(&mut stream).await;
            if self.shutdown.is_cancelled() {
                break;
            }

            warn!(delay = ?self.resubscribe_delay, "bus subscription ended, resubscribing");
            match self.resubscribe().await {
                Some(next) => stream = next,
                None => break,
            }
        }
        info!("event bridge stopped");
    }

    /// Deliver events until the stream ends or shutdown is requested.
    async fn pump(&self, stream: &mut BusStream) {
        loop {
            tokio::select! {
                () = self.shutdown.cancelled() => return,
                item = stream.next() => match item {
                    Some(payload) => {
                        let _ = self.dispatch(&payload);
                    }
                    None => return,
                },
            }
        }
    }

    /// Retry the subscription after the configured delay until it succeeds
    /// or shutdown is requested.
    async fn resubscribe(&self) -> Option<BusStream> {
        loop {
            tokio::select! {
                () = self.shutdown.cancelled() => return None,
                () = tokio::time::sleep(self.resubscribe_delay) => {}
            }
            match self.bus.subscribe().await {
                Ok(stream) => {
                    info!("event bridge resubscribed");
                    return Some(stream);
                }
                Err(e) => warn!(error = %e, "bus resubscribe failed"),
            }
        }
    }

    /// Decode one bus payload and enqueue it for each locally connected
    /// participant. Returns the number of connections it was queued for.
    pub fn dispatch(&self, payload: &str) -> usize {
        counter!(BUS_EVENTS_TOTAL).increment(1);
        let event: BusEvent = match serde_json::from_str(payload) {
            Ok(event) => event,
            Err(e) => {
                counter!(BUS_EVENTS_MALFORMED_TOTAL).increment(1);
                warn!(error = %e, "skipping malformed bus event");
                return 0;
            }
        };

        let json = match event.to_outbound().encode() {
            Ok(json) => Arc::new(json),
            Err(e) => {
                warn!(error = %e, "failed to encode outbound frame");
                return 0;
            }
        };

        let mut seen = HashSet::new();
        let mut delivered = 0;
        for participant in &event.participants {
            if !seen.insert(participant.as_str()) {
                continue;
            }
            // Absent identities are connected elsewhere or offline.
            if self
                .registry
                .get(participant)
                .is_some_and(|conn| conn.enqueue(json.clone()))
            {
                delivered += 1;
            }
        }

        counter!(BUS_EVENTS_DELIVERED_TOTAL).increment(delivered as u64);
        debug!(
            conversation_id = %event.conversation_id,
            participants = event.participants.len(),
            delivered,
            "bus event dispatched"
        );
        delivered
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
