//! Presence fan-out on join and leave.

use std::sync::Arc;

use metrics::counter;
use parking_lot::Mutex;
use relay_core::{Identity, OutboundFrame};
use tracing::{debug, info, warn};

use super::connection::ClientConnection;
use super::registry::ConnectionRegistry;
use crate::metrics::{PRESENCE_BROADCASTS_TOTAL, WS_SUPERSEDED_TOTAL};

/// Keeps every client's view of who is online current.
///
/// Each membership change is followed by a full snapshot of the connected
/// identities sent to every live connection.
pub struct PresenceBroadcaster {
    registry: Arc<ConnectionRegistry>,
    fanout: Mutex<()>,
}

impl PresenceBroadcaster {
    /// Create a broadcaster over `registry`.
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            registry,
            fanout: Mutex::new(()),
        }
    }

    /// The registry this broadcaster publishes.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Register `conn`, close whatever it superseded, then announce.
    pub fn join(&self, conn: &Arc<ClientConnection>) {
        let superseded = self
            .registry
            .register(conn.clone())
            .filter(|previous| !Arc::ptr_eq(previous, conn));
        if let Some(previous) = superseded {
            info!(
                identity = %conn.identity(),
                superseded = %previous.id,
                "closing superseded connection"
            );
            counter!(WS_SUPERSEDED_TOTAL).increment(1);
            let _ = previous.close();
        }
        let _ = self.broadcast();
    }

    /// Unregister `conn` and announce if it was still the live entry.
    ///
    /// A superseded connection leaving changes nothing, so nothing is sent.
    pub fn leave(&self, conn: &Arc<ClientConnection>) -> bool {
        let removed = self.registry.unregister(conn.identity(), conn);
        if removed {
            let _ = self.broadcast();
        }
        removed
    }

    /// Send the current presence snapshot to every live connection.
    ///
    /// Snapshot and enqueue run under one fan-out lock, so frames reach each
    /// queue in snapshot order and the last frame a connection receives
    /// reflects every membership change made before it. Enqueueing never
    /// blocks and the registry lock is released before the fan-out.
    ///
    /// Returns the number of connections the frame was queued for.
    pub fn broadcast(&self) -> usize {
        let _fanout = self.fanout.lock();
        let sessions = self.registry.snapshot_sessions();
        let mut users: Vec<Identity> = sessions.iter().map(|c| c.identity().clone()).collect();
        users.sort();

        let json = match OutboundFrame::presence(users).encode() {
            Ok(json) => Arc::new(json),
            Err(e) => {
                warn!(error = %e, "failed to encode presence frame");
                return 0;
            }
        };

        let delivered = sessions
            .iter()
            .filter(|conn| conn.enqueue(json.clone()))
            .count();
        counter!(PRESENCE_BROADCASTS_TOTAL).increment(1);
        debug!(recipients = sessions.len(), delivered, "presence broadcast");
        delivered
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
