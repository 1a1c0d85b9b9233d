//! Identity-keyed registry of live connections.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use relay_core::Identity;

use super::connection::ClientConnection;

/// At most one live connection per identity.
///
/// Registration replaces any existing entry for the same identity and hands
/// the superseded connection back to the caller, which closes it outside the
/// lock. Unregistration only removes the entry if it still refers to the
/// caller's own connection, so a late cleanup cannot evict a newer session.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<Identity, Arc<ClientConnection>>>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `conn` under its identity, returning the connection it replaced.
    pub fn register(&self, conn: Arc<ClientConnection>) -> Option<Arc<ClientConnection>> {
        let identity = conn.identity().clone();
        self.connections.write().insert(identity, conn)
    }

    /// Remove `conn` if it is still the registered connection for `identity`.
    ///
    /// Returns `true` if an entry was removed.
    pub fn unregister(&self, identity: &Identity, conn: &Arc<ClientConnection>) -> bool {
        let mut connections = self.connections.write();
        match connections.get(identity) {
            Some(current) if Arc::ptr_eq(current, conn) => {
                let _ = connections.remove(identity);
                true
            }
            _ => false,
        }
    }

    /// Look up the live connection for `identity`.
    pub fn get(&self, identity: &str) -> Option<Arc<ClientConnection>> {
        self.connections.read().get(identity).cloned()
    }

    /// Connected identities, sorted and unique.
    pub fn snapshot(&self) -> Vec<Identity> {
        let mut identities: Vec<Identity> = self.connections.read().keys().cloned().collect();
        identities.sort();
        identities
    }

    /// Every live connection. Taken under the read lock and returned owned so
    /// callers can enqueue without holding it.
    pub fn snapshot_sessions(&self) -> Vec<Arc<ClientConnection>> {
        self.connections.read().values().cloned().collect()
    }

    /// Number of registered connections.
    pub fn len(&self) -> usize {
        self.connections.read().len()
    }

    /// Whether no connection is registered.
    pub fn is_empty(&self) -> bool {
        self.connections.read().is_empty()
    }

    /// Close every registered connection. Entries are removed by each
    /// session's own teardown.
    pub fn close_all(&self) -> usize {
        let sessions = self.snapshot_sessions();
        sessions.iter().filter(|conn| conn.close()).count()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
