//! Session store abstraction and an in-memory implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use relay_core::Identity;
use serde::{Deserialize, Serialize};

use crate::errors::Result;

/// A session as persisted by the issuing service.
///
/// The identity is stored under `email` because the issuing service keys
/// sessions by the address the one-time code was mailed to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Principal the token was issued to.
    #[serde(rename = "email")]
    pub identity: Identity,
    /// Instant after which the token is no longer valid.
    pub expires_at: DateTime<Utc>,
}

impl SessionRecord {
    /// A record is usable only while `now` is strictly before its expiry.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// Read-only lookup against the external session store.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Fetch the record bound to `token`, or `None` if the token is unknown.
    async fn lookup(&self, token: &str) -> Result<Option<SessionRecord>>;
}

/// Session store held in process memory, for tests and local development.
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, SessionRecord>>,
}

impl InMemorySessionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `token` to `record`, replacing any previous binding.
    pub fn insert(&self, token: impl Into<String>, record: SessionRecord) {
        let _ = self.sessions.write().insert(token.into(), record);
    }

    /// Drop the binding for `token`.
    pub fn revoke(&self, token: &str) -> bool {
        self.sessions.write().remove(token).is_some()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn lookup(&self, token: &str) -> Result<Option<SessionRecord>> {
        Ok(self.sessions.read().get(token).cloned())
    }
}
