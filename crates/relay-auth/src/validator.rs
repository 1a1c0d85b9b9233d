//! Token → identity validation.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use relay_core::Identity;
use tracing::{debug, instrument};

use crate::errors::{AuthError, Result};
use crate::store::SessionStore;

/// Turns an opaque session token into an [`Identity`].
///
/// Read-only: validation never extends, refreshes, or deletes a session.
#[derive(Clone)]
pub struct SessionValidator {
    store: Arc<dyn SessionStore>,
    timeout: Duration,
}

impl SessionValidator {
    /// Validate against `store`, giving each lookup at most `timeout`.
    pub fn new(store: Arc<dyn SessionStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Validate `token` against the current wall clock.
    pub async fn validate(&self, token: &str) -> Result<Identity> {
        self.validate_at(token, Utc::now()).await
    }

    /// Validate `token` as of `now`.
    #[instrument(skip_all)]
    pub async fn validate_at(&self, token: &str, now: DateTime<Utc>) -> Result<Identity> {
        if token.is_empty() {
            return Err(AuthError::Unauthenticated);
        }

        let record = tokio::time::timeout(self.timeout, self.store.lookup(token))
            .await
            .map_err(|_| AuthError::Timeout(self.timeout))??;

        match record {
            Some(record) if record.is_valid_at(now) => Ok(record.identity),
            Some(record) => {
                debug!(identity = %record.identity, expires_at = %record.expires_at, "session expired");
                Err(AuthError::Unauthenticated)
            }
            None => Err(AuthError::Unauthenticated),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
