//! Redis-backed session store.
//!
//! Each session lives at `<prefix><token>` as a JSON [`SessionRecord`].

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use tracing::debug;

use crate::errors::Result;
use crate::store::{SessionRecord, SessionStore};

/// Session store reading from Redis over a shared multiplexed connection.
#[derive(Clone)]
pub struct RedisSessionStore {
    conn: MultiplexedConnection,
    key_prefix: String,
}

impl RedisSessionStore {
    /// Connect to `url` and look sessions up under `key_prefix`.
    pub async fn connect(url: &str, key_prefix: impl Into<String>) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        Ok(Self::new(conn, key_prefix))
    }

    /// Wrap an existing connection.
    pub fn new(conn: MultiplexedConnection, key_prefix: impl Into<String>) -> Self {
        Self {
            conn,
            key_prefix: key_prefix.into(),
        }
    }

    /// Key under which `token` is stored.
    pub fn session_key(&self, token: &str) -> String {
        session_key(&self.key_prefix, token)
    }
}

fn session_key(prefix: &str, token: &str) -> String {
    format!("{prefix}{token}")
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn lookup(&self, token: &str) -> Result<Option<SessionRecord>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(self.session_key(token)).await?;
        let Some(raw) = raw else {
            debug!("session key not found");
            return Ok(None);
        };
        Ok(Some(serde_json::from_str(&raw)?))
    }
}
