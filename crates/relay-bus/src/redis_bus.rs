//! Redis pub/sub bus.

use async_trait::async_trait;
use futures::StreamExt;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use tracing::{debug, info, warn};

use crate::errors::Result;
use crate::{BusStream, EventBus};

/// Bus backed by one Redis pub/sub channel.
///
/// Publishing goes over a shared multiplexed connection; each subscription
/// opens its own dedicated pub/sub connection.
#[derive(Clone)]
pub struct RedisBus {
    client: redis::Client,
    publisher: MultiplexedConnection,
    channel: String,
}

impl RedisBus {
    /// Connect to `url` and use `channel` for all traffic.
    pub async fn connect(url: &str, channel: impl Into<String>) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let publisher = client.get_multiplexed_async_connection().await?;
        Ok(Self {
            client,
            publisher,
            channel: channel.into(),
        })
    }

    /// Channel name.
    pub fn channel(&self) -> &str {
        &self.channel
    }
}

#[async_trait]
impl EventBus for RedisBus {
    async fn publish(&self, payload: String) -> Result<()> {
        let mut conn = self.publisher.clone();
        let receivers: i64 = conn.publish(&self.channel, payload).await?;
        debug!(channel = %self.channel, receivers, "published bus event");
        Ok(())
    }

    async fn subscribe(&self) -> Result<BusStream> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(&self.channel).await?;
        info!(channel = %self.channel, "subscribed to bus channel");

        let stream = pubsub.into_on_message().filter_map(|msg| async move {
            match msg.get_payload::<String>() {
                Ok(payload) => Some(payload),
                Err(e) => {
                    warn!(error = %e, "dropping non-text bus payload");
                    None
                }
            }
        });
        Ok(stream.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::BusError;

    #[tokio::test]
    async fn connect_rejects_malformed_url() {
        let result = RedisBus::connect("definitely not redis", "chat:events").await;
        assert!(matches!(result, Err(BusError::Redis(_))));
    }
}
