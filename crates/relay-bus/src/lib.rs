//! # relay-bus
//!
//! Publish/subscribe over one shared channel.
//!
//! Every relay process publishes chat and conversation events here and every
//! process subscribes, so an event reaches participants wherever they are
//! connected. Delivery is best-effort and at-most-once: no acknowledgment,
//! no replay, no ordering across publishers.
//!
//! - [`RedisBus`]: Redis pub/sub, for multi-process deployments
//! - [`InMemoryBus`]: `tokio::sync::broadcast`, for a single process and tests

#![deny(unsafe_code)]

pub mod errors;
pub mod memory;
pub mod redis_bus;

use async_trait::async_trait;
use futures::stream::BoxStream;
use relay_core::BusEvent;

pub use errors::{BusError, Result};
pub use memory::InMemoryBus;
pub use redis_bus::RedisBus;

/// Raw payloads received from the bus. Ends when the subscription drops.
pub type BusStream = BoxStream<'static, String>;

/// Shared event channel.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish one raw payload to the channel.
    async fn publish(&self, payload: String) -> Result<()>;

    /// Open a new subscription to the channel.
    async fn subscribe(&self) -> Result<BusStream>;
}

/// Serialize `event` and publish it on `bus`.
pub async fn publish_event(bus: &dyn EventBus, event: &BusEvent) -> Result<()> {
    let payload = serde_json::to_string(event)?;
    bus.publish(payload).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use relay_core::{EventKind, Identity};

    #[tokio::test]
    async fn publish_event_sends_wire_json() {
        let bus = InMemoryBus::new(8);
        let mut sub = bus.subscribe().await.unwrap();

        let event = BusEvent {
            kind: EventKind::Message,
            participants: vec![Identity::from("alice")],
            conversation_id: "C1".into(),
            conversation_name: None,
            sender: Some("alice".into()),
            text: Some("hi".into()),
            sent_at: None,
            conversation: None,
        };
        publish_event(&bus, &event).await.unwrap();

        let raw = sub.next().await.unwrap();
        let decoded: BusEvent = serde_json::from_str(&raw).unwrap();
        assert_eq!(decoded, event);
    }
}
