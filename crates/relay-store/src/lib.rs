//! # relay-store
//!
//! Client side of the external conversation/message storage service.
//!
//! - [`ConversationStore`]: the two operations the relay needs
//! - [`HttpStorageClient`]: `reqwest` implementation against the service's REST API
//! - [`InMemoryConversationStore`]: in-process implementation for tests

#![deny(unsafe_code)]

pub mod client;
pub mod errors;
pub mod memory;

use async_trait::async_trait;
use relay_core::{ConversationSnapshot, Identity, MessageRecord};

pub use client::HttpStorageClient;
pub use errors::{Result, StorageError};
pub use memory::InMemoryConversationStore;

/// Conversation and message persistence, as seen by the relay.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Load a conversation with its current participant list.
    async fn get_conversation(&self, conversation_id: &str) -> Result<ConversationSnapshot>;

    /// Append a message and return the canonical stored record.
    async fn create_message(
        &self,
        conversation_id: &str,
        sender: &Identity,
        text: &str,
    ) -> Result<MessageRecord>;
}
