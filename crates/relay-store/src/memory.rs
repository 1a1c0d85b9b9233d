//! In-process conversation store for tests and local development.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use relay_core::{ConversationSnapshot, Identity, MessageRecord};

use crate::errors::{Result, StorageError};
use crate::ConversationStore;

/// Holds conversations and appended messages in memory.
///
/// Mirrors the HTTP service's observable behavior: unknown conversations
/// yield a 404 status error, and only members may append.
#[derive(Default)]
pub struct InMemoryConversationStore {
    conversations: RwLock<HashMap<String, ConversationSnapshot>>,
    messages: RwLock<Vec<MessageRecord>>,
    calls: AtomicUsize,
    unavailable: AtomicBool,
}

impl InMemoryConversationStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a conversation.
    pub fn insert_conversation(&self, snapshot: ConversationSnapshot) {
        let _ = self.conversations.write().insert(snapshot.id.clone(), snapshot);
    }

    /// Make every subsequent call fail (or succeed again).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of store calls made so far, successful or not.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Messages appended so far, in order.
    pub fn messages(&self) -> Vec<MessageRecord> {
        self.messages.read().clone()
    }

    fn begin_call(&self) -> Result<()> {
        let _ = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable);
        }
        Ok(())
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn get_conversation(&self, conversation_id: &str) -> Result<ConversationSnapshot> {
        self.begin_call()?;
        self.conversations
            .read()
            .get(conversation_id)
            .cloned()
            .ok_or(StorageError::Status(404))
    }

    async fn create_message(
        &self,
        conversation_id: &str,
        sender: &Identity,
        text: &str,
    ) -> Result<MessageRecord> {
        self.begin_call()?;
        let now = Utc::now();
        let snapshot = {
            let mut conversations = self.conversations.write();
            let snapshot = conversations
                .get_mut(conversation_id)
                .ok_or(StorageError::Status(404))?;
            if !snapshot.has_participant(sender) {
                return Err(StorageError::Status(403));
            }
            snapshot.last_activity_at = Some(now);
            snapshot.clone()
        };

        let mut messages = self.messages.write();
        let record = MessageRecord {
            id: format!("msg_{}", messages.len() + 1),
            conversation_id: snapshot.id,
            conversation_name: snapshot.name,
            sender: sender.clone(),
            text: text.to_owned(),
            sent_at: now,
            participants: snapshot.participants,
        };
        messages.push(record.clone());
        Ok(record)
    }
}
