//! Inbound command dispatch: validate, persist, publish.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use relay_bus::{EventBus, publish_event};
use relay_core::errors::{CONVERSATION_FAILED, SEND_FAILED};
use relay_core::{BusEvent, Command, Identity, InboundFrame, OutboundFrame, RelayError};
use relay_store::ConversationStore;
use tracing::{debug, instrument, warn};

use crate::metrics::{COMMAND_ERRORS_TOTAL, COMMANDS_TOTAL};

/// Turns client frames into storage calls and bus events.
///
/// Every frame yields at most one reply to the sender: an error frame on
/// failure, nothing on success (the sender learns of its own message through
/// the bus like every other participant).
pub struct CommandProcessor {
    store: Arc<dyn ConversationStore>,
    bus: Arc<dyn EventBus>,
    timeout: Duration,
}

impl CommandProcessor {
    /// Create a processor whose storage calls are bounded by `timeout`.
    pub fn new(store: Arc<dyn ConversationStore>, bus: Arc<dyn EventBus>, timeout: Duration) -> Self {
        Self { store, bus, timeout }
    }

    /// Handle one text frame from `identity`. Returns the error frame to send
    /// back, if any.
    #[instrument(skip_all, fields(command))]
    pub async fn handle(&self, identity: &Identity, raw: &str) -> Option<OutboundFrame> {
        match self.process(identity, raw).await {
            Ok(()) => None,
            Err(e) => {
                counter!(COMMAND_ERRORS_TOTAL, "category" => e.category()).increment(1);
                debug!(identity = %identity, category = e.category(), error = %e, "command rejected");
                Some(OutboundFrame::error(e.to_string()))
            }
        }
    }

    async fn process(&self, identity: &Identity, raw: &str) -> Result<(), RelayError> {
        let command = InboundFrame::parse(raw)?.into_command()?;
        let _ = tracing::Span::current().record("command", command_name(&command));
        counter!(COMMANDS_TOTAL, "command" => command_name(&command)).increment(1);

        match command {
            Command::SendMessage {
                conversation_id,
                text,
            } => self.send_message(identity, &conversation_id, &text).await,
            Command::ShareConversation { conversation_id } => {
                self.share_conversation(identity, &conversation_id).await
            }
        }
    }

    async fn send_message(
        &self,
        identity: &Identity,
        conversation_id: &str,
        text: &str,
    ) -> Result<(), RelayError> {
        let record = self
            .bounded(self.store.create_message(conversation_id, identity, text))
            .await
            .map_err(|cause| {
                warn!(conversation_id, error = %cause, "failed to persist message");
                RelayError::Upstream(SEND_FAILED)
            })?;

        debug!(conversation_id, message_id = %record.id, "message persisted");
        publish_event(self.bus.as_ref(), &BusEvent::message(record))
            .await
            .map_err(|e| {
                warn!(conversation_id, error = %e, "failed to publish message event");
                RelayError::Upstream(SEND_FAILED)
            })
    }

    async fn share_conversation(
        &self,
        identity: &Identity,
        conversation_id: &str,
    ) -> Result<(), RelayError> {
        let snapshot = self
            .bounded(self.store.get_conversation(conversation_id))
            .await
            .map_err(|cause| {
                warn!(conversation_id, error = %cause, "failed to load conversation");
                RelayError::Upstream(CONVERSATION_FAILED)
            })?;

        if !snapshot.has_participant(identity) {
            warn!(conversation_id, identity = %identity, "conversation requested by non-participant");
            return Err(RelayError::Authorization);
        }

        publish_event(self.bus.as_ref(), &BusEvent::conversation(snapshot, identity.clone()))
            .await
            .map_err(|e| {
                warn!(conversation_id, error = %e, "failed to publish conversation event");
                RelayError::Upstream(CONVERSATION_FAILED)
            })
    }

    /// Run a storage call under the processor's timeout, flattening the
    /// elapsed case into a displayable cause.
    async fn bounded<T, E: std::fmt::Display>(
        &self,
        call: impl Future<Output = Result<T, E>>,
    ) -> Result<T, String> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!("timed out after {:?}", self.timeout)),
        }
    }
}

fn command_name(command: &Command) -> &'static str {
    match command {
        Command::SendMessage { .. } => "message",
        Command::ShareConversation { .. } => "conversation",
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
