//! Wire types: inbound client frames, bus events, outbound client frames.
//!
//! The bus event shape is shared with the push-delivery service that consumes
//! the same channel, so its field names are an external contract. Outbound
//! frames are a projection of bus events with the participant list removed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::ProtocolError;
use crate::ids::Identity;

// ─────────────────────────────────────────────────────────────────────────────
// Inbound
// ─────────────────────────────────────────────────────────────────────────────

/// Raw inbound frame as sent by a client.
///
/// Every field is optional on the wire: an object with no `type` decodes with
/// an empty kind and is rejected later as unsupported, not as malformed.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct InboundFrame {
    /// Command discriminator (`message` or `conversation`).
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    /// Target conversation.
    #[serde(default)]
    pub conversation_id: Option<String>,
    /// Message body for `message` commands.
    #[serde(default)]
    pub text: Option<String>,
}

/// A validated inbound command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Append a message to a conversation and fan it out.
    SendMessage {
        /// Trimmed, non-empty conversation ID.
        conversation_id: String,
        /// Trimmed, non-empty message text.
        text: String,
    },
    /// Re-announce a conversation snapshot to its participants.
    ShareConversation {
        /// Trimmed, non-empty conversation ID.
        conversation_id: String,
    },
}

impl InboundFrame {
    /// Decode a text frame. Anything that is not a JSON object of the
    /// inbound shape is [`ProtocolError::InvalidPayload`].
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        // Derived struct decoding also accepts a sequence in field order.
        match serde_json::from_str(raw) {
            Ok(value @ serde_json::Value::Object(_)) => {
                serde_json::from_value(value).map_err(|_| ProtocolError::InvalidPayload)
            }
            _ => Err(ProtocolError::InvalidPayload),
        }
    }

    /// Validate the frame into a [`Command`].
    pub fn into_command(self) -> Result<Command, ProtocolError> {
        match self.kind.as_deref().unwrap_or_default() {
            "message" => {
                let conversation_id = required(self.conversation_id)
                    .ok_or(ProtocolError::MissingConversationId)?;
                let text = required(self.text).ok_or(ProtocolError::MissingText)?;
                Ok(Command::SendMessage {
                    conversation_id,
                    text,
                })
            }
            "conversation" => {
                let conversation_id = required(self.conversation_id)
                    .ok_or(ProtocolError::MissingConversationId)?;
                Ok(Command::ShareConversation { conversation_id })
            }
            _ => Err(ProtocolError::UnsupportedType),
        }
    }
}

fn required(field: Option<String>) -> Option<String> {
    let trimmed = field?.trim().to_owned();
    (!trimmed.is_empty()).then_some(trimmed)
}

// ─────────────────────────────────────────────────────────────────────────────
// Storage records
// ─────────────────────────────────────────────────────────────────────────────

/// Conversation as returned by the storage service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSnapshot {
    /// Conversation ID.
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Member identities, in storage order.
    #[serde(default)]
    pub participants: Vec<Identity>,
    /// Time of the most recent message, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_activity_at: Option<DateTime<Utc>>,
    /// Identity that created the conversation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<Identity>,
}

impl ConversationSnapshot {
    /// Whether `identity` is a member of this conversation.
    pub fn has_participant(&self, identity: &Identity) -> bool {
        self.participants.contains(identity)
    }
}

/// Canonical message record returned after a successful append.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    /// Storage-assigned message ID.
    pub id: String,
    /// Conversation the message belongs to.
    pub conversation_id: String,
    /// Conversation display name at send time.
    #[serde(default)]
    pub conversation_name: String,
    /// Author.
    pub sender: Identity,
    /// Message body.
    pub text: String,
    /// Server-assigned send time.
    pub sent_at: DateTime<Utc>,
    /// Conversation members at send time.
    #[serde(default)]
    pub participants: Vec<Identity>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Bus events
// ─────────────────────────────────────────────────────────────────────────────

/// Kind of event carried on the bus.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A new chat message.
    Message,
    /// A conversation snapshot (share or membership change).
    Conversation,
}

/// Event published to and consumed from the shared bus channel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusEvent {
    /// Event discriminator.
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// Identities the event should reach.
    pub participants: Vec<Identity>,
    /// Conversation the event concerns.
    pub conversation_id: String,
    /// Conversation display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_name: Option<String>,
    /// Acting identity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<Identity>,
    /// Message body (message events).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Server-assigned send time (message events).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<DateTime<Utc>>,
    /// Full conversation snapshot (conversation events).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation: Option<ConversationSnapshot>,
}

impl BusEvent {
    /// Build a message event from the record storage returned.
    pub fn message(record: MessageRecord) -> Self {
        Self {
            kind: EventKind::Message,
            participants: record.participants,
            conversation_id: record.conversation_id,
            conversation_name: Some(record.conversation_name),
            sender: Some(record.sender),
            text: Some(record.text),
            sent_at: Some(record.sent_at),
            conversation: None,
        }
    }

    /// Build a conversation event announcing `snapshot` on behalf of `sender`.
    pub fn conversation(snapshot: ConversationSnapshot, sender: Identity) -> Self {
        Self {
            kind: EventKind::Conversation,
            participants: snapshot.participants.clone(),
            conversation_id: snapshot.id.clone(),
            conversation_name: Some(snapshot.name.clone()),
            sender: Some(sender),
            text: None,
            sent_at: None,
            conversation: Some(snapshot),
        }
    }

    /// Project to the client-facing frame. The participant list is dropped.
    pub fn to_outbound(&self) -> OutboundFrame {
        match self.kind {
            EventKind::Message => OutboundFrame::Message {
                conversation_id: self.conversation_id.clone(),
                conversation_name: self.conversation_name.clone(),
                from: self.sender.clone(),
                text: self.text.clone(),
                sent_at: self.sent_at,
            },
            EventKind::Conversation => OutboundFrame::Conversation {
                conversation_id: self.conversation_id.clone(),
                conversation_name: self.conversation_name.clone(),
                conversation: self.conversation.clone(),
            },
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Outbound
// ─────────────────────────────────────────────────────────────────────────────

/// Frame delivered to a client.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundFrame {
    /// A chat message.
    Message {
        /// Conversation the message belongs to.
        conversation_id: String,
        /// Conversation display name.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        conversation_name: Option<String>,
        /// Author.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<Identity>,
        /// Message body.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
        /// Server-assigned send time.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sent_at: Option<DateTime<Utc>>,
    },
    /// A conversation snapshot.
    Conversation {
        /// Conversation ID.
        conversation_id: String,
        /// Conversation display name.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        conversation_name: Option<String>,
        /// Full snapshot.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        conversation: Option<ConversationSnapshot>,
    },
    /// Identities currently connected to this process, sorted.
    Presence {
        /// Sorted, de-duplicated identities.
        users: Vec<Identity>,
    },
    /// A rejected or failed command.
    Error {
        /// Client-facing message.
        error: String,
    },
}

impl OutboundFrame {
    /// Error frame carrying `message`.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            error: message.into(),
        }
    }

    /// Presence frame. `users` must already be sorted and unique.
    pub fn presence(users: Vec<Identity>) -> Self {
        Self::Presence { users }
    }

    /// Serialize to the JSON text sent over the socket.
    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn ids(names: &[&str]) -> Vec<Identity> {
        names.iter().copied().map(Identity::from).collect()
    }

    fn record() -> MessageRecord {
        MessageRecord {
            id: "m1".into(),
            conversation_id: "C1".into(),
            conversation_name: "general".into(),
            sender: "alice".into(),
            text: "hi".into(),
            sent_at: "2026-03-01T12:00:00Z".parse().unwrap(),
            participants: ids(&["alice", "bob"]),
        }
    }

    fn snapshot() -> ConversationSnapshot {
        ConversationSnapshot {
            id: "C1".into(),
            name: "general".into(),
            participants: ids(&["alice", "bob"]),
            last_activity_at: None,
            created_by: Some("alice".into()),
        }
    }

    // ── inbound ─────────────────────────────────────────────────────

    #[test]
    fn message_frame_is_trimmed() {
        let frame =
            InboundFrame::parse(r#"{"type":"message","conversation_id":" C1 ","text":"  hi \n"}"#)
                .unwrap();
        assert_eq!(
            frame.into_command().unwrap(),
            Command::SendMessage {
                conversation_id: "C1".into(),
                text: "hi".into(),
            }
        );
    }

    #[test]
    fn blank_text_is_rejected() {
        let frame =
            InboundFrame::parse(r#"{"type":"message","conversation_id":"C1","text":"   "}"#)
                .unwrap();
        assert_eq!(frame.into_command(), Err(ProtocolError::MissingText));
    }

    #[test]
    fn missing_conversation_id_is_rejected_before_text() {
        let frame = InboundFrame::parse(r#"{"type":"message","text":""}"#).unwrap();
        assert_eq!(frame.into_command(), Err(ProtocolError::MissingConversationId));
    }

    #[test]
    fn conversation_frame_ignores_text() {
        let frame = InboundFrame::parse(r#"{"type":"conversation","conversation_id":"C9"}"#)
            .unwrap();
        assert_eq!(
            frame.into_command().unwrap(),
            Command::ShareConversation {
                conversation_id: "C9".into()
            }
        );
    }

    #[test]
    fn null_fields_count_as_missing() {
        let frame =
            InboundFrame::parse(r#"{"type":"conversation","conversation_id":null}"#).unwrap();
        assert_eq!(frame.into_command(), Err(ProtocolError::MissingConversationId));
    }

    #[test]
    fn unknown_object_parses_as_unsupported() {
        let frame = InboundFrame::parse(r#"{"hello":"world"}"#).unwrap();
        assert_eq!(frame.kind, None);
        assert_eq!(frame.into_command(), Err(ProtocolError::UnsupportedType));
    }

    #[test]
    fn unknown_type_is_unsupported() {
        let frame = InboundFrame::parse(r#"{"type":"typing","conversation_id":"C1"}"#).unwrap();
        assert_eq!(frame.into_command(), Err(ProtocolError::UnsupportedType));
    }

    #[test]
    fn non_object_payloads_are_invalid() {
        for raw in ["not json", "[1,2]", "\"message\"", "42", r#"{"type":7}"#, r#"{"text":[]}"#] {
            assert_eq!(InboundFrame::parse(raw), Err(ProtocolError::InvalidPayload), "{raw}");
        }
    }

    #[test]
    fn positional_array_is_not_a_frame() {
        for raw in [r#"["message","C1","hi"]"#, r#"["conversation","C1"]"#, "[]"] {
            assert_eq!(InboundFrame::parse(raw), Err(ProtocolError::InvalidPayload), "{raw}");
        }
    }

    // ── bus events ──────────────────────────────────────────────────

    #[test]
    fn message_event_wire_shape() {
        let event = BusEvent::message(record());
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "message",
                "participants": ["alice", "bob"],
                "conversation_id": "C1",
                "conversation_name": "general",
                "sender": "alice",
                "text": "hi",
                "sent_at": "2026-03-01T12:00:00Z",
            })
        );
    }

    #[test]
    fn conversation_event_carries_snapshot() {
        let event = BusEvent::conversation(snapshot(), "bob".into());
        assert_eq!(event.kind, EventKind::Conversation);
        assert_eq!(event.participants, ids(&["alice", "bob"]));
        assert_eq!(event.conversation_id, "C1");
        assert_eq!(event.sender.as_deref(), Some("bob"));
        assert_eq!(event.conversation, Some(snapshot()));
    }

    #[test]
    fn bus_event_decodes_with_optional_fields_absent() {
        let raw = r#"{"type":"message","participants":["a"],"conversation_id":"C1"}"#;
        let event: BusEvent = serde_json::from_str(raw).unwrap();
        assert_eq!(event.kind, EventKind::Message);
        assert!(event.sender.is_none());
        assert!(event.conversation.is_none());
    }

    #[test]
    fn bus_event_rejects_unknown_kind() {
        let raw = r#"{"type":"presence","participants":[],"conversation_id":"C1"}"#;
        assert!(serde_json::from_str::<BusEvent>(raw).is_err());
    }

    // ── outbound ────────────────────────────────────────────────────

    #[test]
    fn outbound_message_drops_participants() {
        let frame = BusEvent::message(record()).to_outbound();
        let value: Value = serde_json::from_str(&frame.encode().unwrap()).unwrap();
        assert_eq!(value["type"], "message");
        assert_eq!(value["from"], "alice");
        assert_eq!(value["text"], "hi");
        assert_eq!(value["conversation_id"], "C1");
        assert_eq!(value["conversation_name"], "general");
        assert!(value.get("participants").is_none());
        assert!(value.get("sender").is_none());
    }

    #[test]
    fn outbound_conversation_keeps_snapshot_members() {
        let frame = BusEvent::conversation(snapshot(), "alice".into()).to_outbound();
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(value["type"], "conversation");
        assert!(value.get("participants").is_none());
        assert_eq!(value["conversation"]["participants"], json!(["alice", "bob"]));
        assert_eq!(value["conversation"]["created_by"], "alice");
    }

    #[test]
    fn presence_and_error_shapes() {
        let presence = OutboundFrame::presence(ids(&["alice", "bob"]));
        assert_eq!(
            serde_json::to_value(&presence).unwrap(),
            json!({"type": "presence", "users": ["alice", "bob"]})
        );
        let error = OutboundFrame::error("invalid payload");
        assert_eq!(
            serde_json::to_value(&error).unwrap(),
            json!({"type": "error", "error": "invalid payload"})
        );
    }

    #[test]
    fn outbound_decodes_back() {
        let raw = r#"{"type":"error","error":"text is required"}"#;
        let frame: OutboundFrame = serde_json::from_str(raw).unwrap();
        assert_eq!(frame, OutboundFrame::error("text is required"));
    }

    #[test]
    fn snapshot_membership() {
        let snap = snapshot();
        assert!(snap.has_participant(&"bob".into()));
        assert!(!snap.has_participant(&"carol".into()));
    }

    proptest::proptest! {
        #[test]
        fn message_fields_are_trimmed_or_rejected(
            id in "[ \t]{0,3}[a-zA-Z0-9]{0,6}[ \t]{0,3}",
            text in "[ \t\n]{0,3}[a-z ]{0,12}[ \t\n]{0,3}",
        ) {
            let frame = InboundFrame {
                kind: Some("message".into()),
                conversation_id: Some(id.clone()),
                text: Some(text.clone()),
            };
            match frame.into_command() {
                Ok(Command::SendMessage { conversation_id, text: body }) => {
                    proptest::prop_assert_eq!(conversation_id.as_str(), id.trim());
                    proptest::prop_assert_eq!(body.as_str(), text.trim());
                    proptest::prop_assert!(!body.is_empty());
                }
                Err(ProtocolError::MissingConversationId) => {
                    proptest::prop_assert!(id.trim().is_empty());
                }
                Err(ProtocolError::MissingText) => {
                    proptest::prop_assert!(!id.trim().is_empty());
                    proptest::prop_assert!(text.trim().is_empty());
                }
                other => proptest::prop_assert!(false, "unexpected {:?}", other),
            }
        }
    }
}
