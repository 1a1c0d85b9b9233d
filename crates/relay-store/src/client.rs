//! HTTP client for the storage service.
//!
//! Endpoints:
//! - `GET  {base}/conversations/{id}` → 2xx with a [`ConversationSnapshot`]
//! - `POST {base}/conversations/{id}/messages` with `{sender, text}` → 201
//!   with a [`MessageRecord`]
//!
//! Any other status becomes [`StorageError::Status`]; callers surface it to
//! clients only as a generic failure.

use std::time::Duration;

use async_trait::async_trait;
use relay_core::{ConversationSnapshot, Identity, MessageRecord};
use reqwest::{StatusCode, Url};
use serde::Serialize;
use tracing::{debug, instrument};

use crate::errors::{Result, StorageError};
use crate::ConversationStore;

#[derive(Serialize)]
struct CreateMessageBody<'a> {
    sender: &'a str,
    text: &'a str,
}

/// [`ConversationStore`] backed by the storage service's HTTP API.
#[derive(Clone)]
pub struct HttpStorageClient {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpStorageClient {
    /// Build a client for `base_url` whose requests give up after `timeout`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url =
            Url::parse(base_url).map_err(|e| StorageError::InvalidUrl(format!("{base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(StorageError::InvalidUrl(base_url.to_string()));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("relay/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, base_url })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|()| StorageError::InvalidUrl(self.base_url.to_string()))?;
            let _ = path.pop_if_empty().extend(segments);
        }
        Ok(url)
    }
}

#[async_trait]
impl ConversationStore for HttpStorageClient {
    #[instrument(skip(self))]
    async fn get_conversation(&self, conversation_id: &str) -> Result<ConversationSnapshot> {
        let url = self.endpoint(&["conversations", conversation_id])?;
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            debug!(status = status.as_u16(), "get conversation rejected");
            return Err(StorageError::Status(status.as_u16()));
        }
        Ok(response.json().await?)
    }

    #[instrument(skip(self, text), fields(text_len = text.len()))]
    async fn create_message(
        &self,
        conversation_id: &str,
        sender: &Identity,
        text: &str,
    ) -> Result<MessageRecord> {
        let url = self.endpoint(&["conversations", conversation_id, "messages"])?;
        let body = CreateMessageBody {
            sender: sender.as_str(),
            text,
        };
        let response = self.client.post(url).json(&body).send().await?;
        let status = response.status();
        if status != StatusCode::CREATED {
            debug!(status = status.as_u16(), "create message rejected");
            return Err(StorageError::Status(status.as_u16()));
        }
        Ok(response.json().await?)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TIMEOUT: Duration = Duration::from_secs(2);

    fn conversation_json() -> serde_json::Value {
        json!({
            "id": "C1",
            "name": "general",
            "participants": ["alice", "bob"],
            "last_activity_at": "2026-03-01T12:00:00Z",
            "created_by": "alice",
        })
    }

    fn message_json() -> serde_json::Value {
        json!({
            "id": "m42",
            "conversation_id": "C1",
            "conversation_name": "general",
            "sender": "alice",
            "text": "hi",
            "sent_at": "2026-03-01T12:00:05Z",
            "participants": ["alice", "bob"],
        })
    }

    async fn client_for(server: &MockServer) -> HttpStorageClient {
        HttpStorageClient::new(&server.uri(), TIMEOUT).unwrap()
    }

    #[test]
    fn rejects_unparseable_base_url() {
        let err = HttpStorageClient::new("not a url", TIMEOUT).err().unwrap();
        assert!(matches!(err, StorageError::InvalidUrl(_)));
    }

    #[test]
    fn rejects_non_base_url() {
        let err = HttpStorageClient::new("mailto:ops@example.com", TIMEOUT).err().unwrap();
        assert!(matches!(err, StorageError::InvalidUrl(_)));
    }

    #[test]
    fn endpoint_escapes_segments_and_keeps_base_path() {
        let client = HttpStorageClient::new("http://storage.local/api/", TIMEOUT).unwrap();
        let url = client.endpoint(&["conversations", "a/b c", "messages"]).unwrap();
        assert_eq!(
            url.as_str(),
            "http://storage.local/api/conversations/a%2Fb%20c/messages"
        );
    }

    #[tokio::test]
    async fn get_conversation_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/conversations/C1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(conversation_json()))
            .expect(1)
            .mount(&server)
            .await;

        let snapshot = client_for(&server).await.get_conversation("C1").await.unwrap();
        assert_eq!(snapshot.id, "C1");
        assert_eq!(snapshot.name, "general");
        assert_eq!(snapshot.participants.len(), 2);
        assert_eq!(snapshot.created_by.as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn get_conversation_non_2xx_is_status_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/conversations/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .await
            .get_conversation("missing")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Status(404)));
    }

    #[tokio::test]
    async fn get_conversation_bad_body_is_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/conversations/C1"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let err = client_for(&server).await.get_conversation("C1").await.unwrap_err();
        assert!(matches!(err, StorageError::Http(_)));
    }

    #[tokio::test]
    async fn create_message_posts_sender_and_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/conversations/C1/messages"))
            .and(body_json(json!({"sender": "alice", "text": "hi"})))
            .respond_with(ResponseTemplate::new(201).set_body_json(message_json()))
            .expect(1)
            .mount(&server)
            .await;

        let record = client_for(&server)
            .await
            .create_message("C1", &Identity::from("alice"), "hi")
            .await
            .unwrap();
        assert_eq!(record.id, "m42");
        assert_eq!(record.sender.as_str(), "alice");
        assert_eq!(record.participants.len(), 2);
    }

    #[tokio::test]
    async fn create_message_requires_201() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/conversations/C1/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(message_json()))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .await
            .create_message("C1", &Identity::from("alice"), "hi")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Status(200)));
    }

    #[tokio::test]
    async fn create_message_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/conversations/C1/messages"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .await
            .create_message("C1", &Identity::from("alice"), "hi")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Status(500)));
    }

    #[tokio::test]
    async fn slow_service_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/conversations/C1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(conversation_json())
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let client = HttpStorageClient::new(&server.uri(), Duration::from_millis(200)).unwrap();
        let err = client.get_conversation("C1").await.unwrap_err();
        assert!(err.is_timeout(), "{err}");
    }
}
