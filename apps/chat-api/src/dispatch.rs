//! Message dispatch: validate, persist, then best-effort live push.
//!
//! The durable writes define "sent" success; live pushes never do. For a
//! broadcast, each recipient is an independent concurrent unit of work —
//! one recipient's failure is logged and swallowed, never surfaced to the
//! sender and never aborting the siblings.

use std::sync::Arc;

use chat_common::SnowflakeGenerator;
use chrono::Utc;
use serde::Deserialize;
use tokio::task::JoinSet;
use utoipa::ToSchema;

use crate::error::{ApiError, FieldError};
use crate::gateway::events::ChatFrame;
use crate::gateway::hub::HubHandle;
use crate::models::message::{Message, NewMessage};
use crate::store::ChatStore;

/// Maximum content length, matching the column the clients render.
const MAX_CONTENT_LEN: usize = 4000;

/// A message submission, from the request layer or an inbound chat frame.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct SendMessage {
    pub recipient_id: Option<String>,
    pub content: Option<String>,
    pub media_url: Option<String>,
    #[serde(default)]
    pub is_broadcast: bool,
}

impl From<ChatFrame> for SendMessage {
    fn from(frame: ChatFrame) -> Self {
        Self {
            recipient_id: frame.recipient_id,
            content: frame.content,
            media_url: frame.media_url,
            is_broadcast: frame.is_broadcast,
        }
    }
}

/// What a successful dispatch produced.
#[derive(Debug)]
pub enum DispatchReceipt {
    /// The persisted message, already pushed to the recipient if connected.
    Direct(Message),
    /// Number of recipients the broadcast fanned out to.
    Broadcast { recipients: usize },
}

/// Entry point invoked by the request layer when a new message is submitted.
#[derive(Clone)]
pub struct MessageDispatcher {
    store: Arc<dyn ChatStore>,
    hub: HubHandle,
    ids: Arc<SnowflakeGenerator>,
}

impl MessageDispatcher {
    pub fn new(store: Arc<dyn ChatStore>, hub: HubHandle, ids: Arc<SnowflakeGenerator>) -> Self {
        Self { store, hub, ids }
    }

    pub async fn send(
        &self,
        sender_id: &str,
        request: SendMessage,
    ) -> Result<DispatchReceipt, ApiError> {
        let content = request
            .content
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        let media_url = request
            .media_url
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        let recipient_id = request.recipient_id.filter(|r| !r.is_empty());

        let mut errors = Vec::new();
        if sender_id.is_empty() {
            errors.push(FieldError {
                field: "sender_id".to_string(),
                message: "Sender identity is required".to_string(),
            });
        }
        if content.is_none() && media_url.is_none() {
            errors.push(FieldError {
                field: "content".to_string(),
                message: "Message content or media reference is required".to_string(),
            });
        }
        if let Some(ref c) = content {
            if c.len() > MAX_CONTENT_LEN {
                errors.push(FieldError {
                    field: "content".to_string(),
                    message: format!("Message content must be {MAX_CONTENT_LEN} characters or fewer"),
                });
            }
        }
        if !request.is_broadcast && recipient_id.is_none() {
            errors.push(FieldError {
                field: "recipient_id".to_string(),
                message: "Recipient is required for a direct message".to_string(),
            });
        }
        if !errors.is_empty() {
            return Err(ApiError::validation(errors));
        }

        if request.is_broadcast {
            self.broadcast(sender_id, content, media_url).await
        } else {
            let recipient_id = recipient_id.unwrap();
            let message = self
                .persist_to(
                    sender_id,
                    &recipient_id,
                    content.as_deref(),
                    media_url.as_deref(),
                    false,
                )
                .await?;
            self.push_live(&message);
            Ok(DispatchReceipt::Direct(message))
        }
    }

    /// Fan a broadcast out to every identity except the sender. Membership
    /// is a snapshot taken at send time.
    async fn broadcast(
        &self,
        sender_id: &str,
        content: Option<String>,
        media_url: Option<String>,
    ) -> Result<DispatchReceipt, ApiError> {
        let recipients = self.store.users_except(sender_id).await?;
        let count = recipients.len();

        let mut tasks = JoinSet::new();
        for recipient in recipients {
            let dispatcher = self.clone();
            let sender = sender_id.to_string();
            let content = content.clone();
            let media_url = media_url.clone();

            tasks.spawn(async move {
                match dispatcher
                    .persist_to(
                        &sender,
                        &recipient.id,
                        content.as_deref(),
                        media_url.as_deref(),
                        true,
                    )
                    .await
                {
                    Ok(message) => dispatcher.push_live(&message),
                    Err(err) => tracing::warn!(
                        recipient_id = %recipient.id,
                        code = %err.code,
                        "broadcast fan-out failed for recipient"
                    ),
                }
            });
        }

        // Wait for the durable writes; the pushes above were already handed
        // to the hub and are not waited on.
        while tasks.join_next().await.is_some() {}

        tracing::debug!(sender_id, recipients = count, "broadcast dispatched");

        Ok(DispatchReceipt::Broadcast { recipients: count })
    }

    /// Persist one Message row and its matching delivery record.
    async fn persist_to(
        &self,
        sender_id: &str,
        recipient_id: &str,
        content: Option<&str>,
        media_url: Option<&str>,
        is_broadcast: bool,
    ) -> Result<Message, ApiError> {
        let message = self
            .store
            .create_message(NewMessage {
                id: self.ids.generate(),
                sender_id,
                recipient_id,
                content,
                media_url,
                is_broadcast,
                created_at: Utc::now(),
            })
            .await?;

        self.store
            .create_message_recipient(message.id, recipient_id)
            .await?;

        Ok(message)
    }

    /// Best-effort push of the serialized message to the recipient's live
    /// session. Runs after persistence; losing it loses nothing durable.
    fn push_live(&self, message: &Message) {
        match serde_json::to_string(message) {
            Ok(json) => self.hub.send_direct(message.recipient_id.clone(), json),
            Err(err) => tracing::error!(?err, message_id = message.id, "message serialization failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tokio::sync::mpsc;
    use tokio::time;

    use crate::gateway::hub::Hub;
    use crate::gateway::session::ConnectionSession;
    use crate::models::user::NewUser;
    use crate::store::MemoryStore;

    async fn setup(users: &[&str]) -> (MessageDispatcher, Arc<MemoryStore>, HubHandle) {
        let store = Arc::new(MemoryStore::new());
        for &id in users {
            let username = format!("user_{id}");
            let email = format!("{id}@example.com");
            store
                .create_user(NewUser {
                    id,
                    username: &username,
                    email: &email,
                    password_hash: "x",
                    is_online: false,
                    created_at: Utc::now(),
                })
                .await
                .unwrap();
        }

        let (hub, handle) = Hub::new(store.clone());
        tokio::spawn(hub.run());

        let dispatcher = MessageDispatcher::new(
            store.clone(),
            handle.clone(),
            Arc::new(SnowflakeGenerator::new(0)),
        );
        (dispatcher, store, handle)
    }

    async fn recv(rx: &mut mpsc::Receiver<String>) -> serde_json::Value {
        let payload = time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("timed out waiting for payload")
            .expect("queue closed");
        serde_json::from_str(&payload).unwrap()
    }

    fn direct(recipient: &str, content: &str) -> SendMessage {
        SendMessage {
            recipient_id: Some(recipient.to_string()),
            content: Some(content.to_string()),
            ..SendMessage::default()
        }
    }

    #[tokio::test]
    async fn direct_send_persists_message_and_delivery_record() {
        let (dispatcher, store, hub) = setup(&["a", "b"]).await;

        let (session_b, mut rx_b) = ConnectionSession::channel("b".to_string());
        hub.register(session_b);
        recv(&mut rx_b).await; // snapshot

        let receipt = dispatcher.send("a", direct("b", "hi")).await.unwrap();
        let message = match receipt {
            DispatchReceipt::Direct(message) => message,
            other => panic!("expected direct receipt, got {other:?}"),
        };
        assert_eq!(message.sender_id, "a");
        assert_eq!(message.recipient_id, "b");
        assert_eq!(message.content.as_deref(), Some("hi"));

        // Delivery record exists with both timestamps null.
        let record = store
            .message_recipient(message.id, "b")
            .await
            .unwrap()
            .unwrap();
        assert!(record.delivered_at.is_none());
        assert!(record.read_at.is_none());

        // The connected recipient got the live push.
        let pushed = recv(&mut rx_b).await;
        assert_eq!(pushed["content"], "hi");
        assert_eq!(pushed["sender_id"], "a");
        assert_eq!(pushed["id"], message.id.to_string());
    }

    #[tokio::test]
    async fn direct_send_to_offline_recipient_still_persists() {
        let (dispatcher, store, _hub) = setup(&["a", "b"]).await;

        let receipt = dispatcher.send("a", direct("b", "hello?")).await.unwrap();
        assert!(matches!(receipt, DispatchReceipt::Direct(_)));

        let history = store.messages_between("a", "b").await.unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn broadcast_creates_one_row_per_recipient() {
        let (dispatcher, store, _hub) = setup(&["a", "b", "c", "d", "e"]).await;

        let receipt = dispatcher
            .send(
                "a",
                SendMessage {
                    content: Some("to everyone".to_string()),
                    is_broadcast: true,
                    ..SendMessage::default()
                },
            )
            .await
            .unwrap();

        match receipt {
            DispatchReceipt::Broadcast { recipients } => assert_eq!(recipients, 4),
            other => panic!("expected broadcast receipt, got {other:?}"),
        }

        for recipient in ["b", "c", "d", "e"] {
            let messages = store.messages_for_user(recipient).await.unwrap();
            assert_eq!(messages.len(), 1, "one copy for {recipient}");
            let message = &messages[0];
            assert!(message.is_broadcast);
            assert_eq!(message.recipient_id, recipient);

            let record = store
                .message_recipient(message.id, recipient)
                .await
                .unwrap()
                .unwrap();
            assert!(record.delivered_at.is_none());
        }

        // The sender has no copy addressed to them.
        let own = store.messages_for_user("a").await.unwrap();
        assert!(own.iter().all(|m| m.recipient_id != "a"));
    }

    #[tokio::test]
    async fn broadcast_pushes_only_to_connected_recipients() {
        let (dispatcher, _store, hub) = setup(&["a", "b", "c", "d", "e"]).await;

        // b, c, d connected; e offline.
        let (session_b, mut rx_b) = ConnectionSession::channel("b".to_string());
        let (session_c, mut rx_c) = ConnectionSession::channel("c".to_string());
        let (session_d, mut rx_d) = ConnectionSession::channel("d".to_string());
        hub.register(session_b);
        hub.register(session_c);
        hub.register(session_d);
        recv(&mut rx_b).await; // snapshot
        recv(&mut rx_b).await; // c online
        recv(&mut rx_b).await; // d online
        recv(&mut rx_c).await; // snapshot
        recv(&mut rx_c).await; // d online
        recv(&mut rx_d).await; // snapshot

        dispatcher
            .send(
                "a",
                SendMessage {
                    content: Some("fan out".to_string()),
                    is_broadcast: true,
                    ..SendMessage::default()
                },
            )
            .await
            .unwrap();

        for rx in [&mut rx_b, &mut rx_c, &mut rx_d] {
            let pushed = recv(rx).await;
            assert_eq!(pushed["content"], "fan out");
            assert_eq!(pushed["is_broadcast"], true);
        }
    }

    #[tokio::test]
    async fn rejects_empty_submission() {
        let (dispatcher, _store, _hub) = setup(&["a"]).await;

        let err = dispatcher
            .send("a", SendMessage::default())
            .await
            .unwrap_err();
        assert_eq!(err.code, "VALIDATION_ERROR");
        let details = err.details.unwrap();
        assert!(details.iter().any(|d| d.field == "content"));
        assert!(details.iter().any(|d| d.field == "recipient_id"));
    }

    #[tokio::test]
    async fn rejects_direct_message_without_recipient() {
        let (dispatcher, _store, _hub) = setup(&["a"]).await;

        let err = dispatcher
            .send(
                "a",
                SendMessage {
                    content: Some("dangling".to_string()),
                    ..SendMessage::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn rejects_oversized_content() {
        let (dispatcher, _store, _hub) = setup(&["a", "b"]).await;

        let err = dispatcher
            .send("a", direct("b", &"x".repeat(MAX_CONTENT_LEN + 1)))
            .await
            .unwrap_err();
        assert_eq!(err.code, "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn media_only_message_is_accepted() {
        let (dispatcher, store, _hub) = setup(&["a", "b"]).await;

        let receipt = dispatcher
            .send(
                "a",
                SendMessage {
                    recipient_id: Some("b".to_string()),
                    media_url: Some("https://cdn.example.com/pic.png".to_string()),
                    ..SendMessage::default()
                },
            )
            .await
            .unwrap();

        let message = match receipt {
            DispatchReceipt::Direct(message) => message,
            other => panic!("expected direct receipt, got {other:?}"),
        };
        assert!(message.content.is_none());
        assert_eq!(
            message.media_url.as_deref(),
            Some("https://cdn.example.com/pic.png")
        );

        assert_eq!(store.messages_between("a", "b").await.unwrap().len(), 1);
    }
}
