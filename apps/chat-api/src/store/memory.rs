//! In-memory implementation of [`ChatStore`] for tests.
//!
//! Mirrors the Postgres implementation's observable behavior, including
//! unique-constraint conflicts and conditional timestamp updates.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::error::ApiError;
use crate::models::message::{Message, NewMessage};
use crate::models::message_recipient::MessageRecipient;
use crate::models::user::{NewUser, User};

use super::{ChatStore, MarkOutcome};

#[derive(Default)]
struct Inner {
    users: Vec<User>,
    messages: Vec<Message>,
    recipients: HashMap<(i64, String), MessageRecipient>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChatStore for MemoryStore {
    async fn create_user(&self, user: NewUser<'_>) -> Result<User, ApiError> {
        let mut inner = self.inner.lock();

        if inner.users.iter().any(|u| u.username == user.username) {
            return Err(ApiError::conflict("Username is already taken"));
        }
        if inner.users.iter().any(|u| u.email == user.email) {
            return Err(ApiError::conflict("Email is already registered"));
        }

        let user = User {
            id: user.id.to_string(),
            username: user.username.to_string(),
            email: user.email.to_string(),
            password_hash: user.password_hash.to_string(),
            is_online: user.is_online,
            created_at: user.created_at,
        };
        inner.users.push(user.clone());

        Ok(user)
    }

    async fn user_by_id(&self, id: &str) -> Result<Option<User>, ApiError> {
        Ok(self.inner.lock().users.iter().find(|u| u.id == id).cloned())
    }

    async fn user_by_username(&self, username: &str) -> Result<Option<User>, ApiError> {
        Ok(self
            .inner
            .lock()
            .users
            .iter()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<User>, ApiError> {
        Ok(self
            .inner
            .lock()
            .users
            .iter()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn users_except(&self, user_id: &str) -> Result<Vec<User>, ApiError> {
        let mut list: Vec<User> = self
            .inner
            .lock()
            .users
            .iter()
            .filter(|u| u.id != user_id)
            .cloned()
            .collect();
        list.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(list)
    }

    async fn online_users(&self) -> Result<Vec<User>, ApiError> {
        let mut list: Vec<User> = self
            .inner
            .lock()
            .users
            .iter()
            .filter(|u| u.is_online)
            .cloned()
            .collect();
        list.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(list)
    }

    async fn set_online(&self, user_id: &str, online: bool) -> Result<(), ApiError> {
        let mut inner = self.inner.lock();
        if let Some(user) = inner.users.iter_mut().find(|u| u.id == user_id) {
            user.is_online = online;
        }
        Ok(())
    }

    async fn create_message(&self, message: NewMessage<'_>) -> Result<Message, ApiError> {
        let message = message.to_message();
        self.inner.lock().messages.push(message.clone());
        Ok(message)
    }

    async fn messages_between(
        &self,
        user_a: &str,
        user_b: &str,
    ) -> Result<Vec<Message>, ApiError> {
        let mut list: Vec<Message> = self
            .inner
            .lock()
            .messages
            .iter()
            .filter(|m| {
                (m.sender_id == user_a && m.recipient_id == user_b)
                    || (m.sender_id == user_b && m.recipient_id == user_a)
            })
            .cloned()
            .collect();
        list.sort_by_key(|m| m.created_at);
        Ok(list)
    }

    async fn messages_for_user(&self, user_id: &str) -> Result<Vec<Message>, ApiError> {
        let mut list: Vec<Message> = self
            .inner
            .lock()
            .messages
            .iter()
            .filter(|m| m.sender_id == user_id || m.recipient_id == user_id)
            .cloned()
            .collect();
        list.sort_by_key(|m| m.created_at);
        Ok(list)
    }

    async fn create_message_recipient(
        &self,
        message_id: i64,
        recipient_id: &str,
    ) -> Result<(), ApiError> {
        self.inner.lock().recipients.insert(
            (message_id, recipient_id.to_string()),
            MessageRecipient {
                message_id,
                recipient_id: recipient_id.to_string(),
                delivered_at: None,
                read_at: None,
            },
        );
        Ok(())
    }

    async fn message_recipient(
        &self,
        message_id: i64,
        recipient_id: &str,
    ) -> Result<Option<MessageRecipient>, ApiError> {
        Ok(self
            .inner
            .lock()
            .recipients
            .get(&(message_id, recipient_id.to_string()))
            .cloned())
    }

    async fn set_delivered_if_null(
        &self,
        message_id: i64,
        recipient_id: &str,
        at: DateTime<Utc>,
    ) -> Result<MarkOutcome, ApiError> {
        let mut inner = self.inner.lock();
        match inner.recipients.get_mut(&(message_id, recipient_id.to_string())) {
            Some(record) if record.delivered_at.is_none() => {
                record.delivered_at = Some(at);
                Ok(MarkOutcome::Applied)
            }
            Some(_) => Ok(MarkOutcome::AlreadySet),
            None => Ok(MarkOutcome::NotFound),
        }
    }

    async fn set_read_if_null(
        &self,
        message_id: i64,
        recipient_id: &str,
        at: DateTime<Utc>,
    ) -> Result<MarkOutcome, ApiError> {
        let mut inner = self.inner.lock();
        match inner.recipients.get_mut(&(message_id, recipient_id.to_string())) {
            Some(record) if record.read_at.is_none() => {
                record.read_at = Some(at);
                Ok(MarkOutcome::Applied)
            }
            Some(_) => Ok(MarkOutcome::AlreadySet),
            None => Ok(MarkOutcome::NotFound),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user<'a>(id: &'a str, username: &'a str, email: &'a str) -> NewUser<'a> {
        NewUser {
            id,
            username,
            email,
            password_hash: "x",
            is_online: false,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn duplicate_username_conflicts() {
        let store = MemoryStore::new();
        store
            .create_user(new_user("usr_1", "alice", "alice@example.com"))
            .await
            .unwrap();

        let err = store
            .create_user(new_user("usr_2", "alice", "other@example.com"))
            .await
            .unwrap_err();
        assert_eq!(err.code, "CONFLICT");
    }

    #[tokio::test]
    async fn conditional_update_is_first_write_wins() {
        let store = MemoryStore::new();
        store.create_message_recipient(1, "usr_b").await.unwrap();

        let first = Utc::now();
        assert_eq!(
            store.set_delivered_if_null(1, "usr_b", first).await.unwrap(),
            MarkOutcome::Applied
        );
        assert_eq!(
            store
                .set_delivered_if_null(1, "usr_b", Utc::now())
                .await
                .unwrap(),
            MarkOutcome::AlreadySet
        );

        let record = store.message_recipient(1, "usr_b").await.unwrap().unwrap();
        assert_eq!(record.delivered_at, Some(first));
    }

    #[tokio::test]
    async fn missing_record_reports_not_found() {
        let store = MemoryStore::new();
        assert_eq!(
            store
                .set_read_if_null(99, "usr_x", Utc::now())
                .await
                .unwrap(),
            MarkOutcome::NotFound
        );
    }
}
