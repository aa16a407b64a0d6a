//! Durable storage boundary.
//!
//! All persistence goes through [`ChatStore`]: a Postgres-backed
//! implementation in production and an in-memory one in tests. The delivery
//! timestamps use conditional update-if-null so that repeated
//! acknowledgements are first-write-wins under concurrent access.

pub mod memory;
pub mod pg;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::ApiError;
use crate::models::message::{Message, NewMessage};
use crate::models::message_recipient::MessageRecipient;
use crate::models::user::{NewUser, User};

pub use memory::MemoryStore;
pub use pg::PgStore;

/// Outcome of a conditional timestamp update on a delivery record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkOutcome {
    /// The timestamp was NULL and has been set.
    Applied,
    /// The timestamp was already set; the row is untouched.
    AlreadySet,
    /// No record exists for this (message, recipient) pair.
    NotFound,
}

#[async_trait]
pub trait ChatStore: Send + Sync {
    // -----------------------------------------------------------------------
    // Users
    // -----------------------------------------------------------------------

    async fn create_user(&self, user: NewUser<'_>) -> Result<User, ApiError>;
    async fn user_by_id(&self, id: &str) -> Result<Option<User>, ApiError>;
    async fn user_by_username(&self, username: &str) -> Result<Option<User>, ApiError>;
    async fn user_by_email(&self, email: &str) -> Result<Option<User>, ApiError>;
    /// All users except the given one. Snapshot semantics: broadcast fan-out
    /// enumerates membership exactly once, at send time.
    async fn users_except(&self, user_id: &str) -> Result<Vec<User>, ApiError>;
    async fn online_users(&self) -> Result<Vec<User>, ApiError>;
    /// Mirror the hub-owned online flag into durable storage.
    async fn set_online(&self, user_id: &str, online: bool) -> Result<(), ApiError>;

    // -----------------------------------------------------------------------
    // Messages
    // -----------------------------------------------------------------------

    async fn create_message(&self, message: NewMessage<'_>) -> Result<Message, ApiError>;
    async fn messages_between(&self, user_a: &str, user_b: &str)
        -> Result<Vec<Message>, ApiError>;
    async fn messages_for_user(&self, user_id: &str) -> Result<Vec<Message>, ApiError>;

    // -----------------------------------------------------------------------
    // Delivery records
    // -----------------------------------------------------------------------

    async fn create_message_recipient(
        &self,
        message_id: i64,
        recipient_id: &str,
    ) -> Result<(), ApiError>;
    async fn message_recipient(
        &self,
        message_id: i64,
        recipient_id: &str,
    ) -> Result<Option<MessageRecipient>, ApiError>;
    async fn set_delivered_if_null(
        &self,
        message_id: i64,
        recipient_id: &str,
        at: DateTime<Utc>,
    ) -> Result<MarkOutcome, ApiError>;
    async fn set_read_if_null(
        &self,
        message_id: i64,
        recipient_id: &str,
        at: DateTime<Utc>,
    ) -> Result<MarkOutcome, ApiError>;
}
