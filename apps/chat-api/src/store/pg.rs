//! Diesel-async PostgreSQL implementation of [`ChatStore`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::result::OptionalExtension;
use diesel_async::RunQueryDsl;

use crate::db::pool::DbPool;
use crate::db::schema::{message_recipients, messages, users};
use crate::error::ApiError;
use crate::models::message::{Message, NewMessage};
use crate::models::message_recipient::{MessageRecipient, NewMessageRecipient};
use crate::models::user::{NewUser, User};

use super::{ChatStore, MarkOutcome};

pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChatStore for PgStore {
    async fn create_user(&self, user: NewUser<'_>) -> Result<User, ApiError> {
        let mut conn = self.pool.get().await?;

        diesel::insert_into(users::table)
            .values(&user)
            .returning(User::as_returning())
            .get_result(&mut conn)
            .await
            .map_err(|e| match e {
                diesel::result::Error::DatabaseError(
                    diesel::result::DatabaseErrorKind::UniqueViolation,
                    ref info,
                ) => {
                    let constraint = info.constraint_name().unwrap_or("");
                    if constraint.contains("username") {
                        ApiError::conflict("Username is already taken")
                    } else if constraint.contains("email") {
                        ApiError::conflict("Email is already registered")
                    } else {
                        ApiError::conflict("A user with that information already exists")
                    }
                }
                other => ApiError::from(other),
            })
    }

    async fn user_by_id(&self, id: &str) -> Result<Option<User>, ApiError> {
        let mut conn = self.pool.get().await?;

        let user = users::table
            .find(id)
            .select(User::as_select())
            .first(&mut conn)
            .await
            .optional()?;

        Ok(user)
    }

    async fn user_by_username(&self, username: &str) -> Result<Option<User>, ApiError> {
        let mut conn = self.pool.get().await?;

        let user = users::table
            .filter(users::username.eq(username))
            .select(User::as_select())
            .first(&mut conn)
            .await
            .optional()?;

        Ok(user)
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<User>, ApiError> {
        let mut conn = self.pool.get().await?;

        let user = users::table
            .filter(users::email.eq(email))
            .select(User::as_select())
            .first(&mut conn)
            .await
            .optional()?;

        Ok(user)
    }

    async fn users_except(&self, user_id: &str) -> Result<Vec<User>, ApiError> {
        let mut conn = self.pool.get().await?;

        let list = users::table
            .filter(users::id.ne(user_id))
            .order(users::username.asc())
            .select(User::as_select())
            .load(&mut conn)
            .await?;

        Ok(list)
    }

    async fn online_users(&self) -> Result<Vec<User>, ApiError> {
        let mut conn = self.pool.get().await?;

        let list = users::table
            .filter(users::is_online.eq(true))
            .order(users::username.asc())
            .select(User::as_select())
            .load(&mut conn)
            .await?;

        Ok(list)
    }

    async fn set_online(&self, user_id: &str, online: bool) -> Result<(), ApiError> {
        let mut conn = self.pool.get().await?;

        diesel::update(users::table.find(user_id))
            .set(users::is_online.eq(online))
            .execute(&mut conn)
            .await?;

        Ok(())
    }

    async fn create_message(&self, message: NewMessage<'_>) -> Result<Message, ApiError> {
        let mut conn = self.pool.get().await?;

        let message = diesel::insert_into(messages::table)
            .values(&message)
            .returning(Message::as_returning())
            .get_result(&mut conn)
            .await?;

        Ok(message)
    }

    async fn messages_between(
        &self,
        user_a: &str,
        user_b: &str,
    ) -> Result<Vec<Message>, ApiError> {
        let mut conn = self.pool.get().await?;

        let list = messages::table
            .filter(
                messages::sender_id
                    .eq(user_a)
                    .and(messages::recipient_id.eq(user_b))
                    .or(messages::sender_id
                        .eq(user_b)
                        .and(messages::recipient_id.eq(user_a))),
            )
            .order(messages::created_at.asc())
            .select(Message::as_select())
            .load(&mut conn)
            .await?;

        Ok(list)
    }

    async fn messages_for_user(&self, user_id: &str) -> Result<Vec<Message>, ApiError> {
        let mut conn = self.pool.get().await?;

        let list = messages::table
            .filter(
                messages::sender_id
                    .eq(user_id)
                    .or(messages::recipient_id.eq(user_id)),
            )
            .order(messages::created_at.asc())
            .select(Message::as_select())
            .load(&mut conn)
            .await?;

        Ok(list)
    }

    async fn create_message_recipient(
        &self,
        message_id: i64,
        recipient_id: &str,
    ) -> Result<(), ApiError> {
        let mut conn = self.pool.get().await?;

        diesel::insert_into(message_recipients::table)
            .values(NewMessageRecipient {
                message_id,
                recipient_id,
            })
            .execute(&mut conn)
            .await?;

        Ok(())
    }

    async fn message_recipient(
        &self,
        message_id: i64,
        recipient_id: &str,
    ) -> Result<Option<MessageRecipient>, ApiError> {
        let mut conn = self.pool.get().await?;

        let record = message_recipients::table
            .find((message_id, recipient_id))
            .select(MessageRecipient::as_select())
            .first(&mut conn)
            .await
            .optional()?;

        Ok(record)
    }

    async fn set_delivered_if_null(
        &self,
        message_id: i64,
        recipient_id: &str,
        at: DateTime<Utc>,
    ) -> Result<MarkOutcome, ApiError> {
        let mut conn = self.pool.get().await?;

        // Row-scoped conditional update: first write wins, replays touch nothing.
        let updated = diesel::update(
            message_recipients::table
                .find((message_id, recipient_id))
                .filter(message_recipients::delivered_at.is_null()),
        )
        .set(message_recipients::delivered_at.eq(at))
        .execute(&mut conn)
        .await?;

        if updated > 0 {
            return Ok(MarkOutcome::Applied);
        }

        let exists: i64 = message_recipients::table
            .find((message_id, recipient_id))
            .count()
            .get_result(&mut conn)
            .await?;

        if exists > 0 {
            Ok(MarkOutcome::AlreadySet)
        } else {
            Ok(MarkOutcome::NotFound)
        }
    }

    async fn set_read_if_null(
        &self,
        message_id: i64,
        recipient_id: &str,
        at: DateTime<Utc>,
    ) -> Result<MarkOutcome, ApiError> {
        let mut conn = self.pool.get().await?;

        let updated = diesel::update(
            message_recipients::table
                .find((message_id, recipient_id))
                .filter(message_recipients::read_at.is_null()),
        )
        .set(message_recipients::read_at.eq(at))
        .execute(&mut conn)
        .await?;

        if updated > 0 {
            return Ok(MarkOutcome::Applied);
        }

        let exists: i64 = message_recipients::table
            .find((message_id, recipient_id))
            .count()
            .get_result(&mut conn)
            .await?;

        if exists > 0 {
            Ok(MarkOutcome::AlreadySet)
        } else {
            Ok(MarkOutcome::NotFound)
        }
    }
}
