use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::Serialize;
use utoipa::ToSchema;

use crate::db::schema::messages;

pub fn serialize_i64_as_string<S: serde::Serializer>(val: &i64, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&val.to_string())
}

/// A persisted chat message. Immutable once created.
///
/// A broadcast send produces one row per recipient (copy semantics), so
/// `recipient_id` is always concrete.
#[derive(Debug, Clone, Queryable, Selectable, Serialize, ToSchema)]
#[diesel(table_name = messages)]
pub struct Message {
    #[serde(serialize_with = "serialize_i64_as_string")]
    #[schema(value_type = String)]
    pub id: i64,
    pub sender_id: String,
    pub recipient_id: String,
    pub content: Option<String>,
    pub media_url: Option<String>,
    pub is_broadcast: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = messages)]
pub struct NewMessage<'a> {
    pub id: i64,
    pub sender_id: &'a str,
    pub recipient_id: &'a str,
    pub content: Option<&'a str>,
    pub media_url: Option<&'a str>,
    pub is_broadcast: bool,
    pub created_at: DateTime<Utc>,
}

impl NewMessage<'_> {
    /// Materialize the row this insert will produce. Used by the in-memory
    /// store and when echoing the created message back to the caller.
    pub fn to_message(&self) -> Message {
        Message {
            id: self.id,
            sender_id: self.sender_id.to_string(),
            recipient_id: self.recipient_id.to_string(),
            content: self.content.map(str::to_string),
            media_url: self.media_url.map(str::to_string),
            is_broadcast: self.is_broadcast,
            created_at: self.created_at,
        }
    }
}
