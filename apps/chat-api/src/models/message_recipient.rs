use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::Serialize;
use utoipa::ToSchema;

use crate::db::schema::message_recipients;

use super::message::serialize_i64_as_string;

/// Per-(message, recipient) delivery state. Both timestamps start NULL and
/// are written exactly once, by the delivery coordinator.
#[derive(Debug, Clone, Queryable, Selectable, Serialize, ToSchema)]
#[diesel(table_name = message_recipients)]
pub struct MessageRecipient {
    #[serde(serialize_with = "serialize_i64_as_string")]
    #[schema(value_type = String)]
    pub message_id: i64,
    pub recipient_id: String,
    pub delivered_at: Option<DateTime<Utc>>,
    pub read_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = message_recipients)]
pub struct NewMessageRecipient<'a> {
    pub message_id: i64,
    pub recipient_id: &'a str,
}
