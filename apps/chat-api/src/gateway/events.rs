//! Wire-format payloads exchanged over the gateway WebSocket.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::models::user::UserSummary;

// ---------------------------------------------------------------------------
// Server → Client presence events
// ---------------------------------------------------------------------------

/// Fire-and-forget presence notifications pushed by the hub.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum PresenceEvent {
    #[serde(rename = "user_online")]
    UserOnline {
        #[serde(rename = "userId")]
        user_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        user: Option<UserSummary>,
    },
    #[serde(rename = "user_offline")]
    UserOffline {
        #[serde(rename = "userId")]
        user_id: String,
    },
    #[serde(rename = "online_users")]
    OnlineUsers {
        #[serde(rename = "userIds")]
        user_ids: Vec<String>,
    },
}

impl PresenceEvent {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap()
    }
}

// ---------------------------------------------------------------------------
// Client → Server frames
// ---------------------------------------------------------------------------

/// Acknowledgement kind carried by an inbound ack frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckKind {
    Delivered,
    Read,
}

/// Chat payload accepted either bare or wrapped in a `message` envelope.
///
/// `sender_id` and `created_at` are accepted for wire compatibility but
/// ignored: the session's authenticated identity and the server clock win.
#[derive(Debug, Deserialize)]
pub struct ChatFrame {
    #[serde(default)]
    pub sender_id: Option<String>,
    #[serde(default)]
    pub recipient_id: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub media_url: Option<String>,
    #[serde(default)]
    pub is_broadcast: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Every inbound text frame decodes to exactly one of these.
#[derive(Debug)]
pub enum ClientFrame {
    Ack { kind: AckKind, message_id: i64 },
    Chat(ChatFrame),
    Unknown,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum TaggedFrame {
    Delivered {
        #[serde(deserialize_with = "id_from_string_or_number")]
        message_id: i64,
    },
    Read {
        #[serde(deserialize_with = "id_from_string_or_number")]
        message_id: i64,
    },
    Message {
        payload: ChatFrame,
    },
}

/// Decode one inbound text frame.
///
/// Anything that fails to parse as a recognized shape maps to
/// [`ClientFrame::Unknown`]; malformed frames are dropped, never answered.
pub fn decode_frame(text: &str) -> ClientFrame {
    if let Ok(tagged) = serde_json::from_str::<TaggedFrame>(text) {
        return match tagged {
            TaggedFrame::Delivered { message_id } => ClientFrame::Ack {
                kind: AckKind::Delivered,
                message_id,
            },
            TaggedFrame::Read { message_id } => ClientFrame::Ack {
                kind: AckKind::Read,
                message_id,
            },
            TaggedFrame::Message { payload } => ClientFrame::Chat(payload),
        };
    }

    // Bare chat payload with no envelope.
    if let Ok(chat) = serde_json::from_str::<ChatFrame>(text) {
        if chat.content.is_some() || chat.media_url.is_some() {
            return ClientFrame::Chat(chat);
        }
    }

    ClientFrame::Unknown
}

fn id_from_string_or_number<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Number(i64),
        Text(String),
    }

    match Repr::deserialize(d)? {
        Repr::Number(n) => Ok(n),
        Repr::Text(s) => s.parse().map_err(serde::de::Error::custom),
    }
}
