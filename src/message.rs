//! Message model and the JSON payloads exchanged with the chat server.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Prefix marking a locally generated, not yet confirmed message identifier.
pub const TEMP_PREFIX: &str = "temp_";

pub type ConversationId = i64;
pub type UserId = i64;

/// Identifier of a message: durable once the server has assigned it.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum MessageId {
    Confirmed(i64),
    /// Local token, always starts with [`TEMP_PREFIX`].
    Temporary(String),
}

impl MessageId {
    /// Allocate a fresh temporary token.
    pub fn temporary() -> Self {
        MessageId::Temporary(format!("{}{}", TEMP_PREFIX, uuid::Uuid::new_v4().simple()))
    }

    pub fn is_temporary(&self) -> bool {
        matches!(self, MessageId::Temporary(_))
    }

    pub fn confirmed(&self) -> Option<i64> {
        match self {
            MessageId::Confirmed(id) => Some(*id),
            MessageId::Temporary(_) => None,
        }
    }

    /// Parse the textual form used by rendering surfaces (`"42"` or `"temp_..."`).
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.starts_with(TEMP_PREFIX) {
            return Some(MessageId::Temporary(raw.to_string()));
        }
        raw.trim().parse().ok().map(MessageId::Confirmed)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageId::Confirmed(id) => write!(f, "{}", id),
            MessageId::Temporary(token) => f.write_str(token),
        }
    }
}

/// At most one media attachment per message.
#[derive(Clone, Debug, PartialEq)]
pub enum Attachment {
    Image { url: String },
    Video { url: String },
    Audio { url: String },
    File {
        url: String,
        name: Option<String>,
        size: Option<u64>,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    pub id: MessageId,
    pub sender_id: UserId,
    pub sender_name: String,
    pub sender_avatar: Option<String>,
    pub content: Option<String>,
    pub attachment: Option<Attachment>,
    pub created_at: DateTime<Utc>,
    /// Only meaningful for messages we sent.
    pub read_at: Option<DateTime<Utc>>,
}

impl Message {
    /// Build a speculative message for text the local user just submitted.
    pub fn pending(sender_id: UserId, sender_name: &str, content: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: MessageId::temporary(),
            sender_id,
            sender_name: sender_name.to_string(),
            sender_avatar: None,
            content: non_empty(Some(content.to_string())),
            attachment: None,
            created_at: now,
            read_at: None,
        }
    }

    pub fn is_temporary(&self) -> bool {
        self.id.is_temporary()
    }

    /// Text content, empty when the message only carries media.
    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawId {
    Int(i64),
    Text(String),
}

/// A message as serialized by the server.
#[derive(Debug, Deserialize)]
pub struct WireMessage {
    id: RawId,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    sender: String,
    sender_id: UserId,
    #[serde(default)]
    sender_avatar: Option<String>,
    created_at: DateTime<Utc>,
    #[serde(default)]
    image: Option<String>,
    #[serde(default)]
    video: Option<String>,
    #[serde(default)]
    audio: Option<String>,
    #[serde(default)]
    file: Option<String>,
    #[serde(default)]
    file_name: Option<String>,
    #[serde(default)]
    file_size: Option<u64>,
    #[serde(default)]
    read_at: Option<DateTime<Utc>>,
}

impl TryFrom<WireMessage> for Message {
    type Error = String;

    fn try_from(wire: WireMessage) -> Result<Self, Self::Error> {
        let id = match wire.id {
            RawId::Int(id) => MessageId::Confirmed(id),
            RawId::Text(raw) => {
                MessageId::parse(&raw).ok_or_else(|| format!("unrecognised message id {:?}", raw))?
            }
        };

        // Same precedence the web client used when several URLs are present.
        let attachment = if let Some(url) = non_empty(wire.image) {
            Some(Attachment::Image { url })
        } else if let Some(url) = non_empty(wire.video) {
            Some(Attachment::Video { url })
        } else if let Some(url) = non_empty(wire.audio) {
            Some(Attachment::Audio { url })
        } else {
            non_empty(wire.file).map(|url| Attachment::File {
                url,
                name: non_empty(wire.file_name),
                size: wire.file_size,
            })
        };

        Ok(Message {
            id,
            sender_id: wire.sender_id,
            sender_name: wire.sender,
            sender_avatar: non_empty(wire.sender_avatar),
            content: non_empty(wire.content),
            attachment,
            created_at: wire.created_at,
            read_at: wire.read_at,
        })
    }
}

/// Decode a list of raw message objects, skipping entries that do not parse.
pub fn decode_messages(values: Vec<serde_json::Value>) -> Vec<Message> {
    values
        .into_iter()
        .filter_map(|value| {
            let decoded = serde_json::from_value::<WireMessage>(value)
                .map_err(|e| e.to_string())
                .and_then(Message::try_from);
            match decoded {
                Ok(msg) => Some(msg),
                Err(e) => {
                    tracing::warn!(error = %e, "skipping malformed message entry");
                    None
                }
            }
        })
        .collect()
}

/// `GET .../new-messages/` body.
#[derive(Debug, Deserialize)]
pub struct NewMessagesResponse {
    pub messages: Vec<serde_json::Value>,
    #[serde(default)]
    pub count: Option<usize>,
}

/// `GET .../messages/?before=` body.
#[derive(Debug, Deserialize)]
pub struct HistoryResponse {
    pub messages: Vec<serde_json::Value>,
    #[serde(default)]
    pub has_more: Option<bool>,
}

/// `POST .../send/` body.
#[derive(Debug, Deserialize)]
pub struct SendResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UnreadCountResponse {
    pub unread_count: u64,
}
