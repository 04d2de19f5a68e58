//! Inbound platform events

use serde::{Deserialize, Serialize};

/// An inbound event from the chat platform
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Message(Message),
    InlineQuery(InlineQuery),
    ChosenInlineResult(ChosenInlineResult),
    /// Anything the typed variants don't cover, kept verbatim
    Raw(RawUpdate),
}

impl Event {
    /// Short kind label for logs
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Message(_) => "message",
            Self::InlineQuery(_) => "inline_query",
            Self::ChosenInlineResult(_) => "chosen_inline_result",
            Self::Raw(_) => "raw",
        }
    }

    #[must_use]
    pub const fn as_message(&self) -> Option<&Message> {
        match self {
            Self::Message(m) => Some(m),
            _ => None,
        }
    }
}

/// Chat type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatKind {
    Private,
    Group,
    Supergroup,
    /// Broadcast channel
    Channel,
}

/// A chat message
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Message {
    pub message_id: i64,
    pub chat_id: i64,
    pub chat_kind: Option<ChatKind>,
    pub sender_id: Option<i64>,
    /// Sent by this bot
    pub outgoing: bool,
    pub forwarded: bool,
    /// Text, or the caption of a media message
    pub text: Option<String>,
    pub media: Option<Media>,
}

impl Message {
    #[must_use]
    pub fn is_private(&self) -> bool {
        self.chat_kind == Some(ChatKind::Private)
    }

    #[must_use]
    pub fn is_group(&self) -> bool {
        matches!(self.chat_kind, Some(ChatKind::Group | ChatKind::Supergroup))
    }

    #[must_use]
    pub fn is_broadcast(&self) -> bool {
        self.chat_kind == Some(ChatKind::Channel)
    }
}

/// Media attached to a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Media {
    /// Largest available photo size
    Photo { file_id: String },
    Sticker {
        file_id: String,
        set_name: Option<String>,
        /// Animated (TGS) or video (WebM) stickers cannot be hashed
        animated: bool,
    },
    Document {
        file_id: String,
        mime_type: Option<String>,
    },
    Other,
}

/// An inline query typed in any chat
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InlineQuery {
    pub id: String,
    pub user_id: i64,
    pub query: String,
    /// Opaque page cursor echoed back from the previous answer
    pub offset: String,
}

/// A user picked one of our inline results
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChosenInlineResult {
    pub result_id: String,
    pub user_id: i64,
    pub query: String,
}

/// Unmodelled update
#[derive(Debug, Clone, PartialEq)]
pub struct RawUpdate {
    pub update_id: i64,
    pub payload: serde_json::Value,
}
