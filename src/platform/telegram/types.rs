//! Telegram Bot API request/response types

use serde::{Deserialize, Serialize};

use crate::dispatch::event::ChatKind;

/// Telegram Bot API base URL
pub(crate) const API_BASE: &str = "https://api.telegram.org/bot";

/// Telegram file download base URL
pub(crate) const FILE_BASE: &str = "https://api.telegram.org/file/bot";

/// Generic Bot API envelope
#[derive(Debug, Deserialize)]
pub(crate) struct TelegramResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    pub description: Option<String>,
}

/// Telegram sendMessage request
#[derive(Serialize)]
pub(crate) struct SendMessageRequest<'a> {
    pub chat_id: i64,
    pub text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parse_mode: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to_message_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disable_web_page_preview: Option<bool>,
}

/// Telegram editMessageText request
#[derive(Serialize)]
pub(crate) struct EditMessageTextRequest<'a> {
    pub chat_id: i64,
    pub message_id: i64,
    pub text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parse_mode: Option<&'a str>,
}

/// Telegram getFile request
#[derive(Serialize)]
pub(crate) struct GetFileRequest<'a> {
    pub file_id: &'a str,
}

/// Telegram answerInlineQuery request
#[derive(Serialize)]
pub(crate) struct AnswerInlineQueryRequest<'a> {
    pub inline_query_id: &'a str,
    pub results: Vec<InlineQueryResult<'a>>,
    pub cache_time: u32,
    /// Empty string tells the client there are no more pages
    pub next_offset: &'a str,
}

/// Subset of `InlineQueryResult` variants we send
#[derive(Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub(crate) enum InlineQueryResult<'a> {
    Photo {
        id: &'a str,
        photo_file_id: &'a str,
    },
    Article {
        id: &'a str,
        title: &'a str,
        input_message_content: InputTextMessageContent<'a>,
    },
}

#[derive(Serialize)]
pub(crate) struct InputTextMessageContent<'a> {
    pub message_text: &'a str,
}

/// Sent message (subset)
#[derive(Debug, Deserialize)]
pub(crate) struct SentMessage {
    pub message_id: i64,
    #[serde(default)]
    pub photo: Vec<PhotoSize>,
}

/// Telegram file metadata
#[derive(Debug, Deserialize)]
pub(crate) struct TelegramFile {
    pub file_path: Option<String>,
}

/// Bot identity from getMe
#[derive(Debug, Clone, Deserialize)]
pub struct BotUser {
    pub id: i64,
    pub username: Option<String>,
}

/// A single update from getUpdates
#[derive(Debug, Deserialize)]
pub(crate) struct Update {
    pub update_id: i64,
    pub message: Option<UpdateMessage>,
    pub inline_query: Option<UpdateInlineQuery>,
    pub chosen_inline_result: Option<UpdateChosenResult>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UpdateMessage {
    pub message_id: i64,
    pub chat: UpdateChat,
    pub from: Option<UpdateUser>,
    pub text: Option<String>,
    pub caption: Option<String>,
    pub photo: Option<Vec<PhotoSize>>,
    pub sticker: Option<UpdateSticker>,
    pub document: Option<UpdateDocument>,
    /// Present on forwarded messages (Bot API 7.0+)
    pub forward_origin: Option<serde_json::Value>,
    /// Present on forwarded messages (older Bot API)
    pub forward_date: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UpdateChat {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: Option<ChatKind>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UpdateUser {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PhotoSize {
    pub file_id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UpdateSticker {
    pub file_id: String,
    pub set_name: Option<String>,
    #[serde(default)]
    pub is_animated: bool,
    #[serde(default)]
    pub is_video: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UpdateDocument {
    pub file_id: String,
    pub mime_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UpdateInlineQuery {
    pub id: String,
    pub from: UpdateUser,
    pub query: String,
    pub offset: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UpdateChosenResult {
    pub result_id: String,
    pub from: UpdateUser,
    pub query: String,
}
