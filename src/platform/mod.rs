//! Chat platform seams
//!
//! [`ChatClient`] covers the live bot account: replies, edits, downloads,
//! uploads and inline answers. [`HistorySource`] covers reading a channel's
//! past messages for ingestion.

pub mod archive;
pub mod telegram;

use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::Result;

pub use archive::ExportArchive;
pub use telegram::TelegramClient;

/// Live chat operations
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Send a text message, returning its message id
    async fn send_message(&self, chat_id: i64, text: &str, reply_to: Option<i64>) -> Result<i64>;

    /// Replace the text of a previously sent message
    async fn edit_message(&self, chat_id: i64, message_id: i64, text: &str) -> Result<()>;

    /// Fetch a file's bytes by platform file id
    async fn download_file(&self, file_id: &str) -> Result<Vec<u8>>;

    /// Upload a local photo and return a reusable reference to it
    async fn upload_photo(&self, path: &Path) -> Result<String>;

    /// Answer an inline query with one page of results
    async fn answer_inline_query(&self, query_id: &str, answer: &InlineAnswer) -> Result<()>;
}

/// One result in an inline answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InlineResult {
    /// Previously uploaded photo
    CachedPhoto { id: String, file_id: String },
    /// Text-only entry (used for placeholders)
    Article {
        id: String,
        title: String,
        message_text: String,
    },
}

/// A page of inline results
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InlineAnswer {
    pub results: Vec<InlineResult>,
    /// Cursor for the next page; `None` marks the end
    pub next_offset: Option<String>,
    pub cache_time: u32,
}

/// A channel resolved from a user-supplied reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelInfo {
    pub id: i64,
    pub name: String,
    pub handle: Option<String>,
}

/// Opaque locator a [`HistorySource`] can download
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MediaHandle(pub String);

impl fmt::Display for MediaHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reference to a sticker set as seen on a message
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StickerSetRef {
    pub short_name: String,
}

/// Full sticker set with every document in it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StickerSetInfo {
    pub id: i64,
    pub short_name: String,
    pub title: String,
    pub documents: Vec<MediaHandle>,
}

/// Media carried by a historical message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryMedia {
    Photo(MediaHandle),
    Sticker(StickerSetRef),
    Other,
}

/// One message from a channel's history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryMessage {
    pub id: i64,
    pub media: Option<HistoryMedia>,
    /// Precomputed OCR text for the attached photo
    pub ocr_hint: Option<String>,
}

/// Read access to channel history
#[async_trait]
pub trait HistorySource: Send + Sync {
    /// Look up a channel by reference
    ///
    /// Fails with `ChannelNotFound` if it does not exist.
    async fn resolve_channel(&self, reference: &str) -> Result<ChannelInfo>;

    /// Lazily stream the channel's messages, oldest first
    fn iter_messages<'a>(&'a self, channel: &'a ChannelInfo)
    -> BoxStream<'a, Result<HistoryMessage>>;

    /// Fetch a sticker set's metadata and documents
    async fn sticker_set(&self, set: &StickerSetRef) -> Result<StickerSetInfo>;

    /// Save a media item to `dest`
    async fn download_media(&self, media: &MediaHandle, dest: &Path) -> Result<()>;

    /// Subscribe the acting account to the channel
    async fn join_channel(&self, channel: &ChannelInfo) -> Result<()>;
}
