//! Telegram Bot API adapter
//!
//! Long-polls `getUpdates` for inbound events and implements [`ChatClient`]
//! for replies, progress edits, file downloads and inline answers.

mod api;
pub mod dedup;
pub mod polling;
pub mod types;

use std::path::Path;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};

use super::{ChatClient, InlineAnswer};
use crate::Result;

pub use dedup::UpdateDedup;
pub use types::BotUser;
use types::{API_BASE, FILE_BASE};

/// Telegram Bot API client
#[derive(Clone)]
pub struct TelegramClient {
    token: SecretString,
    client: Client,
    /// Chat used to mint reusable photo ids for inline results
    storage_chat_id: Option<i64>,
}

impl TelegramClient {
    #[must_use]
    pub fn new(token: SecretString, storage_chat_id: Option<i64>) -> Self {
        Self {
            token,
            client: Client::new(),
            storage_chat_id,
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{API_BASE}{}/{method}", self.token.expose_secret())
    }

    fn file_url(&self, file_path: &str) -> String {
        format!("{FILE_BASE}{}/{file_path}", self.token.expose_secret())
    }
}

#[async_trait]
impl ChatClient for TelegramClient {
    async fn send_message(&self, chat_id: i64, text: &str, reply_to: Option<i64>) -> Result<i64> {
        self.send_text(chat_id, text, reply_to).await
    }

    async fn edit_message(&self, chat_id: i64, message_id: i64, text: &str) -> Result<()> {
        self.edit_text(chat_id, message_id, text).await
    }

    async fn download_file(&self, file_id: &str) -> Result<Vec<u8>> {
        self.fetch_file(file_id).await
    }

    async fn upload_photo(&self, path: &Path) -> Result<String> {
        self.send_photo_for_file_id(path).await
    }

    async fn answer_inline_query(&self, query_id: &str, answer: &InlineAnswer) -> Result<()> {
        self.answer_inline(query_id, answer).await
    }
}
