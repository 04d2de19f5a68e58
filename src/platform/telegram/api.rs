//! Raw Telegram Bot API calls

use std::path::Path;

use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;

use super::types::{
    AnswerInlineQueryRequest, BotUser, EditMessageTextRequest, GetFileRequest, InlineQueryResult,
    InputTextMessageContent, SendMessageRequest, SentMessage, TelegramFile, TelegramResponse,
};
use crate::platform::{InlineAnswer, InlineResult};
use crate::{Error, Result};

impl super::TelegramClient {
    /// Decode a Bot API envelope, turning `ok: false` into an error
    async fn decode<T: DeserializeOwned>(method: &str, response: reqwest::Response) -> Result<T> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Platform(format!("Telegram {method} response read error: {e}")))?;

        let parsed: TelegramResponse<T> = serde_json::from_str(&body).map_err(|e| {
            Error::Platform(format!("Telegram {method} parse error ({status}): {e}"))
        })?;

        match parsed.result {
            Some(result) if parsed.ok => Ok(result),
            _ => Err(Error::Platform(format!(
                "Telegram {method} error: {status} - {}",
                parsed.description.unwrap_or_default()
            ))),
        }
    }

    /// Identify the bot account
    ///
    /// # Errors
    ///
    /// Returns error if the token is invalid or the API is unreachable
    pub async fn get_me(&self) -> Result<BotUser> {
        let response = self
            .client
            .post(self.method_url("getMe"))
            .send()
            .await
            .map_err(|e| Error::Platform(format!("Telegram getMe error: {e}")))?;
        Self::decode("getMe", response).await
    }

    /// Send a message and return its id
    ///
    /// Uses HTML parse mode with plain-text fallback.
    ///
    /// # Errors
    ///
    /// Returns error if the API request fails
    pub(crate) async fn send_text(
        &self,
        chat_id: i64,
        text: &str,
        reply_to: Option<i64>,
    ) -> Result<i64> {
        let url = self.method_url("sendMessage");
        let request = SendMessageRequest {
            chat_id,
            text,
            parse_mode: Some("HTML"),
            reply_to_message_id: reply_to,
            disable_web_page_preview: Some(true),
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Platform(format!("Telegram API error: {e}")))?;

        if response.status().is_success() {
            let sent: SentMessage = Self::decode("sendMessage", response).await?;
            tracing::debug!(chat_id, message_id = sent.message_id, "Telegram message sent");
            return Ok(sent.message_id);
        }

        let body = response.text().await.unwrap_or_default();
        let body_lower = body.to_lowercase();

        // Return a descriptive error for unreachable chats (no point retrying)
        if body_lower.contains("chat not found") || body_lower.contains("bot was blocked by the user")
        {
            return Err(Error::Platform(format!(
                "Telegram chat {chat_id} not reachable: {body}"
            )));
        }

        // If HTML parse fails, retry with plain text
        let fallback = SendMessageRequest {
            parse_mode: None,
            ..request
        };
        let response = self
            .client
            .post(&url)
            .json(&fallback)
            .send()
            .await
            .map_err(|e| Error::Platform(format!("Telegram API error: {e}")))?;
        let sent: SentMessage = Self::decode("sendMessage", response).await?;
        Ok(sent.message_id)
    }

    /// Edit a message's text
    ///
    /// # Errors
    ///
    /// Returns error if the API request fails
    pub(crate) async fn edit_text(&self, chat_id: i64, message_id: i64, text: &str) -> Result<()> {
        let url = self.method_url("editMessageText");
        let request = EditMessageTextRequest {
            chat_id,
            message_id,
            text,
            parse_mode: None,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Platform(format!("Telegram editMessageText error: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();

            // Progress edits often repeat the same text
            if body.to_lowercase().contains("message is not modified") {
                return Ok(());
            }

            return Err(Error::Platform(format!(
                "Telegram editMessageText error: {status} - {body}"
            )));
        }

        Ok(())
    }

    /// Download a file by `file_id`
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be resolved or fetched
    pub(crate) async fn fetch_file(&self, file_id: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .post(self.method_url("getFile"))
            .json(&GetFileRequest { file_id })
            .send()
            .await
            .map_err(|e| Error::Platform(format!("Telegram getFile error: {e}")))?;
        let file: TelegramFile = Self::decode("getFile", response).await?;

        let file_path = file.file_path.ok_or_else(|| {
            Error::Platform("Telegram getFile returned no file_path".to_string())
        })?;

        let data = self
            .client
            .get(self.file_url(&file_path))
            .send()
            .await
            .map_err(|e| Error::Platform(format!("Telegram file download error: {e}")))?
            .error_for_status()?
            .bytes()
            .await
            .map_err(|e| Error::Platform(format!("Telegram file download read error: {e}")))?;

        Ok(data.to_vec())
    }

    /// Upload a photo to the storage chat and return the largest size's `file_id`
    ///
    /// # Errors
    ///
    /// Returns error if no storage chat is configured or the upload fails
    pub(crate) async fn send_photo_for_file_id(&self, path: &Path) -> Result<String> {
        let chat_id = self.storage_chat_id.ok_or_else(|| {
            Error::Config("GLIMPSE_STORAGE_CHAT_ID is required to upload photos".to_string())
        })?;

        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map_or_else(|| "image.jpg".to_string(), |n| n.to_string_lossy().into_owned());
        let part = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("image/jpeg")?;
        let form = Form::new()
            .text("chat_id", chat_id.to_string())
            .text("disable_notification", "true")
            .part("photo", part);

        let response = self
            .client
            .post(self.method_url("sendPhoto"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| Error::Platform(format!("Telegram sendPhoto error: {e}")))?;
        let sent: SentMessage = Self::decode("sendPhoto", response).await?;

        let file_id = sent
            .photo
            .into_iter()
            .last()
            .map(|p| p.file_id)
            .ok_or_else(|| Error::Platform("Telegram sendPhoto returned no photo".to_string()))?;

        tracing::debug!(path = %path.display(), "uploaded photo to storage chat");
        Ok(file_id)
    }

    /// Answer an inline query
    ///
    /// # Errors
    ///
    /// Returns error if the API request fails
    pub(crate) async fn answer_inline(&self, query_id: &str, answer: &InlineAnswer) -> Result<()> {
        let results = answer
            .results
            .iter()
            .map(|r| match r {
                InlineResult::CachedPhoto { id, file_id } => InlineQueryResult::Photo {
                    id,
                    photo_file_id: file_id,
                },
                InlineResult::Article {
                    id,
                    title,
                    message_text,
                } => InlineQueryResult::Article {
                    id,
                    title,
                    input_message_content: InputTextMessageContent { message_text },
                },
            })
            .collect();
        let request = AnswerInlineQueryRequest {
            inline_query_id: query_id,
            results,
            cache_time: answer.cache_time,
            next_offset: answer.next_offset.as_deref().unwrap_or_default(),
        };

        let response = self
            .client
            .post(self.method_url("answerInlineQuery"))
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Platform(format!("Telegram answerInlineQuery error: {e}")))?;
        let _: bool = Self::decode("answerInlineQuery", response).await?;
        Ok(())
    }
}
