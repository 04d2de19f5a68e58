//! Reverse image search in private chats

use std::sync::Arc;

use async_trait::async_trait;

use super::{BotServices, NOT_FOUND_TEXT, PROCESSING_ERROR_TEXT, SEND_IMAGE_TEXT};
use crate::db::{self, SourceLink};
use crate::dispatch::event::{Media, Message};
use crate::dispatch::{Context, Flow, Handler};
use crate::media::PerceptualHash;
use crate::{Error, Result};

/// Looks up where a received photo or sticker was posted
pub struct ReverseSearchHandler {
    services: Arc<BotServices>,
}

impl ReverseSearchHandler {
    #[must_use]
    pub const fn new(services: Arc<BotServices>) -> Self {
        Self { services }
    }

    async fn reply(&self, msg: &Message, text: &str) -> Result<()> {
        self.services
            .client
            .send_message(msg.chat_id, text, Some(msg.message_id))
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl Handler for ReverseSearchHandler {
    fn name(&self) -> &str {
        "reverse_search"
    }

    async fn handle(&self, ctx: &Context) -> Result<Flow> {
        let Some(msg) = ctx.event.as_message() else {
            return Ok(Flow::Continue);
        };
        let file_id = match &msg.media {
            Some(
                Media::Photo { file_id }
                | Media::Sticker {
                    file_id,
                    animated: false,
                    ..
                },
            ) => file_id,
            _ => {
                self.reply(msg, SEND_IMAGE_TEXT).await?;
                return Ok(Flow::Stop);
            }
        };

        let reply = match self.lookup(ctx, file_id).await {
            Ok(Lookup::Found(link)) => link.url(),
            Ok(Lookup::Unknown | Lookup::NotAnImage) => NOT_FOUND_TEXT.to_string(),
            Err(e) => {
                tracing::warn!(chat_id = msg.chat_id, error = %e, "reverse search failed");
                PROCESSING_ERROR_TEXT.to_string()
            }
        };
        self.reply(msg, &reply).await?;
        Ok(Flow::Stop)
    }
}

/// Result of looking up a received image
enum Lookup {
    Found(SourceLink),
    Unknown,
    NotAnImage,
}

impl ReverseSearchHandler {
    async fn lookup(&self, ctx: &Context, file_id: &str) -> Result<Lookup> {
        let bytes = self.services.client.download_file(file_id).await?;
        let hashed = tokio::task::spawn_blocking(move || PerceptualHash::of_bytes(&bytes))
            .await
            .map_err(|e| Error::Media(format!("hash task failed: {e}")))?;
        let phash = match hashed {
            Ok(phash) => phash,
            Err(e) => {
                tracing::debug!(error = %e, "received media is not a decodable image");
                return Ok(Lookup::NotAnImage);
            }
        };

        let source = ctx.session()?.with(|conn| {
            let Some(image) = db::image::find_by_phash(conn, &phash.to_string())? else {
                return Ok(None);
            };
            db::channel::find_source(conn, image.id)
        })?;

        tracing::info!(%phash, found = source.is_some(), "reverse search");
        Ok(source.map_or(Lookup::Unknown, Lookup::Found))
    }
}

/// Nudges private chats toward sending an image
pub struct FallbackHandler {
    services: Arc<BotServices>,
}

impl FallbackHandler {
    #[must_use]
    pub const fn new(services: Arc<BotServices>) -> Self {
        Self { services }
    }
}

#[async_trait]
impl Handler for FallbackHandler {
    fn name(&self) -> &str {
        "fallback"
    }

    async fn handle(&self, ctx: &Context) -> Result<Flow> {
        let Some(msg) = ctx.event.as_message() else {
            return Ok(Flow::Continue);
        };
        // Unknown commands get no reply
        if msg.text.as_deref().is_some_and(|t| t.starts_with('/')) {
            return Ok(Flow::Continue);
        }
        self.services
            .client
            .send_message(msg.chat_id, SEND_IMAGE_TEXT, Some(msg.message_id))
            .await?;
        Ok(Flow::Stop)
    }
}
