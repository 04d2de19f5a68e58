//! Slash commands

use std::sync::Arc;

use async_trait::async_trait;

use super::BotServices;
use crate::dispatch::{Context, Flow, Handler};
use crate::ingest::{ChatProgress, Ingestor};
use crate::{Error, Result};

const HELP_TEXT: &str = "Send me a picture or a sticker and I will tell you where it was posted.\n\
\n\
You can also search saved images by their text from any chat: type my username followed by a few words.";

const DOWNLOAD_USAGE: &str = "Usage: /download CHANNEL";
const DOWNLOAD_FORBIDDEN: &str = "This command is not available here.";
const DOWNLOAD_UNAVAILABLE: &str = "Downloads are not configured.";

/// `/start` and `/help`
pub struct HelpHandler {
    services: Arc<BotServices>,
}

impl HelpHandler {
    #[must_use]
    pub const fn new(services: Arc<BotServices>) -> Self {
        Self { services }
    }
}

#[async_trait]
impl Handler for HelpHandler {
    fn name(&self) -> &str {
        "help"
    }

    async fn handle(&self, ctx: &Context) -> Result<Flow> {
        let Some(msg) = ctx.event.as_message() else {
            return Ok(Flow::Continue);
        };
        self.services
            .client
            .send_message(msg.chat_id, HELP_TEXT, None)
            .await?;
        Ok(Flow::Stop)
    }
}

/// `/download <channel>`: ingest a channel in the background
pub struct DownloadHandler {
    services: Arc<BotServices>,
}

impl DownloadHandler {
    #[must_use]
    pub const fn new(services: Arc<BotServices>) -> Self {
        Self { services }
    }
}

#[async_trait]
impl Handler for DownloadHandler {
    fn name(&self) -> &str {
        "download"
    }

    async fn handle(&self, ctx: &Context) -> Result<Flow> {
        let Some(msg) = ctx.event.as_message() else {
            return Ok(Flow::Continue);
        };
        let services = &self.services;
        let reply = |text: &'static str| {
            let client = services.client.clone();
            let (chat_id, message_id) = (msg.chat_id, msg.message_id);
            async move { client.send_message(chat_id, text, Some(message_id)).await }
        };

        if services
            .admin_chat_id
            .is_some_and(|admin| admin != msg.chat_id)
        {
            tracing::info!(chat_id = msg.chat_id, "download refused outside admin chat");
            reply(DOWNLOAD_FORBIDDEN).await?;
            return Ok(Flow::Stop);
        }
        let Some(channel_ref) = ctx.args.clone() else {
            reply(DOWNLOAD_USAGE).await?;
            return Ok(Flow::Stop);
        };
        let Some(history) = services.history.clone() else {
            reply(DOWNLOAD_UNAVAILABLE).await?;
            return Ok(Flow::Stop);
        };

        let ingestor = Ingestor::new(
            services.pool.clone(),
            history,
            services.processor.clone(),
            services.ingest.clone(),
        );
        let sink = Arc::new(ChatProgress::new(
            services.client.clone(),
            msg.chat_id,
            Some(msg.message_id),
        ));
        let client = services.client.clone();
        let (chat_id, message_id) = (msg.chat_id, msg.message_id);

        tracing::info!(chat_id, channel = %channel_ref, "download requested");
        services.spawn_background(async move {
            let failure = match ingestor.run(&channel_ref, sink).await {
                Ok(summary) => {
                    tracing::info!(channel = %channel_ref, ?summary, "download complete");
                    return;
                }
                Err(Error::ChannelNotFound(_)) => format!("Channel {channel_ref} not found."),
                Err(e) => {
                    tracing::error!(channel = %channel_ref, error = %e, "download failed");
                    format!("Download of {channel_ref} failed.")
                }
            };
            if let Err(e) = client.send_message(chat_id, &failure, Some(message_id)).await {
                tracing::warn!(error = %e, "failed to report download failure");
            }
        });

        Ok(Flow::Stop)
    }
}
