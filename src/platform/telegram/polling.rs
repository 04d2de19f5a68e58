//! Telegram polling mode: getUpdates loop and update conversion

use std::time::Duration;

use serde::Deserialize;
use tokio::sync::mpsc;

use super::dedup::UpdateDedup;
use super::types::{Update, UpdateMessage};
use crate::dispatch::event::{
    ChosenInlineResult, Event, InlineQuery, Media, Message, RawUpdate,
};

/// Long-poll timeout passed to getUpdates
const LONG_POLL_SECS: u64 = 30;

/// Response from Telegram getUpdates API
#[derive(Debug, Deserialize)]
struct GetUpdatesResponse {
    #[serde(default)]
    result: Vec<serde_json::Value>,
}

impl super::TelegramClient {
    /// Spawn a background task that polls getUpdates and forwards events
    ///
    /// `bot_id` marks messages sent by this bot as outgoing. The task ends
    /// when the receiving side of `tx` is dropped.
    pub fn start_polling(
        &self,
        bot_id: i64,
        interval: Duration,
        tx: mpsc::Sender<Event>,
    ) -> tokio::task::JoinHandle<()> {
        let client = self.clone();
        tokio::spawn(async move {
            client.polling_loop(bot_id, interval, tx).await;
        })
    }

    async fn polling_loop(&self, bot_id: i64, interval: Duration, tx: mpsc::Sender<Event>) {
        // getUpdates is refused while a webhook is set
        if let Err(e) = self.client.post(self.method_url("deleteWebhook")).send().await {
            tracing::warn!(error = %e, "failed to delete Telegram webhook before polling");
        }

        let mut offset: Option<i64> = None;
        let mut dedup = UpdateDedup::default();
        tracing::info!("Telegram polling started");

        loop {
            let mut params = serde_json::json!({
                "timeout": LONG_POLL_SECS,
                "allowed_updates": ["message", "inline_query", "chosen_inline_result"],
            });
            if let Some(off) = offset {
                params["offset"] = serde_json::json!(off);
            }

            let updates = match self
                .client
                .post(self.method_url("getUpdates"))
                .timeout(Duration::from_secs(LONG_POLL_SECS + 10))
                .json(&params)
                .send()
                .await
            {
                Ok(resp) => match resp.json::<GetUpdatesResponse>().await {
                    Ok(body) => body.result,
                    Err(e) => {
                        tracing::warn!(error = %e, "Telegram getUpdates parse error");
                        Vec::new()
                    }
                },
                Err(e) => {
                    tracing::warn!(error = %e, "Telegram getUpdates error");
                    Vec::new()
                }
            };

            let received = updates.len();
            for value in updates {
                let Some(update_id) = value.get("update_id").and_then(serde_json::Value::as_i64)
                else {
                    continue;
                };
                // Advance offset past this update
                offset = Some(update_id + 1);

                if dedup.is_duplicate(update_id) {
                    continue;
                }

                let event = update_to_event(value, bot_id);
                if tx.send(event).await.is_err() {
                    tracing::info!("event receiver closed, polling stopped");
                    return;
                }
            }

            if received == 0 {
                tokio::time::sleep(interval).await;
            }
        }
    }
}

/// Convert a raw update into a dispatch event
#[must_use]
pub fn update_to_event(value: serde_json::Value, bot_id: i64) -> Event {
    let update_id = value
        .get("update_id")
        .and_then(serde_json::Value::as_i64)
        .unwrap_or_default();

    let Ok(update) = serde_json::from_value::<Update>(value.clone()) else {
        return Event::Raw(RawUpdate {
            update_id,
            payload: value,
        });
    };

    if let Some(msg) = update.message {
        return Event::Message(convert_message(msg, bot_id));
    }
    if let Some(q) = update.inline_query {
        return Event::InlineQuery(InlineQuery {
            id: q.id,
            user_id: q.from.id,
            query: q.query,
            offset: q.offset,
        });
    }
    if let Some(r) = update.chosen_inline_result {
        return Event::ChosenInlineResult(ChosenInlineResult {
            result_id: r.result_id,
            user_id: r.from.id,
            query: r.query,
        });
    }

    Event::Raw(RawUpdate {
        update_id,
        payload: value,
    })
}

fn convert_message(msg: UpdateMessage, bot_id: i64) -> Message {
    let media = if let Some(largest) = msg.photo.and_then(|sizes| sizes.into_iter().last()) {
        Some(Media::Photo {
            file_id: largest.file_id,
        })
    } else if let Some(sticker) = msg.sticker {
        Some(Media::Sticker {
            file_id: sticker.file_id,
            set_name: sticker.set_name,
            animated: sticker.is_animated || sticker.is_video,
        })
    } else {
        msg.document.map(|doc| Media::Document {
            file_id: doc.file_id,
            mime_type: doc.mime_type,
        })
    };

    let sender_id = msg.from.map(|u| u.id);
    Message {
        message_id: msg.message_id,
        chat_id: msg.chat.id,
        chat_kind: msg.chat.kind,
        sender_id,
        outgoing: sender_id == Some(bot_id),
        forwarded: msg.forward_origin.is_some() || msg.forward_date.is_some(),
        text: msg.text.or(msg.caption),
        media,
    }
}
