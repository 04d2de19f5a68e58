//! Media processor: turns a downloaded file into a content-addressed record
//!
//! Processing is idempotent per (hash, link). The file is stored once, the
//! image row is created once, OCR text and embedding are computed only while
//! still missing and are never overwritten, and duplicate links are ignored.

pub mod phash;
pub mod storage;

use std::path::PathBuf;
use std::sync::Arc;

pub use phash::PerceptualHash;
pub use storage::ImageStore;

use crate::db::{self, DbPool, DbSession};
use crate::models::ModelPool;
use crate::Result;

/// Structural link attached to a processed image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Link {
    ChannelMessage { channel_id: i64, message_id: i64 },
    StickerSet { sticker_set_id: i64 },
}

/// One media item ready for processing
#[derive(Debug, Clone)]
pub struct MediaItem {
    /// Locally downloaded file
    pub file: PathBuf,
    pub phash: PerceptualHash,
    pub link: Link,
    /// Text known in advance (e.g. from an export's OCR results); skips OCR
    pub ocr_hint: Option<String>,
}

/// What processing changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessOutcome {
    pub image_id: i64,
    pub created: bool,
    pub linked: bool,
}

/// Stores media and materializes image records
pub struct MediaProcessor {
    pool: DbPool,
    store: ImageStore,
    models: Arc<ModelPool>,
}

impl MediaProcessor {
    #[must_use]
    pub const fn new(pool: DbPool, store: ImageStore, models: Arc<ModelPool>) -> Self {
        Self {
            pool,
            store,
            models,
        }
    }

    #[must_use]
    pub const fn store(&self) -> &ImageStore {
        &self.store
    }

    #[must_use]
    pub fn models(&self) -> &ModelPool {
        &self.models
    }

    /// Process one item
    ///
    /// # Errors
    ///
    /// Returns error if storing, model inference, or the store write fails.
    /// No partial rows are left behind on failure.
    pub async fn process(&self, item: MediaItem) -> Result<ProcessOutcome> {
        let phash = item.phash.to_string();
        let (stored, _) = self.store.store(&item.file, item.phash).await?;

        let existing = {
            let conn = db::connect(&self.pool)?;
            db::image::find_by_phash(&conn, &phash)?
        };
        let needs_text = existing
            .as_ref()
            .is_none_or(|i| i.text.as_deref().is_none_or(str::is_empty));
        let needs_embedding = existing.as_ref().is_none_or(|i| i.embedding.is_none());

        let text = if needs_text {
            match item.ocr_hint {
                Some(hint) => Some(hint),
                None => self.models.extract_text(&stored).await?,
            }
        } else {
            None
        };
        let text = text.map(|t| t.trim().to_string()).filter(|t| !t.is_empty());

        let embedding = if needs_embedding {
            self.models.embed_image(&stored).await?
        } else {
            None
        };

        let session = DbSession::new(&self.pool);
        let outcome = session.with(|conn| {
            let (image_id, created) = db::image::get_or_create(conn, &phash)?;
            if let Some(text) = &text {
                db::image::backfill_text(conn, image_id, text)?;
            }
            if let Some(embedding) = &embedding {
                db::image::backfill_embedding(conn, image_id, embedding)?;
            }
            let linked = match item.link {
                Link::ChannelMessage {
                    channel_id,
                    message_id,
                } => db::channel::insert_message(conn, channel_id, message_id, image_id)?,
                Link::StickerSet { sticker_set_id } => {
                    db::sticker::insert(conn, image_id, sticker_set_id)?
                }
            };
            Ok(ProcessOutcome {
                image_id,
                created,
                linked,
            })
        })?;
        session.commit()?;

        tracing::debug!(
            %phash,
            image_id = outcome.image_id,
            created = outcome.created,
            linked = outcome.linked,
            "processed media"
        );
        Ok(outcome)
    }
}
