//! Work items for the ingestion queue

use std::fmt;
use std::path::{Path, PathBuf};

use crate::media::{Link, MediaItem, PerceptualHash};

/// One downloaded media item waiting to be processed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Job {
    Photo {
        file: PathBuf,
        phash: PerceptualHash,
        channel_id: i64,
        message_id: i64,
        ocr_hint: Option<String>,
    },
    Sticker {
        file: PathBuf,
        phash: PerceptualHash,
        sticker_set_id: i64,
    },
}

impl Job {
    /// Local file the job reads
    #[must_use]
    pub fn file(&self) -> &Path {
        match self {
            Self::Photo { file, .. } | Self::Sticker { file, .. } => file,
        }
    }

    /// Processor input for this job
    #[must_use]
    pub fn into_item(self) -> MediaItem {
        match self {
            Self::Photo {
                file,
                phash,
                channel_id,
                message_id,
                ocr_hint,
            } => MediaItem {
                file,
                phash,
                link: Link::ChannelMessage {
                    channel_id,
                    message_id,
                },
                ocr_hint,
            },
            Self::Sticker {
                file,
                phash,
                sticker_set_id,
            } => MediaItem {
                file,
                phash,
                link: Link::StickerSet { sticker_set_id },
                ocr_hint: None,
            },
        }
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Photo { message_id, .. } => write!(f, "message {message_id}"),
            Self::Sticker {
                phash,
                sticker_set_id,
                ..
            } => write!(f, "sticker {phash} of set {sticker_set_id}"),
        }
    }
}

/// Queue entry: a job, or the end-of-input sentinel
#[derive(Debug)]
pub(crate) enum WorkItem {
    Job(Job),
    Done,
}
