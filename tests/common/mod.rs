//! Shared test utilities

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use image::{ImageFormat, Rgb, RgbImage};

use glimpse::platform::{
    ChannelInfo, ChatClient, HistoryMessage, HistorySource, InlineAnswer, MediaHandle,
    StickerSetInfo, StickerSetRef,
};
use glimpse::{DbPool, Error, Result, db};

/// Set up an in-memory test database
#[must_use]
pub fn setup_test_db() -> DbPool {
    db::init_memory().expect("failed to init test db")
}

/// File-backed database with a full pool; keep the `TempDir` alive
#[must_use]
pub fn setup_file_db() -> (tempfile::TempDir, DbPool) {
    let tmp = tempfile::tempdir().expect("tempdir");
    let pool = db::init(tmp.path().join("glimpse.db")).expect("failed to init file db");
    (tmp, pool)
}

/// PNG with a pattern chosen by `variant`; different variants hash differently
#[must_use]
pub fn test_png(variant: u8) -> Vec<u8> {
    let img = RgbImage::from_fn(64, 64, |x, y| {
        let on = match variant % 4 {
            0 => y < 32,
            1 => x < 32,
            2 => (x < 32) ^ (y < 32),
            _ => x + y < 64,
        };
        if on { Rgb([240, 240, 240]) } else { Rgb([15, 15, 15]) }
    });
    let mut out = Vec::new();
    img.write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
        .expect("encode png");
    out
}

/// A message the mock chat client sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sent {
    pub chat_id: i64,
    pub message_id: i64,
    pub text: String,
    pub reply_to: Option<i64>,
}

/// In-memory chat client recording every call
#[derive(Default)]
pub struct MockChat {
    next_id: AtomicI64,
    pub sent: Mutex<Vec<Sent>>,
    pub edits: Mutex<Vec<(i64, i64, String)>>,
    pub files: Mutex<HashMap<String, Vec<u8>>>,
    pub uploads: Mutex<Vec<PathBuf>>,
    pub answers: Mutex<Vec<(String, InlineAnswer)>>,
    /// Uploads of paths containing this string fail
    pub fail_uploads_matching: Mutex<Option<String>>,
    /// Runs inside every upload, before it returns
    pub on_upload: Mutex<Option<Box<dyn Fn() + Send + Sync>>>,
}

impl MockChat {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicI64::new(100),
            ..Self::default()
        })
    }

    pub fn add_file(&self, file_id: &str, bytes: Vec<u8>) {
        self.files.lock().unwrap().insert(file_id.to_string(), bytes);
    }

    #[must_use]
    pub fn sent_texts(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|s| s.text.clone()).collect()
    }

    #[must_use]
    pub fn upload_count(&self) -> usize {
        self.uploads.lock().unwrap().len()
    }
}

#[async_trait]
impl ChatClient for MockChat {
    async fn send_message(&self, chat_id: i64, text: &str, reply_to: Option<i64>) -> Result<i64> {
        let message_id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.sent.lock().unwrap().push(Sent {
            chat_id,
            message_id,
            text: text.to_string(),
            reply_to,
        });
        Ok(message_id)
    }

    async fn edit_message(&self, chat_id: i64, message_id: i64, text: &str) -> Result<()> {
        self.edits
            .lock()
            .unwrap()
            .push((chat_id, message_id, text.to_string()));
        Ok(())
    }

    async fn download_file(&self, file_id: &str) -> Result<Vec<u8>> {
        self.files
            .lock()
            .unwrap()
            .get(file_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("file {file_id}")))
    }

    async fn upload_photo(&self, path: &Path) -> Result<String> {
        let failing = self.fail_uploads_matching.lock().unwrap().clone();
        if failing.is_some_and(|f| path.to_string_lossy().contains(&f)) {
            return Err(Error::Platform("upload rejected".to_string()));
        }
        if let Some(hook) = self.on_upload.lock().unwrap().as_ref() {
            hook();
        }
        let mut uploads = self.uploads.lock().unwrap();
        uploads.push(path.to_path_buf());
        Ok(format!("file-{}", uploads.len()))
    }

    async fn answer_inline_query(&self, query_id: &str, answer: &InlineAnswer) -> Result<()> {
        self.answers
            .lock()
            .unwrap()
            .push((query_id.to_string(), answer.clone()));
        Ok(())
    }
}

/// Scripted channel history
pub struct MockHistory {
    pub channel: ChannelInfo,
    pub messages: Vec<HistoryMessage>,
    pub media: HashMap<String, Vec<u8>>,
    pub sticker_sets: HashMap<String, StickerSetInfo>,
    pub sticker_set_calls: AtomicUsize,
    pub join_error: Option<String>,
    pub joined: AtomicUsize,
    /// Resolving any reference fails with this platform error
    pub resolve_error: Option<String>,
}

impl MockHistory {
    #[must_use]
    pub fn new(id: i64, name: &str) -> Self {
        Self {
            channel: ChannelInfo {
                id,
                name: name.to_string(),
                handle: Some(name.to_string()),
            },
            messages: Vec::new(),
            media: HashMap::new(),
            sticker_sets: HashMap::new(),
            sticker_set_calls: AtomicUsize::new(0),
            join_error: None,
            joined: AtomicUsize::new(0),
            resolve_error: None,
        }
    }
}

#[async_trait]
impl HistorySource for MockHistory {
    async fn resolve_channel(&self, reference: &str) -> Result<ChannelInfo> {
        if let Some(reason) = &self.resolve_error {
            return Err(Error::Platform(reason.clone()));
        }
        if reference == self.channel.name {
            Ok(self.channel.clone())
        } else {
            Err(Error::ChannelNotFound(reference.to_string()))
        }
    }

    fn iter_messages<'a>(
        &'a self,
        _channel: &'a ChannelInfo,
    ) -> BoxStream<'a, Result<HistoryMessage>> {
        stream::iter(self.messages.iter().cloned().map(Ok)).boxed()
    }

    async fn sticker_set(&self, set: &StickerSetRef) -> Result<StickerSetInfo> {
        self.sticker_set_calls.fetch_add(1, Ordering::SeqCst);
        self.sticker_sets
            .get(&set.short_name)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("sticker set {}", set.short_name)))
    }

    async fn download_media(&self, media: &MediaHandle, dest: &Path) -> Result<()> {
        let bytes = self
            .media
            .get(&media.0)
            .ok_or_else(|| Error::NotFound(format!("media {media}")))?;
        tokio::fs::write(dest, bytes).await?;
        Ok(())
    }

    async fn join_channel(&self, _channel: &ChannelInfo) -> Result<()> {
        self.joined.fetch_add(1, Ordering::SeqCst);
        match &self.join_error {
            Some(reason) => Err(Error::Platform(reason.clone())),
            None => Ok(()),
        }
    }
}
