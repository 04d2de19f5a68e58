//! History source over Telegram Desktop JSON exports
//!
//! Layout: `{root}/{channel}/result.json` next to the exported `photos/`
//! folder. An optional OCR results file (`[{"name": ..., "text": ...}]`)
//! supplies text per photo file name so OCR can be skipped.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde::Deserialize;

use super::{
    ChannelInfo, HistoryMedia, HistoryMessage, HistorySource, MediaHandle, StickerSetInfo,
    StickerSetRef,
};
use crate::{Error, Result};

/// `result.json` (subset)
#[derive(Debug, Deserialize)]
struct ExportFile {
    id: Option<i64>,
    name: Option<String>,
    #[serde(default)]
    messages: Vec<ExportMessage>,
}

#[derive(Debug, Deserialize)]
struct ExportMessage {
    id: i64,
    #[serde(rename = "type", default)]
    kind: String,
    photo: Option<String>,
    media_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OcrEntry {
    name: String,
    text: String,
}

/// A loaded export
struct LoadedExport {
    dir: PathBuf,
    messages: Vec<HistoryMessage>,
}

/// Reads channel history from export folders under a root directory
pub struct ExportArchive {
    root: PathBuf,
    ocr_results: Option<PathBuf>,
    loaded: Mutex<HashMap<i64, Arc<LoadedExport>>>,
}

impl ExportArchive {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ocr_results: None,
            loaded: Mutex::new(HashMap::new()),
        }
    }

    /// Use an explicit OCR results file instead of `{channel}/ocr.json`
    #[must_use]
    pub fn with_ocr_results(mut self, path: impl Into<PathBuf>) -> Self {
        self.ocr_results = Some(path.into());
        self
    }

    /// Export directory for a reference; only a single plain path segment is accepted
    fn export_dir(&self, reference: &str) -> Option<PathBuf> {
        let reference = reference.trim().trim_start_matches('@');
        if reference.is_empty() || reference == "." {
            return Some(self.root.clone());
        }
        let mut components = Path::new(reference).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Some(self.root.join(reference)),
            _ => None,
        }
    }

    async fn load_ocr(&self, dir: &Path) -> Result<HashMap<String, String>> {
        let path = self
            .ocr_results
            .clone()
            .unwrap_or_else(|| dir.join("ocr.json"));
        if !tokio::fs::try_exists(&path).await? {
            return Ok(HashMap::new());
        }
        let raw = tokio::fs::read_to_string(&path).await?;
        let entries: Vec<OcrEntry> = serde_json::from_str(&raw)?;
        tracing::debug!(path = %path.display(), entries = entries.len(), "loaded OCR results");
        Ok(entries.into_iter().map(|e| (e.name, e.text)).collect())
    }

    fn convert(message: ExportMessage, ocr: &HashMap<String, String>) -> Option<HistoryMessage> {
        if message.kind != "message" {
            return None;
        }
        if let Some(photo) = message.photo {
            let name = Path::new(&photo)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned());
            let ocr_hint = name.and_then(|n| ocr.get(&n).cloned());
            return Some(HistoryMessage {
                id: message.id,
                media: Some(HistoryMedia::Photo(MediaHandle(photo))),
                ocr_hint,
            });
        }
        // Exports carry no sticker set information
        let media = message.media_type.map(|_| HistoryMedia::Other);
        Some(HistoryMessage {
            id: message.id,
            media,
            ocr_hint: None,
        })
    }
}

#[async_trait]
impl HistorySource for ExportArchive {
    async fn resolve_channel(&self, reference: &str) -> Result<ChannelInfo> {
        let not_found = || Error::ChannelNotFound(reference.to_string());
        let dir = self.export_dir(reference).ok_or_else(not_found)?;
        let result_file = dir.join("result.json");
        if !tokio::fs::try_exists(&result_file).await? {
            return Err(not_found());
        }

        let raw = tokio::fs::read_to_string(&result_file).await?;
        let export: ExportFile = serde_json::from_str(&raw)?;
        let (Some(id), Some(name)) = (export.id, export.name) else {
            return Err(Error::Ingest(format!(
                "invalid channel data in {}",
                result_file.display()
            )));
        };

        let ocr = self.load_ocr(&dir).await?;
        let messages: Vec<HistoryMessage> = export
            .messages
            .into_iter()
            .filter_map(|m| Self::convert(m, &ocr))
            .collect();

        tracing::info!(channel_id = id, %name, messages = messages.len(), "loaded export");
        self.loaded
            .lock()
            .map_err(|_| Error::Ingest("export cache poisoned".to_string()))?
            .insert(id, Arc::new(LoadedExport { dir, messages }));

        Ok(ChannelInfo {
            id,
            name,
            handle: None,
        })
    }

    fn iter_messages<'a>(
        &'a self,
        channel: &'a ChannelInfo,
    ) -> BoxStream<'a, Result<HistoryMessage>> {
        let loaded = self
            .loaded
            .lock()
            .ok()
            .and_then(|map| map.get(&channel.id).cloned());
        match loaded {
            Some(export) => {
                let messages = export.messages.clone();
                stream::iter(messages.into_iter().map(Ok)).boxed()
            }
            None => stream::once(async move {
                Err(Error::ChannelNotFound(channel.id.to_string()))
            })
            .boxed(),
        }
    }

    async fn sticker_set(&self, set: &StickerSetRef) -> Result<StickerSetInfo> {
        Err(Error::Unsupported(format!(
            "sticker set {} is not available from an export",
            set.short_name
        )))
    }

    async fn download_media(&self, media: &MediaHandle, dest: &Path) -> Result<()> {
        let exports: Vec<Arc<LoadedExport>> = self
            .loaded
            .lock()
            .map_err(|_| Error::Ingest("export cache poisoned".to_string()))?
            .values()
            .cloned()
            .collect();

        let Some(relative) = contained_path(&media.0) else {
            return Err(Error::Media(format!("media path escapes the export: {media}")));
        };
        // Media paths are relative to their export folder
        for export in exports {
            let src = export.dir.join(relative);
            if tokio::fs::try_exists(&src).await? {
                tokio::fs::copy(&src, dest).await?;
                return Ok(());
            }
        }
        Err(Error::NotFound(format!("media {media}")))
    }

    async fn join_channel(&self, _channel: &ChannelInfo) -> Result<()> {
        Err(Error::Unsupported(
            "joining channels from an export archive".to_string(),
        ))
    }
}

/// `raw` as a relative path made only of plain segments
fn contained_path(raw: &str) -> Option<&Path> {
    let path = Path::new(raw);
    let plain = path.components().all(|c| matches!(c, Component::Normal(_)));
    (plain && path.components().next().is_some()).then_some(path)
}
