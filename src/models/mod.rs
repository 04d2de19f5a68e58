//! OCR and embedding models
//!
//! Models are synchronous and owned by a single [`ModelWorker`] thread each.
//! [`ModelPool`] is the async facade the rest of the crate talks to; either
//! model may be absent, in which case the corresponding field is left empty.

#[cfg(feature = "local-embed")]
pub mod clip;
pub mod ocr;
mod worker;

use std::path::{Path, PathBuf};

pub use worker::ModelWorker;

use crate::Result;
use crate::config::ModelsConfig;

/// Extracts printed text from an image file
pub trait TextRecognizer: Send {
    /// Recognize text in the image at `image`
    ///
    /// # Errors
    ///
    /// Returns error if recognition fails
    fn extract_text(&mut self, image: &Path) -> Result<String>;
}

/// Maps images and text into a shared vector space
pub trait ImageEmbedder: Send {
    /// Vector length produced by this model
    fn dimensions(&self) -> usize;

    /// Embed the image at `image`
    ///
    /// # Errors
    ///
    /// Returns error if inference fails
    fn embed_image(&mut self, image: &Path) -> Result<Vec<f32>>;

    /// Embed a text query
    ///
    /// # Errors
    ///
    /// Returns error if inference fails
    fn embed_text(&mut self, text: &str) -> Result<Vec<f32>>;
}

/// Optional OCR and embedding workers
#[derive(Default)]
pub struct ModelPool {
    ocr: Option<ModelWorker<dyn TextRecognizer>>,
    embedder: Option<ModelWorker<dyn ImageEmbedder>>,
}

impl ModelPool {
    /// A pool with no models; all calls return `None`
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Start workers for the given models
    ///
    /// # Errors
    ///
    /// Returns error if a worker thread cannot be spawned
    pub fn new(
        ocr: Option<Box<dyn TextRecognizer>>,
        embedder: Option<Box<dyn ImageEmbedder>>,
    ) -> Result<Self> {
        Ok(Self {
            ocr: ocr.map(|m| ModelWorker::spawn("ocr", m)).transpose()?,
            embedder: embedder
                .map(|m| ModelWorker::spawn("embedder", m))
                .transpose()?,
        })
    }

    /// Build models from configuration
    ///
    /// A model that fails to load is logged and left out.
    ///
    /// # Errors
    ///
    /// Returns error if a worker thread cannot be spawned
    pub fn from_config(config: &ModelsConfig) -> Result<Self> {
        let ocr: Option<Box<dyn TextRecognizer>> = if config.ocr_enabled {
            match ocr::TesseractOcr::locate(&config.ocr_languages) {
                Ok(engine) => Some(Box::new(engine)),
                Err(e) => {
                    tracing::warn!(error = %e, "OCR disabled");
                    None
                }
            }
        } else {
            None
        };

        let embedder = if config.embeddings_enabled {
            load_embedder(config)
        } else {
            None
        };

        tracing::info!(
            ocr = ocr.is_some(),
            embeddings = embedder.is_some(),
            "models configured"
        );
        Self::new(ocr, embedder)
    }

    #[must_use]
    pub const fn has_ocr(&self) -> bool {
        self.ocr.is_some()
    }

    #[must_use]
    pub const fn has_embedder(&self) -> bool {
        self.embedder.is_some()
    }

    /// OCR text of an image, `None` without an OCR model
    ///
    /// # Errors
    ///
    /// Returns error if recognition fails
    pub async fn extract_text(&self, image: &Path) -> Result<Option<String>> {
        let Some(worker) = &self.ocr else {
            return Ok(None);
        };
        let path = image.to_path_buf();
        worker
            .call(move |m| m.extract_text(&path))
            .await
            .map(Some)
    }

    /// Image embedding, `None` without an embedder
    ///
    /// # Errors
    ///
    /// Returns error if inference fails
    pub async fn embed_image(&self, image: &Path) -> Result<Option<Vec<f32>>> {
        let Some(worker) = &self.embedder else {
            return Ok(None);
        };
        let path: PathBuf = image.to_path_buf();
        worker.call(move |m| m.embed_image(&path)).await.map(Some)
    }

    /// Text embedding for search queries, `None` without an embedder
    ///
    /// # Errors
    ///
    /// Returns error if inference fails
    pub async fn embed_text(&self, text: &str) -> Result<Option<Vec<f32>>> {
        let Some(worker) = &self.embedder else {
            return Ok(None);
        };
        let text = text.to_string();
        worker.call(move |m| m.embed_text(&text)).await.map(Some)
    }
}

#[cfg(feature = "local-embed")]
fn load_embedder(config: &ModelsConfig) -> Option<Box<dyn ImageEmbedder>> {
    match clip::ClipEmbedder::new(&config.cache_dir) {
        Ok(model) => Some(Box::new(model)),
        Err(e) => {
            tracing::warn!(error = %e, "embeddings disabled");
            None
        }
    }
}

#[cfg(not(feature = "local-embed"))]
fn load_embedder(_config: &ModelsConfig) -> Option<Box<dyn ImageEmbedder>> {
    tracing::warn!("embeddings requested but built without the `local-embed` feature");
    None
}
