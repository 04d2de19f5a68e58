//! CLIP ViT-B/32 image and text embeddings via fastembed

use std::path::Path;

use fastembed::{
    EmbeddingModel, ImageEmbedding, ImageEmbeddingModel, ImageInitOptions, InitOptions,
    TextEmbedding,
};

use super::ImageEmbedder;
use crate::{Error, Result};

/// Output size of CLIP ViT-B/32
pub const CLIP_DIM: usize = 512;

/// Paired CLIP vision and text encoders
pub struct ClipEmbedder {
    vision: ImageEmbedding,
    text: TextEmbedding,
}

impl ClipEmbedder {
    /// Load both encoders, downloading weights into `cache_dir` on first use
    ///
    /// # Errors
    ///
    /// Returns error if the model files cannot be fetched or loaded
    pub fn new(cache_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(cache_dir)?;

        let vision = ImageEmbedding::try_new(
            ImageInitOptions::new(ImageEmbeddingModel::ClipVitB32)
                .with_cache_dir(cache_dir.to_path_buf())
                .with_show_download_progress(false),
        )
        .map_err(|e| Error::Embedding(format!("failed to load CLIP vision model: {e}")))?;

        let text = TextEmbedding::try_new(
            InitOptions::new(EmbeddingModel::ClipVitB32)
                .with_cache_dir(cache_dir.to_path_buf())
                .with_show_download_progress(false),
        )
        .map_err(|e| Error::Embedding(format!("failed to load CLIP text model: {e}")))?;

        tracing::info!(dim = CLIP_DIM, "CLIP embedder loaded");
        Ok(Self { vision, text })
    }
}

impl ImageEmbedder for ClipEmbedder {
    fn dimensions(&self) -> usize {
        CLIP_DIM
    }

    fn embed_image(&mut self, image: &Path) -> Result<Vec<f32>> {
        self.vision
            .embed(vec![image], None)
            .map_err(|e| Error::Embedding(format!("image embedding failed: {e}")))?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Embedding("no image embedding returned".to_string()))
    }

    fn embed_text(&mut self, text: &str) -> Result<Vec<f32>> {
        self.text
            .embed(vec![text], None)
            .map_err(|e| Error::Embedding(format!("text embedding failed: {e}")))?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Embedding("no text embedding returned".to_string()))
    }
}
