//! Content-addressed image files: `{dir}/{phash}.jpg`

use std::path::{Path, PathBuf};

use image::ImageFormat;

use super::phash::PerceptualHash;
use crate::{Error, Result};

const JPEG_MAGIC: [u8; 3] = [0xFF, 0xD8, 0xFF];

/// Directory of stored images, one file per perceptual hash
#[derive(Debug, Clone)]
pub struct ImageStore {
    dir: PathBuf,
}

impl ImageStore {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Target path for a hash
    #[must_use]
    pub fn path_for(&self, phash: PerceptualHash) -> PathBuf {
        self.dir.join(format!("{phash}.jpg"))
    }

    /// Copy `src` into the store unless a file for `phash` already exists
    ///
    /// Non-JPEG sources (PNG, WebP stickers) are re-encoded as JPEG so every
    /// stored file can be sent as a photo. Returns the stored path and
    /// whether a new file was written.
    ///
    /// # Errors
    ///
    /// Returns error if the source cannot be read or converted
    pub async fn store(&self, src: &Path, phash: PerceptualHash) -> Result<(PathBuf, bool)> {
        let target = self.path_for(phash);
        if tokio::fs::try_exists(&target).await? {
            return Ok((target, false));
        }

        tokio::fs::create_dir_all(&self.dir).await?;
        let bytes = tokio::fs::read(src).await?;
        let jpeg = if bytes.starts_with(&JPEG_MAGIC) {
            bytes
        } else {
            tokio::task::spawn_blocking(move || to_jpeg(&bytes))
                .await
                .map_err(|e| Error::Media(format!("conversion task failed: {e}")))??
        };

        // Write beside the target, then rename, so readers never see a partial file
        let partial = self.dir.join(format!("{phash}.jpg.part"));
        tokio::fs::write(&partial, &jpeg).await?;
        tokio::fs::rename(&partial, &target).await?;

        tracing::debug!(%phash, path = %target.display(), "stored image");
        Ok((target, true))
    }
}

fn to_jpeg(bytes: &[u8]) -> Result<Vec<u8>> {
    let image = image::load_from_memory(bytes)?;
    let rgb = image::DynamicImage::ImageRgb8(image.to_rgb8());
    let mut out = Vec::new();
    rgb.write_to(&mut std::io::Cursor::new(&mut out), ImageFormat::Jpeg)?;
    Ok(out)
}
