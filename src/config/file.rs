//! TOML configuration file loading
//!
//! Supports `~/.config/glimpse/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::PathBuf;

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct GlimpseConfigFile {
    /// Telegram bot settings
    #[serde(default)]
    pub telegram: TelegramFileConfig,

    /// Storage locations
    #[serde(default)]
    pub storage: StorageFileConfig,

    /// Static file server
    #[serde(default)]
    pub server: ServerFileConfig,

    /// OCR and embedding models
    #[serde(default)]
    pub models: ModelsFileConfig,

    /// Ingestion pipeline tuning
    #[serde(default)]
    pub ingest: IngestFileConfig,

    /// Inline search tuning
    #[serde(default)]
    pub search: SearchFileConfig,
}

/// Telegram bot configuration
#[derive(Debug, Default, Deserialize)]
pub struct TelegramFileConfig {
    pub bot_token: Option<String>,

    /// Chat that receives uploads used to mint reusable photo ids
    pub storage_chat_id: Option<i64>,

    /// Only this chat may start ingestion runs
    pub admin_chat_id: Option<i64>,

    /// Long-poll pause between empty `getUpdates` rounds
    pub poll_interval_ms: Option<u64>,
}

/// Filesystem locations
#[derive(Debug, Default, Deserialize)]
pub struct StorageFileConfig {
    pub data_dir: Option<PathBuf>,

    /// Root of Telegram Desktop export folders
    pub archive_dir: Option<PathBuf>,
}

/// Static file server configuration
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    pub host: Option<String>,
    pub port: Option<u16>,

    /// Public base URL the image server is reachable under
    pub external_url: Option<String>,
}

/// Model configuration
#[derive(Debug, Default, Deserialize)]
pub struct ModelsFileConfig {
    pub ocr_enabled: Option<bool>,

    /// Tesseract language list (e.g. "rus+eng")
    pub ocr_languages: Option<String>,

    pub embeddings_enabled: Option<bool>,

    pub cache_dir: Option<PathBuf>,
}

/// Ingestion configuration
#[derive(Debug, Default, Deserialize)]
pub struct IngestFileConfig {
    pub queue_capacity: Option<usize>,
    pub progress_interval_secs: Option<u64>,
}

/// Inline search configuration
#[derive(Debug, Default, Deserialize)]
pub struct SearchFileConfig {
    pub page_size: Option<usize>,
    pub max_distance: Option<f64>,
}

/// Resolve the config file path (`~/.config/glimpse/config.toml`)
#[must_use]
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("glimpse").join("config.toml"))
}

/// Load the config file, returning defaults if missing or invalid
#[must_use]
pub fn load_config_file() -> GlimpseConfigFile {
    let Some(path) = config_file_path() else {
        return GlimpseConfigFile::default();
    };

    if !path.exists() {
        return GlimpseConfigFile::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                GlimpseConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            GlimpseConfigFile::default()
        }
    }
}
