//! Configuration management for Glimpse

pub mod file;

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::{Error, Result};
use file::GlimpseConfigFile;

/// Glimpse configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to data directory (database, images)
    pub data_dir: PathBuf,

    /// Root of Telegram Desktop export folders used by `/download`
    pub archive_dir: Option<PathBuf>,

    pub telegram: TelegramConfig,
    pub server: ServerConfig,
    pub models: ModelsConfig,
    pub ingest: IngestConfig,
    pub search: SearchConfig,
}

/// Telegram bot configuration
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: Option<SecretString>,
    pub storage_chat_id: Option<i64>,
    pub admin_chat_id: Option<i64>,
    pub poll_interval: Duration,
}

impl TelegramConfig {
    /// Bot token, required for anything that talks to Telegram
    ///
    /// # Errors
    ///
    /// Returns error if no token is configured
    pub fn require_token(&self) -> Result<SecretString> {
        self.bot_token
            .clone()
            .ok_or_else(|| Error::Config("TELEGRAM_BOT_TOKEN is not set".to_string()))
    }
}

/// Static image server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub external_url: Option<String>,
}

/// OCR and embedding model configuration
#[derive(Debug, Clone)]
pub struct ModelsConfig {
    pub ocr_enabled: bool,
    pub ocr_languages: String,
    pub embeddings_enabled: bool,
    pub cache_dir: PathBuf,
}

/// Ingestion pipeline configuration
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Bounded queue capacity between history reader and worker
    pub queue_capacity: usize,
    /// Minimum spacing between progress edits
    pub progress_interval: Duration,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 16,
            progress_interval: Duration::from_secs(10),
        }
    }
}

/// Inline search configuration
#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub page_size: usize,
    /// Candidates scoring at or above this distance are dropped
    pub max_distance: f64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            page_size: 10,
            max_distance: 0.7,
        }
    }
}

impl Config {
    /// Load configuration (env > toml > default)
    ///
    /// # Errors
    ///
    /// Returns error if the data directory cannot be created
    pub fn load() -> Result<Self> {
        let fc = file::load_config_file();
        let config = Self::from_sources(fc, |key| std::env::var(key).ok());

        std::fs::create_dir_all(config.images_dir()).map_err(|e| {
            Error::Config(format!(
                "cannot create data dir {}: {e}",
                config.data_dir.display()
            ))
        })?;

        Ok(config)
    }

    /// Merge a parsed config file with an environment lookup
    pub fn from_sources(fc: GlimpseConfigFile, env: impl Fn(&str) -> Option<String>) -> Self {
        let env: &dyn Fn(&str) -> Option<String> = &env;
        let parsed = |key: &str| EnvValue(env(key));
        let flag = |key: &str| env(key).map(|s| matches!(s.as_str(), "1" | "true" | "yes"));

        // ~/.local/share/glimpse on Linux
        let data_dir = env("GLIMPSE_DATA_DIR")
            .map(PathBuf::from)
            .or(fc.storage.data_dir)
            .unwrap_or_else(|| {
                directories::BaseDirs::new()
                    .map_or_else(|| PathBuf::from("."), |d| d.data_dir().join("glimpse"))
            });

        let telegram = TelegramConfig {
            bot_token: env("TELEGRAM_BOT_TOKEN")
                .or(fc.telegram.bot_token)
                .map(SecretString::from),
            storage_chat_id: parsed("GLIMPSE_STORAGE_CHAT_ID").get().or(fc.telegram.storage_chat_id),
            admin_chat_id: parsed("GLIMPSE_ADMIN_CHAT_ID").get().or(fc.telegram.admin_chat_id),
            poll_interval: Duration::from_millis(
                parsed("GLIMPSE_POLL_INTERVAL_MS").get()
                    .or(fc.telegram.poll_interval_ms)
                    .unwrap_or(500),
            ),
        };

        let server = ServerConfig {
            host: env("GLIMPSE_HTTP_HOST")
                .or(fc.server.host)
                .unwrap_or_else(|| "127.0.0.1".to_string()),
            port: parsed("GLIMPSE_HTTP_PORT").get().or(fc.server.port).unwrap_or(8000),
            external_url: env("GLIMPSE_EXTERNAL_URL").or(fc.server.external_url),
        };

        let models = ModelsConfig {
            ocr_enabled: flag("GLIMPSE_OCR_ENABLED")
                .or(fc.models.ocr_enabled)
                .unwrap_or_else(|| which::which("tesseract").is_ok()),
            ocr_languages: env("GLIMPSE_OCR_LANGUAGES")
                .or(fc.models.ocr_languages)
                .unwrap_or_else(|| "rus+eng".to_string()),
            embeddings_enabled: flag("GLIMPSE_EMBEDDINGS_ENABLED")
                .or(fc.models.embeddings_enabled)
                .unwrap_or(cfg!(feature = "local-embed")),
            cache_dir: env("GLIMPSE_MODEL_CACHE_DIR")
                .map(PathBuf::from)
                .or(fc.models.cache_dir)
                .unwrap_or_else(|| data_dir.join("models")),
        };

        let ingest_defaults = IngestConfig::default();
        let ingest = IngestConfig {
            queue_capacity: parsed("GLIMPSE_QUEUE_CAPACITY").get()
                .or(fc.ingest.queue_capacity)
                .unwrap_or(ingest_defaults.queue_capacity)
                .max(1),
            progress_interval: parsed("GLIMPSE_PROGRESS_INTERVAL_SECS").get()
                .or(fc.ingest.progress_interval_secs)
                .map_or(ingest_defaults.progress_interval, Duration::from_secs),
        };

        let search_defaults = SearchConfig::default();
        let search = SearchConfig {
            page_size: parsed("GLIMPSE_INLINE_PAGE_SIZE").get()
                .or(fc.search.page_size)
                .unwrap_or(search_defaults.page_size)
                .clamp(1, 50),
            max_distance: parsed("GLIMPSE_MAX_DISTANCE").get()
                .or(fc.search.max_distance)
                .unwrap_or(search_defaults.max_distance),
        };

        Self {
            archive_dir: env("GLIMPSE_ARCHIVE_DIR")
                .map(PathBuf::from)
                .or(fc.storage.archive_dir),
            data_dir,
            telegram,
            server,
            models,
            ingest,
            search,
        }
    }

    /// Path of the `SQLite` database
    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("glimpse.db")
    }

    /// Directory of content-addressed image files
    #[must_use]
    pub fn images_dir(&self) -> PathBuf {
        self.data_dir.join("images")
    }
}

/// Raw environment value parsed on demand into the target type
struct EnvValue(Option<String>);

impl EnvValue {
    fn get<T: std::str::FromStr>(self) -> Option<T> {
        self.0.and_then(|s| s.parse().ok())
    }
}
