//! Error types for Glimpse

use thiserror::Error;

/// Result type alias for Glimpse operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in Glimpse
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Chat platform error (Bot API call failed or was rejected)
    #[error("platform error: {0}")]
    Platform(String),

    /// Operation is not supported by this platform adapter
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Channel could not be resolved
    #[error("channel not found: {0}")]
    ChannelNotFound(String),

    /// Ingestion pipeline error
    #[error("ingest error: {0}")]
    Ingest(String),

    /// Handler error raised inside the dispatch core
    #[error("handler error: {0}")]
    Handler(String),

    /// Media processing error
    #[error("media error: {0}")]
    Media(String),

    /// Image decoding error
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// OCR error
    #[error("ocr error: {0}")]
    Ocr(String),

    /// Embedding error
    #[error("embedding error: {0}")]
    Embedding(String),

    /// Model worker stopped
    #[error("model worker unavailable: {0}")]
    ModelUnavailable(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Database error
    #[error("database error: {0}")]
    Database(String),

    /// `SQLite` error
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Resource not found
    #[error("not found: {0}")]
    NotFound(String),
}
