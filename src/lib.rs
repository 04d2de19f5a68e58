//! Glimpse - reverse image search bot for Telegram channels
//!
//! Ingests channel history into a content-addressed image store, answers
//! "where was this posted?" for images sent to the bot, and serves inline
//! text search over recognized image text.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                Telegram Bot API                      │
//! │   getUpdates  │  sendMessage  │  answerInlineQuery   │
//! └────────────────────┬────────────────────────────────┘
//!                      │ Event
//! ┌────────────────────▼────────────────────────────────┐
//! │   Dispatcher (filters → middleware → handlers)       │
//! │   reverse search │ /download │ inline cache          │
//! └──────────┬──────────────────────────┬───────────────┘
//!            │                          │
//! ┌──────────▼──────────┐   ┌───────────▼───────────────┐
//! │  Ingestor           │   │  Content store (SQLite)    │
//! │  producer → queue → │──▶│  images │ channels │ usage │
//! │  media processor    │   └───────────────────────────┘
//! └──────────┬──────────┘
//!            │
//! ┌──────────▼──────────┐
//! │  Model workers      │
//! │  OCR │ CLIP         │
//! └─────────────────────┘
//! ```

pub mod bot;
pub mod config;
pub mod daemon;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod ingest;
pub mod inline;
pub mod media;
pub mod models;
pub mod platform;
pub mod web;

pub use config::Config;
pub use daemon::Daemon;
pub use db::{DbConn, DbPool};
pub use error::{Error, Result};
