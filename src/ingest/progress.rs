//! Progress reporting for ingestion runs
//!
//! One status message is created, then edited in place at most once per
//! interval. Per-item errors are collected and sent as one report on the
//! same schedule, so a bad channel cannot flood the chat.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::Result;
use crate::platform::ChatClient;

/// Destination for progress output
#[async_trait]
pub trait ProgressSink: Send + Sync {
    /// Replace the status line
    async fn update(&self, text: &str) -> Result<()>;

    /// Emit a standalone notice (errors, join failures)
    async fn report(&self, text: &str) -> Result<()>;
}

/// Status message in a chat, edited in place
pub struct ChatProgress {
    client: Arc<dyn ChatClient>,
    chat_id: i64,
    reply_to: Option<i64>,
    status: tokio::sync::Mutex<Option<i64>>,
}

impl ChatProgress {
    #[must_use]
    pub fn new(client: Arc<dyn ChatClient>, chat_id: i64, reply_to: Option<i64>) -> Self {
        Self {
            client,
            chat_id,
            reply_to,
            status: tokio::sync::Mutex::new(None),
        }
    }
}

#[async_trait]
impl ProgressSink for ChatProgress {
    async fn update(&self, text: &str) -> Result<()> {
        let mut status = self.status.lock().await;
        match *status {
            Some(message_id) => self.client.edit_message(self.chat_id, message_id, text).await,
            None => {
                let id = self
                    .client
                    .send_message(self.chat_id, text, self.reply_to)
                    .await?;
                *status = Some(id);
                Ok(())
            }
        }
    }

    async fn report(&self, text: &str) -> Result<()> {
        self.client
            .send_message(self.chat_id, text, self.reply_to)
            .await
            .map(|_| ())
    }
}

/// Progress written to the log (CLI imports)
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleProgress;

#[async_trait]
impl ProgressSink for ConsoleProgress {
    async fn update(&self, text: &str) -> Result<()> {
        tracing::info!("{text}");
        Ok(())
    }

    async fn report(&self, text: &str) -> Result<()> {
        tracing::warn!("{text}");
        Ok(())
    }
}

/// Minimum-interval gate; the first check always passes
#[derive(Debug)]
pub struct Throttle {
    interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl Throttle {
    #[must_use]
    pub const fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Mutex::new(None),
        }
    }

    /// True if the interval has elapsed since the last allowed check
    pub fn check(&self) -> bool {
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        if let Some(prev) = *last {
            if now.duration_since(prev) < self.interval {
                return false;
            }
        }
        *last = Some(now);
        true
    }
}

/// Run counters
///
/// `queued` is written by the producer only; `processed` and `failed` by
/// the consumer only. Reads are relaxed and may be stale.
#[derive(Debug, Default)]
pub struct Counters {
    pub queued: AtomicUsize,
    pub processed: AtomicUsize,
    pub failed: AtomicUsize,
}

impl Counters {
    #[must_use]
    pub fn queued(&self) -> usize {
        self.queued.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn processed(&self) -> usize {
        self.processed.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::Relaxed)
    }
}

/// Most failure lines in one report
const MAX_REPORT_LINES: usize = 20;

/// Throttled view of the counters over a sink
pub struct ProgressReporter {
    sink: Arc<dyn ProgressSink>,
    throttle: Throttle,
    counters: Arc<Counters>,
    failures: Mutex<Vec<String>>,
}

impl ProgressReporter {
    #[must_use]
    pub fn new(sink: Arc<dyn ProgressSink>, interval: Duration, counters: Arc<Counters>) -> Self {
        Self {
            sink,
            throttle: Throttle::new(interval),
            counters,
            failures: Mutex::new(Vec::new()),
        }
    }

    /// Post the initial status line
    pub async fn start(&self, channel_name: &str) {
        self.throttle.check();
        self.send_update(&format!("downloading {channel_name}...")).await;
    }

    /// Edit the status line if the interval has elapsed
    pub async fn tick(&self) {
        if self.throttle.check() {
            let text = format!(
                "queued: {}, processed: {}",
                self.counters.queued(),
                self.counters.processed()
            );
            self.send_update(&text).await;
            self.flush_failures().await;
        }
    }

    /// Final status line with the terminal totals, then any pending failures
    pub async fn finish(&self) {
        let text = format!(
            "download finished: {} queued, {} processed",
            self.counters.queued(),
            self.counters.processed()
        );
        self.send_update(&text).await;
        self.flush_failures().await;
    }

    /// Queue a per-item failure line for the next batched report
    pub fn failure(&self, text: String) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(text);
    }

    /// Standalone notice; delivery failures are only logged
    pub async fn report(&self, text: &str) {
        if let Err(e) = self.sink.report(text).await {
            tracing::warn!(error = %e, "failed to deliver progress report");
        }
    }

    async fn flush_failures(&self) {
        let batch = std::mem::take(&mut *self.failures.lock().unwrap_or_else(PoisonError::into_inner));
        if batch.is_empty() {
            return;
        }
        let mut text = batch
            .iter()
            .take(MAX_REPORT_LINES)
            .cloned()
            .collect::<Vec<_>>()
            .join("\n");
        if batch.len() > MAX_REPORT_LINES {
            text.push_str(&format!("\n...and {} more", batch.len() - MAX_REPORT_LINES));
        }
        self.report(&text).await;
    }

    async fn send_update(&self, text: &str) {
        if let Err(e) = self.sink.update(text).await {
            tracing::warn!(error = %e, "failed to update progress");
        }
    }
}
