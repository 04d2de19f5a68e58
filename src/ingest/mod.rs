//! Channel ingestion pipeline
//!
//! A run resolves the channel, streams its history on the calling task
//! (the producer) and feeds a bounded FIFO queue drained by one consumer
//! task. The producer blocks while the queue is full. After the `Done`
//! sentinel is observed the final totals are reported and the channel is
//! optionally joined.

pub mod job;
pub mod progress;

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use futures::{FutureExt, StreamExt};
use tokio::sync::mpsc;

pub use job::Job;
use job::WorkItem;
pub use progress::{ChatProgress, ConsoleProgress, Counters, ProgressReporter, ProgressSink};

use crate::config::IngestConfig;
use crate::db::{self, DbPool, DbSession, StickerSet};
use crate::media::{MediaProcessor, PerceptualHash};
use crate::platform::{
    ChannelInfo, HistoryMedia, HistoryMessage, HistorySource, MediaHandle, StickerSetRef,
};
use crate::{Error, Result};

/// Totals for a finished run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestSummary {
    pub channel_id: i64,
    pub queued: usize,
    /// Jobs attempted, successful or not
    pub processed: usize,
    pub failed: usize,
    /// Messages skipped by the producer (already linked, no media, download errors)
    pub skipped: usize,
    pub joined: bool,
}

/// Drives ingestion runs against a history source
pub struct Ingestor {
    pool: DbPool,
    source: Arc<dyn HistorySource>,
    processor: Arc<MediaProcessor>,
    config: IngestConfig,
}

impl Ingestor {
    #[must_use]
    pub fn new(
        pool: DbPool,
        source: Arc<dyn HistorySource>,
        processor: Arc<MediaProcessor>,
        config: IngestConfig,
    ) -> Self {
        Self {
            pool,
            source,
            processor,
            config,
        }
    }

    /// Ingest one channel's history
    ///
    /// # Errors
    ///
    /// Returns `ChannelNotFound` before any work is queued if the reference
    /// does not resolve. Returns `Ingest` if the queue closes before the
    /// sentinel is seen. Per-message and per-job failures are reported
    /// through `sink` and never fail the run.
    pub async fn run(&self, channel_ref: &str, sink: Arc<dyn ProgressSink>) -> Result<IngestSummary> {
        let channel = self.source.resolve_channel(channel_ref).await?;
        {
            let session = DbSession::new(&self.pool);
            session.with(|conn| {
                db::channel::get_or_create(conn, channel.id, &channel.name, channel.handle.as_deref())
            })?;
            session.commit()?;
        }
        tracing::info!(channel_id = channel.id, name = %channel.name, "ingest started");

        let counters = Arc::new(Counters::default());
        let reporter = Arc::new(ProgressReporter::new(
            sink,
            self.config.progress_interval,
            counters.clone(),
        ));
        reporter.start(&channel.name).await;

        let downloads = tempfile::Builder::new().prefix("glimpse-ingest-").tempdir()?;
        let (tx, rx) = mpsc::channel(self.config.queue_capacity.max(1));
        let consumer = tokio::spawn(consume(
            rx,
            self.processor.clone(),
            counters.clone(),
            reporter.clone(),
        ));

        let producer = Producer {
            ingestor: self,
            channel: &channel,
            downloads: downloads.path(),
            tx: &tx,
            counters: &counters,
            reporter: &reporter,
            seen_sets: HashSet::new(),
            skipped: 0,
        };
        let produced = producer.run().await;

        // The sentinel goes out even if producing stopped early
        let sentinel = tx.send(WorkItem::Done).await;
        drop(tx);
        let consumed = consumer
            .await
            .map_err(|e| Error::Ingest(format!("consumer task failed: {e}")))?;
        let skipped = produced?;
        sentinel.map_err(|_| Error::Ingest("job queue closed before completion".to_string()))?;
        consumed?;

        reporter.finish().await;

        let joined = match self.source.join_channel(&channel).await {
            Ok(()) => true,
            Err(Error::Unsupported(reason)) => {
                tracing::debug!(%reason, "channel join skipped");
                false
            }
            Err(e) => {
                tracing::warn!(channel_id = channel.id, error = %e, "failed to join channel");
                reporter.report(&format!("failed to join {}: {e}", channel.name)).await;
                false
            }
        };

        let summary = IngestSummary {
            channel_id: channel.id,
            queued: counters.queued(),
            processed: counters.processed(),
            failed: counters.failed(),
            skipped,
            joined,
        };
        tracing::info!(?summary, "ingest finished");
        Ok(summary)
    }
}

/// Producer half of a run: classifies history and enqueues jobs
struct Producer<'a> {
    ingestor: &'a Ingestor,
    channel: &'a ChannelInfo,
    downloads: &'a Path,
    tx: &'a mpsc::Sender<WorkItem>,
    counters: &'a Counters,
    reporter: &'a ProgressReporter,
    seen_sets: HashSet<String>,
    skipped: usize,
}

impl Producer<'_> {
    async fn run(mut self) -> Result<usize> {
        let source = self.ingestor.source.clone();
        let mut messages = source.iter_messages(self.channel);

        while let Some(next) = messages.next().await {
            match next {
                Ok(message) => self.classify(message).await?,
                Err(e) => {
                    tracing::warn!(channel_id = self.channel.id, error = %e, "history read failed");
                    self.reporter
                        .failure(format!("error reading {}: {e}", self.channel.name));
                    self.skipped += 1;
                }
            }
        }
        Ok(self.skipped)
    }

    async fn classify(&mut self, message: HistoryMessage) -> Result<()> {
        match message.media {
            Some(HistoryMedia::Photo(handle)) => {
                if self.already_linked(message.id)? {
                    tracing::trace!(message_id = message.id, "already ingested");
                    self.skipped += 1;
                    return Ok(());
                }
                let file = self.downloads.join(format!("{}_{}", self.channel.id, message.id));
                match self.fetch(&handle, &file).await {
                    Ok(phash) => {
                        self.enqueue(Job::Photo {
                            file,
                            phash,
                            channel_id: self.channel.id,
                            message_id: message.id,
                            ocr_hint: message.ocr_hint,
                        })
                        .await
                    }
                    Err(e) => {
                        self.producer_error(&format!("message {}", message.id), &e);
                        Ok(())
                    }
                }
            }
            Some(HistoryMedia::Sticker(set)) => self.sticker_set(&set).await,
            Some(HistoryMedia::Other) | None => {
                self.skipped += 1;
                Ok(())
            }
        }
    }

    /// Emit one job per document of a sticker set, once per run
    async fn sticker_set(&mut self, set: &StickerSetRef) -> Result<()> {
        if !self.seen_sets.insert(set.short_name.clone()) {
            return Ok(());
        }
        let info = match self.ingestor.source.sticker_set(set).await {
            Ok(info) => info,
            Err(e) => {
                self.producer_error(&format!("sticker set {}", set.short_name), &e);
                return Ok(());
            }
        };

        let session = DbSession::new(&self.ingestor.pool);
        session.with(|conn| {
            db::sticker::upsert_set(
                conn,
                &StickerSet {
                    id: info.id,
                    short_name: info.short_name.clone(),
                    title: info.title.clone(),
                },
            )
        })?;
        session.commit()?;

        for (index, document) in info.documents.iter().enumerate() {
            let file = self.downloads.join(format!("sticker_{}_{index}", info.id));
            match self.fetch(document, &file).await {
                Ok(phash) => {
                    self.enqueue(Job::Sticker {
                        file,
                        phash,
                        sticker_set_id: info.id,
                    })
                    .await?;
                }
                Err(e) => {
                    self.producer_error(&format!("sticker {document}"), &e);
                }
            }
        }
        Ok(())
    }

    fn already_linked(&self, message_id: i64) -> Result<bool> {
        let conn = db::connect(&self.ingestor.pool)?;
        db::channel::message_exists(&conn, self.channel.id, message_id)
    }

    async fn fetch(&self, handle: &MediaHandle, file: &Path) -> Result<PerceptualHash> {
        self.ingestor.source.download_media(handle, file).await?;
        let path = file.to_path_buf();
        tokio::task::spawn_blocking(move || PerceptualHash::of_file(&path))
            .await
            .map_err(|e| Error::Media(format!("hash task failed: {e}")))?
    }

    async fn enqueue(&self, job: Job) -> Result<()> {
        tracing::trace!(job = %job, "queued");
        self.tx
            .send(WorkItem::Job(job))
            .await
            .map_err(|_| Error::Ingest("job queue closed before completion".to_string()))?;
        self.counters.queued.fetch_add(1, Ordering::Relaxed);
        self.reporter.tick().await;
        Ok(())
    }

    fn producer_error(&mut self, what: &str, error: &Error) {
        tracing::warn!(item = what, error = %error, "skipping item");
        self.reporter.failure(format!("error processing {what}"));
        self.skipped += 1;
    }
}

/// Consumer loop: processes jobs in order until the sentinel
async fn consume(
    mut rx: mpsc::Receiver<WorkItem>,
    processor: Arc<MediaProcessor>,
    counters: Arc<Counters>,
    reporter: Arc<ProgressReporter>,
) -> Result<()> {
    while let Some(item) = rx.recv().await {
        let job = match item {
            WorkItem::Done => return Ok(()),
            WorkItem::Job(job) => job,
        };

        let what = job.to_string();
        let file = job.file().to_path_buf();
        let outcome = AssertUnwindSafe(processor.process(job.into_item()))
            .catch_unwind()
            .await;
        let failure = match outcome {
            Ok(Ok(_)) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(_) => Some("processing panicked".to_string()),
        };
        if let Some(reason) = failure {
            counters.failed.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(job = %what, error = %reason, "job failed");
            reporter.failure(format!("error processing {what}"));
        }
        counters.processed.fetch_add(1, Ordering::Relaxed);

        if let Err(e) = tokio::fs::remove_file(&file).await {
            tracing::trace!(path = %file.display(), error = %e, "download already gone");
        }
        reporter.tick().await;
    }
    Err(Error::Ingest(
        "job queue closed before the end sentinel".to_string(),
    ))
}
