//! Daemon: wires the store, models, platform client and dispatcher together
//!
//! Polls Telegram for updates and dispatches each event on its own task.
//! The image server runs alongside. Ctrl-C stops polling, then waits up to
//! [`SHUTDOWN_GRACE`] for in-flight events and background downloads; whatever
//! is still running after that is cancelled. A cancelled download resumes on
//! the next `/download` because linked messages are skipped.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::bot::{self, BotServices};
use crate::db::{self, DbPool};
use crate::dispatch::Event;
use crate::inline::InlineCache;
use crate::media::{ImageStore, MediaProcessor};
use crate::models::ModelPool;
use crate::platform::{ChatClient, ExportArchive, HistorySource, TelegramClient};
use crate::web::ImageServer;
use crate::{Config, Result};

/// Inbound event buffer between the poller and the dispatch loop
const EVENT_BUFFER: usize = 100;

/// How long shutdown waits for in-flight work
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// The Glimpse daemon
pub struct Daemon {
    config: Config,
    db: DbPool,
}

impl Daemon {
    /// Open the database and prepare the daemon
    ///
    /// # Errors
    ///
    /// Returns error if the database cannot be initialized
    pub fn new(config: Config) -> Result<Self> {
        let db_path = config.db_path();
        let db = db::init(&db_path)?;
        tracing::info!(path = %db_path.display(), "database initialized");
        Ok(Self { config, db })
    }

    /// Run until interrupted
    ///
    /// # Errors
    ///
    /// Returns error if the bot token is missing or rejected, or models
    /// cannot be started
    pub async fn run(self) -> Result<()> {
        let token = self.config.telegram.require_token()?;
        let telegram = TelegramClient::new(token, self.config.telegram.storage_chat_id);
        let me = telegram.get_me().await?;
        tracing::info!(bot_id = me.id, username = ?me.username, "connected to Telegram");

        if self.config.telegram.storage_chat_id.is_none() {
            tracing::warn!("no storage chat configured, inline results cannot be uploaded");
        }

        let client: Arc<dyn ChatClient> = Arc::new(telegram.clone());
        let store = ImageStore::new(self.config.images_dir());
        let models = Arc::new(ModelPool::from_config(&self.config.models)?);
        let processor = Arc::new(MediaProcessor::new(
            self.db.clone(),
            store.clone(),
            models.clone(),
        ));
        let inline = Arc::new(InlineCache::new(
            self.db.clone(),
            client.clone(),
            store,
            models,
            self.config.search.clone(),
        ));
        let history = self.config.archive_dir.as_ref().map(|dir| {
            tracing::info!(path = %dir.display(), "export archive enabled");
            Arc::new(ExportArchive::new(dir)) as Arc<dyn HistorySource>
        });

        let services = Arc::new(BotServices {
            client,
            pool: self.db.clone(),
            processor,
            inline,
            history,
            admin_chat_id: self.config.telegram.admin_chat_id,
            ingest: self.config.ingest.clone(),
            background: Mutex::default(),
        });
        let mut dispatcher = bot::build_dispatcher(&services);
        if let Some(username) = &me.username {
            dispatcher.set_bot_username(username.clone());
        }
        let dispatcher = Arc::new(dispatcher);

        let server = ImageServer::new(
            self.config.images_dir(),
            self.config.server.host.clone(),
            self.config.server.port,
        )
        .spawn();
        if let Some(url) = &self.config.server.external_url {
            tracing::info!(%url, "stored images published");
        }

        let (tx, mut rx) = mpsc::channel::<Event>(EVENT_BUFFER);
        let poller = telegram.start_polling(me.id, self.config.telegram.poll_interval, tx);

        tracing::info!("glimpse ready");
        let mut in_flight = JoinSet::new();
        loop {
            tokio::select! {
                event = rx.recv() => {
                    let Some(event) = event else {
                        tracing::warn!("event stream ended");
                        break;
                    };
                    let dispatcher = dispatcher.clone();
                    in_flight.spawn(async move { dispatcher.dispatch(event).await });
                }
                Some(_) = in_flight.join_next(), if !in_flight.is_empty() => {}
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("shutting down");
                    break;
                }
            }
        }

        poller.abort();
        let events = tokio::time::timeout(SHUTDOWN_GRACE, async {
            while in_flight.join_next().await.is_some() {}
        })
        .await;
        if events.is_err() {
            tracing::warn!(cancelled = in_flight.len(), "events still running at shutdown");
        }
        let cancelled = services.drain_background(SHUTDOWN_GRACE).await;
        if cancelled > 0 {
            tracing::warn!(cancelled, "downloads cancelled at shutdown");
        }
        server.abort();
        Ok(())
    }
}
