//! Bot handlers and dispatcher assembly

mod commands;
mod inline;
mod search;

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinSet;

pub use commands::{DownloadHandler, HelpHandler};
pub use inline::{ChosenResultHandler, InlineQueryHandler};
pub use search::{FallbackHandler, ReverseSearchHandler};

use crate::Result;
use crate::config::IngestConfig;
use crate::db::DbPool;
use crate::dispatch::{Context, Dispatcher, Filter, Flow, Handler, MessageKind, SessionMiddleware};
use crate::inline::InlineCache;
use crate::media::MediaProcessor;
use crate::platform::{ChatClient, HistorySource};

/// Reply for private messages that are not images
pub const SEND_IMAGE_TEXT: &str = "Please send me an image for reverse search.";

/// Reply when no source is known for an image
pub const NOT_FOUND_TEXT: &str = "Image not found.";

/// Reply when a received image could not be fetched or looked up
pub const PROCESSING_ERROR_TEXT: &str = "Error processing image, please try again later.";

/// Shared services for every handler
pub struct BotServices {
    pub client: Arc<dyn ChatClient>,
    pub pool: DbPool,
    pub processor: Arc<MediaProcessor>,
    pub inline: Arc<InlineCache>,
    /// Where `/download` reads channel history from
    pub history: Option<Arc<dyn HistorySource>>,
    /// Only this chat may start downloads, when set
    pub admin_chat_id: Option<i64>,
    pub ingest: IngestConfig,
    /// Downloads started by handlers, drained on shutdown
    pub background: Mutex<JoinSet<()>>,
}

impl BotServices {
    /// Run `task` in the background, tracked until shutdown
    pub fn spawn_background<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.background.lock().unwrap_or_else(PoisonError::into_inner);
        while tasks.try_join_next().is_some() {}
        tasks.spawn(task);
    }

    /// Wait up to `grace` for background tasks, then cancel the rest
    ///
    /// Returns the number of tasks cancelled.
    pub async fn drain_background(&self, grace: Duration) -> usize {
        let mut tasks = std::mem::take(
            &mut *self.background.lock().unwrap_or_else(PoisonError::into_inner),
        );
        let drained = tokio::time::timeout(grace, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;
        if drained.is_ok() {
            return 0;
        }
        let cancelled = tasks.len();
        tasks.abort_all();
        cancelled
    }
}

/// Logs every event before routing; runs without a session
struct TraceEvents;

#[async_trait]
impl Handler for TraceEvents {
    fn name(&self) -> &str {
        "trace_events"
    }

    async fn handle(&self, ctx: &Context) -> Result<Flow> {
        tracing::trace!(event = ?ctx.event, "event received");
        Ok(Flow::Continue)
    }
}

/// Dispatcher with the session middleware and every bot binding
#[must_use]
pub fn build_dispatcher(services: &Arc<BotServices>) -> Dispatcher {
    let mut dispatcher = Dispatcher::new();
    dispatcher.add_middleware(Arc::new(SessionMiddleware::new(services.pool.clone())));

    let help = Arc::new(HelpHandler::new(services.clone()));
    let search = Arc::new(ReverseSearchHandler::new(services.clone()));

    dispatcher
        .register(Filter::Raw, Arc::new(TraceEvents))
        .register(Filter::command("start").private(), help.clone())
        .register(Filter::command("help").private(), help)
        .register(
            Filter::command("download"),
            Arc::new(DownloadHandler::new(services.clone())),
        )
        .register(Filter::message(MessageKind::Photo).private(), search.clone())
        .register(Filter::message(MessageKind::Sticker).private(), search)
        .register(
            Filter::message(MessageKind::Any).private(),
            Arc::new(FallbackHandler::new(services.clone())),
        )
        .register(
            Filter::InlineQuery,
            Arc::new(InlineQueryHandler::new(services.clone())),
        )
        .register(
            Filter::ChosenInlineResult,
            Arc::new(ChosenResultHandler::new(services.clone())),
        );
    dispatcher
}
