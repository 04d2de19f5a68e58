//! Dispatch core integration tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use glimpse::db;
use glimpse::dispatch::event::{ChatKind, InlineQuery, Message};
use glimpse::dispatch::{
    Context, Dispatcher, Event, Filter, Flow, Handler, MessageKind, Middleware, Next,
    SessionMiddleware,
};
use glimpse::{DbPool, Error, Result};

mod common;
use common::setup_test_db;

fn private_text(text: &str) -> Event {
    Event::Message(Message {
        message_id: 1,
        chat_id: 5,
        chat_kind: Some(ChatKind::Private),
        sender_id: Some(5),
        text: Some(text.to_string()),
        ..Message::default()
    })
}

/// Records its name on every call and returns a scripted outcome
struct Scripted {
    name: &'static str,
    log: Arc<Mutex<Vec<&'static str>>>,
    outcome: fn(&Context) -> Result<Flow>,
}

#[async_trait]
impl Handler for Scripted {
    fn name(&self) -> &str {
        self.name
    }

    async fn handle(&self, ctx: &Context) -> Result<Flow> {
        self.log.lock().unwrap().push(self.name);
        (self.outcome)(ctx)
    }
}

fn scripted(
    name: &'static str,
    log: &Arc<Mutex<Vec<&'static str>>>,
    outcome: fn(&Context) -> Result<Flow>,
) -> Arc<Scripted> {
    Arc::new(Scripted {
        name,
        log: log.clone(),
        outcome,
    })
}

/// Counts completed chain runs by outcome
#[derive(Default)]
struct Outcomes {
    ok: AtomicUsize,
    err: AtomicUsize,
}

#[async_trait]
impl Middleware for Outcomes {
    async fn handle(&self, ctx: &mut Context, next: Next<'_>) -> Result<Flow> {
        let result = next.run(ctx).await;
        match &result {
            Ok(_) => self.ok.fetch_add(1, Ordering::SeqCst),
            Err(_) => self.err.fetch_add(1, Ordering::SeqCst),
        };
        result
    }
}

/// Writes a channel row through the event session
fn write_channel(ctx: &Context) -> Result<()> {
    ctx.session()?
        .with(|conn| db::channel::get_or_create(conn, 9, "written", None).map(|_| ()))
}

fn channel_count(pool: &DbPool) -> i64 {
    let conn = db::connect(pool).unwrap();
    conn.query_row("SELECT COUNT(*) FROM channels", [], |row| row.get(0))
        .unwrap()
}

#[tokio::test]
async fn test_failing_handler_does_not_block_next_event() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut dispatcher = Dispatcher::new();
    dispatcher.register(
        Filter::message(MessageKind::Text),
        scripted("flaky", &log, |ctx| {
            match ctx.event.as_message().and_then(|m| m.text.as_deref()) {
                Some("fail") => Err(Error::Handler("boom".to_string())),
                _ => Ok(Flow::Continue),
            }
        }),
    );

    dispatcher.dispatch(private_text("fail")).await;
    dispatcher.dispatch(private_text("ok")).await;

    assert_eq!(*log.lock().unwrap(), vec!["flaky", "flaky"]);
}

#[tokio::test]
async fn test_panicking_handler_is_contained() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut dispatcher = Dispatcher::new();
    dispatcher
        .register(
            Filter::message(MessageKind::Text),
            scripted("panics", &log, |_| panic!("handler bug")),
        )
        .register(
            Filter::message(MessageKind::Any),
            scripted("after", &log, |_| Ok(Flow::Continue)),
        );

    dispatcher.dispatch(private_text("hello")).await;

    assert_eq!(*log.lock().unwrap(), vec!["panics", "after"]);
}

#[tokio::test]
async fn test_stop_skips_later_bindings_but_not_middleware() {
    let pool = setup_test_db();
    let log = Arc::new(Mutex::new(Vec::new()));
    let outcomes = Arc::new(Outcomes::default());

    let mut dispatcher = Dispatcher::new();
    dispatcher
        .add_middleware(outcomes.clone())
        .add_middleware(Arc::new(SessionMiddleware::new(pool.clone())))
        .register(
            Filter::message(MessageKind::Text),
            scripted("writer", &log, |ctx| {
                write_channel(ctx)?;
                Ok(Flow::Stop)
            }),
        )
        .register(
            Filter::message(MessageKind::Any),
            scripted("never", &log, |_| Ok(Flow::Continue)),
        );

    dispatcher.dispatch(private_text("hi")).await;

    assert_eq!(*log.lock().unwrap(), vec!["writer"]);
    assert_eq!(outcomes.ok.load(Ordering::SeqCst), 1);
    assert_eq!(channel_count(&pool), 1);
}

#[tokio::test]
async fn test_failed_handler_rolls_back_session() {
    let pool = setup_test_db();
    let log = Arc::new(Mutex::new(Vec::new()));
    let outcomes = Arc::new(Outcomes::default());

    let mut dispatcher = Dispatcher::new();
    dispatcher
        .add_middleware(outcomes.clone())
        .add_middleware(Arc::new(SessionMiddleware::new(pool.clone())))
        .register(
            Filter::message(MessageKind::Text),
            scripted("half_writer", &log, |ctx| {
                write_channel(ctx)?;
                Err(Error::Handler("late failure".to_string()))
            }),
        );

    dispatcher.dispatch(private_text("hi")).await;

    assert_eq!(outcomes.err.load(Ordering::SeqCst), 1);
    assert_eq!(channel_count(&pool), 0);

    // The pooled connection is usable again
    dispatcher.dispatch(private_text("again")).await;
    assert_eq!(outcomes.err.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_command_stops_even_when_it_fails() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut dispatcher = Dispatcher::new();
    dispatcher
        .register(
            Filter::command("download"),
            scripted("download", &log, |_| {
                Err(Error::Handler("no archive".to_string()))
            }),
        )
        .register(
            Filter::message(MessageKind::Any),
            scripted("fallback", &log, |_| Ok(Flow::Continue)),
        );

    dispatcher.dispatch(private_text("/download memes")).await;
    assert_eq!(*log.lock().unwrap(), vec!["download"]);
}

#[tokio::test]
async fn test_propagating_command_lets_later_bindings_run() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut dispatcher = Dispatcher::new();
    dispatcher
        .register(
            Filter::command("stats").keep_propagating(),
            scripted("stats", &log, |_| Ok(Flow::Continue)),
        )
        .register(
            Filter::message(MessageKind::Any),
            scripted("audit", &log, |_| Ok(Flow::Continue)),
        );

    dispatcher.dispatch(private_text("/stats")).await;
    assert_eq!(*log.lock().unwrap(), vec!["stats", "audit"]);
}

#[tokio::test]
async fn test_raw_bindings_bypass_middleware() {
    let pool = setup_test_db();
    let log = Arc::new(Mutex::new(Vec::new()));
    let outcomes = Arc::new(Outcomes::default());

    let mut dispatcher = Dispatcher::new();
    dispatcher
        .add_middleware(outcomes.clone())
        .add_middleware(Arc::new(SessionMiddleware::new(pool)))
        .register(
            Filter::Raw,
            scripted("raw", &log, |ctx| {
                assert!(ctx.session.is_none());
                Ok(Flow::Continue)
            }),
        )
        .register(
            Filter::InlineQuery,
            scripted("inline", &log, |ctx| {
                assert!(ctx.session.is_some());
                Ok(Flow::Stop)
            }),
        );

    dispatcher
        .dispatch(Event::InlineQuery(InlineQuery::default()))
        .await;

    assert_eq!(*log.lock().unwrap(), vec!["raw", "inline"]);
    assert_eq!(outcomes.ok.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_events_dispatch_concurrently() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut dispatcher = Dispatcher::new();
    dispatcher.register(
        Filter::message(MessageKind::Text),
        scripted("echo", &log, |_| Ok(Flow::Continue)),
    );
    let dispatcher = Arc::new(dispatcher);

    let tasks: Vec<_> = (0..5)
        .map(|i| {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move { dispatcher.dispatch(private_text(&format!("m{i}"))).await })
        })
        .collect();
    for task in tasks {
        tokio_test::assert_ok!(task.await);
    }

    assert_eq!(log.lock().unwrap().len(), 5);
}
