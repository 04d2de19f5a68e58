//! Event dispatch core
//!
//! Bindings pair a [`Filter`] with a [`Handler`]. For each event, matching
//! bindings run sequentially in registration order through the middleware
//! chain until one returns [`Flow::Stop`]. Handler errors and panics are
//! caught here and logged; [`Dispatcher::dispatch`] never fails.

pub mod event;
pub mod filter;
pub mod middleware;

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;

pub use event::Event;
pub use filter::{ChatScope, Direction, Filter, MatchInfo, MessageKind};
pub use middleware::{Middleware, Next, SessionMiddleware};

use crate::db::DbSession;
use crate::{Error, Result};

/// Handler outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Let later bindings see the event
    Continue,
    /// Stop routing to later bindings
    Stop,
}

/// Per-invocation state handed to middleware and the handler
pub struct Context {
    pub event: Arc<Event>,
    /// Text after a matched command
    pub args: Option<String>,
    /// Regex captures of a pattern filter
    pub captures: Vec<Option<String>>,
    /// Transaction opened by [`SessionMiddleware`]; absent for raw bindings
    pub session: Option<DbSession>,
}

impl Context {
    #[must_use]
    pub const fn new(event: Arc<Event>) -> Self {
        Self {
            event,
            args: None,
            captures: Vec::new(),
            session: None,
        }
    }

    fn with_match(event: Arc<Event>, info: MatchInfo) -> Self {
        Self {
            event,
            args: info.args,
            captures: info.captures,
            session: None,
        }
    }

    /// The event's session
    ///
    /// # Errors
    ///
    /// Returns error when no session middleware ran for this binding
    pub fn session(&self) -> Result<&DbSession> {
        self.session
            .as_ref()
            .ok_or_else(|| Error::Handler("no database session for this event".to_string()))
    }
}

/// Event handler
#[async_trait]
pub trait Handler: Send + Sync {
    /// Name used in logs and for registration identity
    fn name(&self) -> &str;

    /// Handle one matched event
    async fn handle(&self, ctx: &Context) -> Result<Flow>;
}

/// A filter bound to a handler
#[derive(Clone)]
pub struct Binding {
    pub filter: Filter,
    pub handler: Arc<dyn Handler>,
}

impl Binding {
    fn same_as(&self, other: &Self) -> bool {
        self.handler.name() == other.handler.name()
            && self.filter.signature() == other.filter.signature()
    }
}

/// Ordered group of bindings that can be included into a dispatcher
#[derive(Default, Clone)]
pub struct Router {
    bindings: Vec<Binding>,
}

impl Router {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a binding; a repeat of an existing (handler name, filter) is ignored
    pub fn register(&mut self, filter: Filter, handler: Arc<dyn Handler>) -> &mut Self {
        let binding = Binding { filter, handler };
        if self.bindings.iter().any(|b| b.same_as(&binding)) {
            tracing::debug!(handler = binding.handler.name(), "binding already registered");
        } else {
            self.bindings.push(binding);
        }
        self
    }

    /// Append another router's bindings, keeping their order
    pub fn include(&mut self, other: Self) -> &mut Self {
        for binding in other.bindings {
            self.register(binding.filter, binding.handler);
        }
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

/// Routes events to bindings through the middleware chain
#[derive(Default)]
pub struct Dispatcher {
    router: Router,
    middleware: Vec<Arc<dyn Middleware>>,
    bot_username: Option<String>,
}

impl Dispatcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Username used to accept `/command@username` mentions
    pub fn set_bot_username(&mut self, username: impl Into<String>) {
        self.bot_username = Some(username.into());
    }

    /// Append a middleware; the first added is the outermost
    pub fn add_middleware(&mut self, middleware: Arc<dyn Middleware>) -> &mut Self {
        self.middleware.push(middleware);
        self
    }

    /// Register a binding (idempotent per handler name and filter)
    pub fn register(&mut self, filter: Filter, handler: Arc<dyn Handler>) -> &mut Self {
        self.router.register(filter, handler);
        self
    }

    /// Include a router's bindings after the existing ones
    pub fn include(&mut self, router: Router) -> &mut Self {
        self.router.include(router);
        self
    }

    /// Number of registered bindings
    #[must_use]
    pub fn binding_count(&self) -> usize {
        self.router.len()
    }

    /// Route one event; never fails
    pub async fn dispatch(&self, event: Event) {
        let event = Arc::new(event);
        let bot_username = self.bot_username.as_deref();

        for binding in &self.router.bindings {
            let Some(info) = binding.filter.matches(&event, bot_username) else {
                continue;
            };
            let name = binding.handler.name();
            let mut ctx = Context::with_match(event.clone(), info);

            let chain: &[Arc<dyn Middleware>] = if binding.filter.bypasses_middleware() {
                &[]
            } else {
                &self.middleware
            };

            tracing::debug!(handler = name, event = event.kind(), "dispatching");
            let run = Next::new(chain, binding.handler.as_ref()).run(&mut ctx);
            let flow = match AssertUnwindSafe(run).catch_unwind().await {
                Ok(Ok(flow)) => flow,
                Ok(Err(e)) => {
                    tracing::error!(handler = name, error = %e, "handler failed");
                    Flow::Continue
                }
                Err(panic) => {
                    tracing::error!(
                        handler = name,
                        panic = panic_message(panic.as_ref()),
                        "handler panicked"
                    );
                    Flow::Continue
                }
            };

            if flow == Flow::Stop || binding.filter.stops_propagation() {
                break;
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
