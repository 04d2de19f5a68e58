//! Middleware chain around handler invocation

use std::sync::Arc;

use async_trait::async_trait;

use super::{Context, Flow, Handler};
use crate::Result;
use crate::db::{DbPool, DbSession};

/// Wrapper that runs around the rest of the chain
///
/// Implementations may act before and after calling [`Next::run`], and may
/// replace the outcome. A `Stop` from the handler always unwinds through
/// every middleware.
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(&self, ctx: &mut Context, next: Next<'_>) -> Result<Flow>;
}

/// Continuation: the remaining middleware plus the endpoint handler
#[derive(Clone, Copy)]
pub struct Next<'a> {
    chain: &'a [Arc<dyn Middleware>],
    endpoint: &'a dyn Handler,
}

impl<'a> Next<'a> {
    pub(crate) fn new(chain: &'a [Arc<dyn Middleware>], endpoint: &'a dyn Handler) -> Self {
        Self { chain, endpoint }
    }

    /// Invoke the next middleware, or the handler when the chain is exhausted
    ///
    /// # Errors
    ///
    /// Returns whatever the downstream middleware or handler returns
    pub async fn run(self, ctx: &mut Context) -> Result<Flow> {
        match self.chain.split_first() {
            Some((head, rest)) => {
                head.handle(
                    ctx,
                    Next {
                        chain: rest,
                        endpoint: self.endpoint,
                    },
                )
                .await
            }
            None => self.endpoint.handle(ctx).await,
        }
    }
}

/// Attaches one transactional session per event
///
/// Commits when the chain returns `Ok` (either flow); an error or a panic
/// drops the session, which rolls it back.
pub struct SessionMiddleware {
    pool: DbPool,
}

impl SessionMiddleware {
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Middleware for SessionMiddleware {
    async fn handle(&self, ctx: &mut Context, next: Next<'_>) -> Result<Flow> {
        ctx.session = Some(DbSession::new(&self.pool));
        let outcome = next.run(ctx).await;
        let session = ctx.session.take();

        match (outcome, session) {
            (Ok(flow), Some(session)) => {
                session.commit()?;
                tracing::trace!(event = ctx.event.kind(), ?flow, "session committed");
                Ok(flow)
            }
            (Ok(flow), None) => Ok(flow),
            (Err(e), _) => Err(e),
        }
    }
}
