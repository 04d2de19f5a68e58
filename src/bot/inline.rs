//! Inline query handlers

use std::sync::Arc;

use async_trait::async_trait;

use super::BotServices;
use crate::Result;
use crate::dispatch::{Context, Event, Flow, Handler};

/// Answers inline queries from the result cache
pub struct InlineQueryHandler {
    services: Arc<BotServices>,
}

impl InlineQueryHandler {
    #[must_use]
    pub const fn new(services: Arc<BotServices>) -> Self {
        Self { services }
    }
}

#[async_trait]
impl Handler for InlineQueryHandler {
    fn name(&self) -> &str {
        "inline_query"
    }

    async fn handle(&self, ctx: &Context) -> Result<Flow> {
        let Event::InlineQuery(query) = ctx.event.as_ref() else {
            return Ok(Flow::Continue);
        };
        let page = self
            .services
            .inline
            .answer(&query.query, &query.offset)
            .await?;
        self.services
            .client
            .answer_inline_query(&query.id, &page.to_answer())
            .await?;
        Ok(Flow::Stop)
    }
}

/// Records which inline result a user picked
pub struct ChosenResultHandler {
    services: Arc<BotServices>,
}

impl ChosenResultHandler {
    #[must_use]
    pub const fn new(services: Arc<BotServices>) -> Self {
        Self { services }
    }
}

#[async_trait]
impl Handler for ChosenResultHandler {
    fn name(&self) -> &str {
        "chosen_inline_result"
    }

    async fn handle(&self, ctx: &Context) -> Result<Flow> {
        let Event::ChosenInlineResult(chosen) = ctx.event.as_ref() else {
            return Ok(Flow::Continue);
        };
        let recorded = self
            .services
            .inline
            .record_choice(&chosen.result_id, chosen.user_id)?;
        tracing::debug!(result_id = %chosen.result_id, recorded, "inline result chosen");
        Ok(Flow::Stop)
    }
}
