//! Inline result cache
//!
//! Answers paginated inline queries from the content store. Each image is
//! uploaded to the platform at most once; the returned reference is stored
//! on the image row and reused for every later answer.
//!
//! No transaction is held while waiting on the platform. Candidates are read
//! on a short-lived connection, and each reference is written by its own
//! statement after its upload returns.

use std::sync::Arc;

use crate::config::SearchConfig;
use crate::db::{self, DbPool, ImageHit};
use crate::media::{ImageStore, PerceptualHash};
use crate::models::ModelPool;
use crate::platform::{ChatClient, InlineAnswer, InlineResult};
use crate::Result;

/// Prefix of inline result ids
const RESULT_ID_PREFIX: &str = "img-";

/// Seconds the platform may cache an answer
const ANSWER_CACHE_SECS: u32 = 30;

const NO_RESULTS_ID: &str = "no-results";
const NO_RESULTS_TEXT: &str = "No results";

/// One servable result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineItem {
    pub image_id: i64,
    /// Platform reference to the uploaded photo
    pub file_ref: String,
}

impl InlineItem {
    /// Result id reported back when the user picks this item
    #[must_use]
    pub fn result_id(&self) -> String {
        format!("{RESULT_ID_PREFIX}{}", self.image_id)
    }
}

/// A page of inline results
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InlinePage {
    Results {
        items: Vec<InlineItem>,
        next_offset: usize,
    },
    /// Nothing matched at all
    NoResults,
    /// A later page ran past the last match
    End,
}

impl InlinePage {
    /// Platform answer for this page
    #[must_use]
    pub fn to_answer(&self) -> InlineAnswer {
        match self {
            Self::Results { items, next_offset } => InlineAnswer {
                results: items
                    .iter()
                    .map(|item| InlineResult::CachedPhoto {
                        id: item.result_id(),
                        file_id: item.file_ref.clone(),
                    })
                    .collect(),
                next_offset: Some(next_offset.to_string()),
                cache_time: ANSWER_CACHE_SECS,
            },
            Self::NoResults => InlineAnswer {
                results: vec![InlineResult::Article {
                    id: NO_RESULTS_ID.to_string(),
                    title: NO_RESULTS_TEXT.to_string(),
                    message_text: NO_RESULTS_TEXT.to_string(),
                }],
                next_offset: None,
                cache_time: ANSWER_CACHE_SECS,
            },
            Self::End => InlineAnswer {
                results: Vec::new(),
                next_offset: None,
                cache_time: ANSWER_CACHE_SECS,
            },
        }
    }
}

/// Parse a page cursor; anything unparsable means the first page
#[must_use]
pub fn parse_offset(offset: &str) -> usize {
    offset.trim().parse().unwrap_or(0)
}

/// Image id from a result id, if it is one of ours
#[must_use]
pub fn parse_result_id(result_id: &str) -> Option<i64> {
    result_id.strip_prefix(RESULT_ID_PREFIX)?.parse().ok()
}

/// Serves inline queries from the content store
pub struct InlineCache {
    pool: DbPool,
    client: Arc<dyn ChatClient>,
    store: ImageStore,
    models: Arc<ModelPool>,
    config: SearchConfig,
}

impl InlineCache {
    #[must_use]
    pub fn new(
        pool: DbPool,
        client: Arc<dyn ChatClient>,
        store: ImageStore,
        models: Arc<ModelPool>,
        config: SearchConfig,
    ) -> Self {
        Self {
            pool,
            client,
            store,
            models,
            config,
        }
    }

    /// Build one page for `query` starting at `offset`
    ///
    /// An empty query ranks by usage. Candidates that cannot be uploaded are
    /// left out of the page.
    ///
    /// # Errors
    ///
    /// Returns error if the candidate query or a reference write fails
    pub async fn answer(&self, query: &str, offset: &str) -> Result<InlinePage> {
        let offset = parse_offset(offset);
        let query = query.trim();
        let hits = self.candidates(query, offset).await?;

        if hits.is_empty() {
            return Ok(if offset == 0 {
                InlinePage::NoResults
            } else {
                InlinePage::End
            });
        }

        let next_offset = offset + hits.len();
        let mut items = Vec::with_capacity(hits.len());
        for hit in hits {
            match self.file_ref(&hit).await {
                Ok(file_ref) => items.push(InlineItem {
                    image_id: hit.id,
                    file_ref,
                }),
                Err(e) => {
                    tracing::warn!(image_id = hit.id, phash = %hit.phash, error = %e, "dropping inline candidate");
                }
            }
        }

        tracing::debug!(query, offset, served = items.len(), next_offset, "inline page");
        Ok(InlinePage::Results { items, next_offset })
    }

    /// Record that a user picked a result; unknown ids are ignored
    ///
    /// Returns true if usage was recorded.
    ///
    /// # Errors
    ///
    /// Returns error if the store write fails
    pub fn record_choice(&self, result_id: &str, user_id: i64) -> Result<bool> {
        let Some(image_id) = parse_result_id(result_id) else {
            tracing::debug!(result_id, "ignoring foreign inline result");
            return Ok(false);
        };
        let conn = db::connect(&self.pool)?;
        let recorded = db::usage::record_existing(&conn, image_id, user_id)?;
        if !recorded {
            tracing::debug!(image_id, "chosen result names an unknown image");
        }
        Ok(recorded)
    }

    async fn candidates(&self, query: &str, offset: usize) -> Result<Vec<ImageHit>> {
        let limit = self.config.page_size;
        if query.is_empty() {
            let conn = db::connect(&self.pool)?;
            return db::image::most_used(&conn, limit, offset);
        }

        let vector = match self.models.embed_text(query).await {
            Ok(vector) => vector,
            Err(e) => {
                tracing::warn!(error = %e, "query embedding failed, using text only");
                None
            }
        };
        let conn = db::connect(&self.pool)?;
        db::image::search(
            &conn,
            query,
            vector.as_deref(),
            self.config.max_distance,
            limit,
            offset,
        )
    }

    /// Cached reference, or upload the stored file and cache the result
    async fn file_ref(&self, hit: &ImageHit) -> Result<String> {
        if let Some(file_ref) = &hit.file_ref {
            return Ok(file_ref.clone());
        }
        let phash: PerceptualHash = hit.phash.parse()?;
        let path = self.store.path_for(phash);
        let file_ref = self.client.upload_photo(&path).await?;
        let conn = db::connect(&self.pool)?;
        db::image::set_file_ref(&conn, hit.id, &file_ref)?;
        tracing::debug!(image_id = hit.id, "cached inline file reference");
        Ok(file_ref)
    }
}
