//! Eligibility checks for a candidate, cheapest and most decisive first.

use super::timing::hours_span;
use crate::config::RunConfig;
use crate::error::EngineResult;
use crate::feed::types::CandidateItem;
use crate::store::dedup::{
    DedupStore, SKIPPED_DUPLICATE, SKIPPED_KEYWORD, SKIPPED_RECENT_AUTHOR, SKIPPED_TIME_FILTER,
};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReasonCode {
    Accepted,
    DuplicateItem,
    RecentAuthor,
    TooRecent,
    BlockedKeyword,
}

impl ReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::Accepted => "ACCEPTED",
            ReasonCode::DuplicateItem => "DUPLICATE_ITEM",
            ReasonCode::RecentAuthor => "RECENT_AUTHOR",
            ReasonCode::TooRecent => "TOO_RECENT",
            ReasonCode::BlockedKeyword => "BLOCKED_KEYWORD",
        }
    }

    /// Counter bumped when a candidate is rejected for this reason.
    pub fn counter(&self) -> Option<&'static str> {
        match self {
            ReasonCode::Accepted => None,
            ReasonCode::DuplicateItem => Some(SKIPPED_DUPLICATE),
            ReasonCode::RecentAuthor => Some(SKIPPED_RECENT_AUTHOR),
            ReasonCode::TooRecent => Some(SKIPPED_TIME_FILTER),
            ReasonCode::BlockedKeyword => Some(SKIPPED_KEYWORD),
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterVerdict {
    pub passed: bool,
    pub reason: ReasonCode,
}

impl FilterVerdict {
    pub fn accept() -> Self {
        Self {
            passed: true,
            reason: ReasonCode::Accepted,
        }
    }

    pub fn reject(reason: ReasonCode) -> Self {
        Self {
            passed: false,
            reason,
        }
    }
}

pub struct FilterPipeline {
    store: Arc<DedupStore>,
}

impl FilterPipeline {
    pub fn new(store: Arc<DedupStore>) -> Self {
        Self { store }
    }

    /// Run the filters in order and stop at the first rejection, bumping only
    /// that filter's counter. Acceptance writes nothing.
    pub async fn evaluate(
        &self,
        candidate: &CandidateItem,
        config: &RunConfig,
    ) -> EngineResult<FilterVerdict> {
        let Some(reason) = self.first_rejection(candidate, config).await? else {
            return Ok(FilterVerdict::accept());
        };
        if let Some(counter) = reason.counter() {
            self.store.increment_counter(counter).await?;
        }
        tracing::debug!(
            item = %candidate.item_key,
            author = %candidate.author_key,
            reason = %reason,
            "candidate skipped"
        );
        Ok(FilterVerdict::reject(reason))
    }

    async fn first_rejection(
        &self,
        candidate: &CandidateItem,
        config: &RunConfig,
    ) -> EngineResult<Option<ReasonCode>> {
        if self.store.has_acted_on_item(&candidate.item_key).await? {
            return Ok(Some(ReasonCode::DuplicateItem));
        }
        // Acted on, but the commit did not land yet.
        if self.store.is_pending(&candidate.item_key).await? {
            return Ok(Some(ReasonCode::DuplicateItem));
        }

        if self
            .store
            .has_acted_on_author_recently(
                &candidate.author_key,
                config.duplicate_author_window_hours,
            )
            .await?
        {
            return Ok(Some(ReasonCode::RecentAuthor));
        }

        // Unknown age never rejects.
        if config.time_filter_enabled {
            if let Some(published_at) = candidate.age_timestamp {
                let age = self.store.now() - published_at;
                if age < hours_span(config.min_item_age_hours) {
                    return Ok(Some(ReasonCode::TooRecent));
                }
            }
        }

        if contains_blocked_keyword(&candidate.content_text, &config.skip_keywords) {
            return Ok(Some(ReasonCode::BlockedKeyword));
        }

        Ok(None)
    }
}

fn contains_blocked_keyword(text: &str, keywords: &[String]) -> bool {
    if keywords.is_empty() {
        return false;
    }
    let text = text.to_lowercase();
    keywords
        .iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .any(|k| text.contains(&k.to_lowercase()))
}
