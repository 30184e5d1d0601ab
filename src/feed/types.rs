use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One discovered post that may be eligible for a comment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateItem {
    /// Stable identity, e.g. the content URN.
    pub item_key: String,
    pub author_key: String,
    pub content_text: String,
    /// When the post was published, if the page exposes it.
    #[serde(default)]
    pub age_timestamp: Option<DateTime<Utc>>,
}

impl CandidateItem {
    pub fn new(
        item_key: impl Into<String>,
        author_key: impl Into<String>,
        content_text: impl Into<String>,
    ) -> Self {
        Self {
            item_key: item_key.into(),
            author_key: author_key.into(),
            content_text: content_text.into(),
            age_timestamp: None,
        }
    }

    pub fn with_age(mut self, published_at: DateTime<Utc>) -> Self {
        self.age_timestamp = Some(published_at);
        self
    }
}
