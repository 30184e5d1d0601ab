pub mod http;
pub mod template;

pub use http::HttpContentGenerator;
pub use template::TemplateGenerator;

use anyhow::Result;
use async_trait::async_trait;

/// Produces the comment text for a post.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    /// `Ok(None)` means nothing suitable was produced; the item is skipped,
    /// the run goes on.
    async fn generate(&self, content_text: &str) -> Result<Option<String>>;
}

/// Trim generator output; blank text counts as no output.
pub(crate) fn normalize_comment(raw: Option<String>) -> Option<String> {
    raw.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}
