pub mod replay;
pub mod types;

use anyhow::Result;
use async_trait::async_trait;
use types::CandidateItem;

/// Source of candidate posts, typically the live page.
#[async_trait]
pub trait Discovery: Send + Sync {
    /// Everything currently visible, in page order. Empty means nothing has
    /// loaded yet; it is not an error.
    async fn find_candidates(&mut self) -> Result<Vec<CandidateItem>>;

    /// Scroll or otherwise ask for more content. Returns false once no more
    /// content can be obtained.
    async fn load_more(&mut self) -> Result<bool>;
}
