use super::types::CandidateItem;
use super::Discovery;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct ReplayFile {
    pages: Vec<Vec<CandidateItem>>,
}

/// Offline feed that reveals one recorded page per `load_more`, the way an
/// infinite-scroll page grows: earlier pages stay visible.
pub struct ReplayDiscovery {
    pages: Vec<Vec<CandidateItem>>,
    loaded: usize,
}

impl ReplayDiscovery {
    pub fn new(pages: Vec<Vec<CandidateItem>>) -> Self {
        Self { pages, loaded: 1 }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read feed file: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(json: &str) -> Result<Self> {
        let file: ReplayFile = serde_json::from_str(json).context("Failed to parse feed JSON")?;
        Ok(Self::new(file.pages))
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

#[async_trait]
impl Discovery for ReplayDiscovery {
    async fn find_candidates(&mut self) -> Result<Vec<CandidateItem>> {
        let visible = self.loaded.min(self.pages.len());
        Ok(self.pages[..visible].iter().flatten().cloned().collect())
    }

    async fn load_more(&mut self) -> Result<bool> {
        if self.loaded >= self.pages.len() {
            return Ok(false);
        }
        self.loaded += 1;
        tracing::debug!(loaded = self.loaded, total = self.pages.len(), "replay page revealed");
        Ok(true)
    }
}
