use super::{normalize_comment, ContentGenerator};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::sync::Mutex;

/// Picks one of a fixed set of comments at random. Used for dry runs when no
/// remote generator is configured.
pub struct TemplateGenerator {
    templates: Vec<String>,
    rng: Mutex<StdRng>,
}

impl TemplateGenerator {
    pub fn new(templates: Vec<String>) -> Self {
        Self {
            templates,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub fn with_seed(templates: Vec<String>, seed: u64) -> Self {
        Self {
            templates,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn default_templates() -> Vec<String> {
        [
            "Really appreciate you sharing this.",
            "Great perspective, thanks for posting.",
            "This is a helpful breakdown.",
            "Well put. Curious to see where this goes.",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }
}

#[async_trait]
impl ContentGenerator for TemplateGenerator {
    async fn generate(&self, _content_text: &str) -> Result<Option<String>> {
        let mut rng = self
            .rng
            .lock()
            .map_err(|e| anyhow!("template rng lock poisoned: {}", e))?;
        Ok(normalize_comment(self.templates.choose(&mut *rng).cloned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_picks_from_templates() {
        let templates = TemplateGenerator::default_templates();
        let generator = TemplateGenerator::with_seed(templates.clone(), 4);
        for _ in 0..10 {
            let comment = generator.generate("post").await.unwrap().unwrap();
            assert!(templates.contains(&comment));
        }
    }

    #[tokio::test]
    async fn test_no_templates_yields_none() {
        let generator = TemplateGenerator::new(Vec::new());
        assert_eq!(generator.generate("post").await.unwrap(), None);
    }
}
