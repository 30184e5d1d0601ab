use super::{InteractionCapabilities, Target, TargetRole};
use crate::feed::types::CandidateItem;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};

/// Capability set that finds every element and only logs what it would do.
#[derive(Debug, Default)]
pub struct DryRunInteraction {
    steps: AtomicU64,
}

impl DryRunInteraction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of clicks, focuses and keystroke batches issued so far.
    pub fn steps(&self) -> u64 {
        self.steps.load(Ordering::Relaxed)
    }

    fn step(&self) {
        self.steps.fetch_add(1, Ordering::Relaxed);
    }
}

#[async_trait]
impl InteractionCapabilities for DryRunInteraction {
    async fn locate(&self, candidate: &CandidateItem, role: TargetRole) -> Result<Option<Target>> {
        Ok(Some(Target(format!("{}#{}", candidate.item_key, role))))
    }

    async fn click(&self, target: &Target) -> Result<()> {
        self.step();
        tracing::info!(target = %target.0, "DRY RUN: would click");
        Ok(())
    }

    async fn focus(&self, target: &Target) -> Result<()> {
        self.step();
        tracing::info!(target = %target.0, "DRY RUN: would focus");
        Ok(())
    }

    async fn type_into(&self, target: &Target, text: &str) -> Result<()> {
        self.step();
        tracing::info!(target = %target.0, text = %text, "DRY RUN: would type");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dry_run_locates_everything_and_counts_steps() {
        let page = DryRunInteraction::new();
        let item = CandidateItem::new("urn:1", "alice", "post");
        let target = page
            .locate(&item, TargetRole::SubmitButton)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(target, Target("urn:1#submit-button".to_string()));

        page.click(&target).await.unwrap();
        page.focus(&target).await.unwrap();
        page.type_into(&target, "hi").await.unwrap();
        assert_eq!(page.steps(), 3);
    }
}
