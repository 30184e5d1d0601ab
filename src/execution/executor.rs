use super::{InteractionCapabilities, Target, TargetRole};
use crate::config::TimingConfig;
use crate::engine::timing::TimingController;
use crate::feed::types::CandidateItem;
use crate::generator::ContentGenerator;
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;

/// Result of one item's interaction sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    /// Comment posted on the item with this key.
    Success(String),
    /// The item cannot be processed (missing UI element, nothing to say).
    SoftFailure(String),
}

/// Runs the click/focus/type sequence for one candidate with human pacing
/// between steps. Never touches the dedup store; committing is the caller's job.
pub struct ActionExecutor {
    interaction: Arc<dyn InteractionCapabilities>,
    generator: Arc<dyn ContentGenerator>,
    timing: TimingConfig,
}

impl ActionExecutor {
    pub fn new(
        interaction: Arc<dyn InteractionCapabilities>,
        generator: Arc<dyn ContentGenerator>,
        timing: TimingConfig,
    ) -> Self {
        Self {
            interaction,
            generator,
            timing,
        }
    }

    /// Comment on `candidate`.
    ///
    /// Missing targets or an empty generation come back as `SoftFailure`.
    /// Capability and generator errors propagate.
    pub async fn execute(
        &self,
        candidate: &CandidateItem,
        timing: &mut TimingController,
    ) -> Result<ActionOutcome> {
        let Some(button) = self.locate(candidate, TargetRole::CommentButton).await? else {
            return Ok(soft_failure(candidate, "comment button not found"));
        };
        self.click(&button, timing).await.context("click comment button failed")?;

        let Some(field) = self.locate(candidate, TargetRole::CommentField).await? else {
            return Ok(soft_failure(candidate, "comment field not found"));
        };
        self.click(&field, timing).await.context("click comment field failed")?;
        self.interaction
            .focus(&field)
            .await
            .context("focus comment field failed")?;
        pause(timing.human_delay_for(&self.timing.post_focus)).await;

        let generated = self
            .generator
            .generate(&candidate.content_text)
            .await
            .context("comment generation failed")?;
        let text = match generated {
            Some(text) if !text.trim().is_empty() => text,
            _ => return Ok(soft_failure(candidate, "no comment generated")),
        };

        self.interaction
            .type_into(&field, &text)
            .await
            .context("typing comment failed")?;
        pause(timing.typing_delay(&text, self.timing.words_per_minute)).await;

        let Some(submit) = self.locate(candidate, TargetRole::SubmitButton).await? else {
            return Ok(soft_failure(candidate, "submit button not found"));
        };
        self.click(&submit, timing).await.context("click submit failed")?;

        tracing::info!(
            item = %candidate.item_key,
            author = %candidate.author_key,
            chars = text.chars().count(),
            "comment posted"
        );
        Ok(ActionOutcome::Success(candidate.item_key.clone()))
    }

    async fn locate(&self, candidate: &CandidateItem, role: TargetRole) -> Result<Option<Target>> {
        self.interaction
            .locate(candidate, role)
            .await
            .with_context(|| format!("locate {} failed", role))
    }

    /// Mouse travel, click, then let the UI settle.
    async fn click(&self, target: &Target, timing: &mut TimingController) -> Result<()> {
        pause(timing.human_delay_for(&self.timing.pre_click)).await;
        self.interaction.click(target).await?;
        pause(timing.human_delay_for(&self.timing.post_click)).await;
        Ok(())
    }
}

fn soft_failure(candidate: &CandidateItem, reason: &str) -> ActionOutcome {
    tracing::warn!(item = %candidate.item_key, reason, "cannot comment on item");
    ActionOutcome::SoftFailure(reason.to_string())
}

async fn pause(duration: Duration) {
    if !duration.is_zero() {
        tokio::time::sleep(duration).await;
    }
}
