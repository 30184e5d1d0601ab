pub mod dry_run;
pub mod executor;

use crate::feed::types::CandidateItem;
use anyhow::Result;
use async_trait::async_trait;
use std::fmt;

/// UI element the executor needs for one comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetRole {
    CommentButton,
    CommentField,
    SubmitButton,
}

impl fmt::Display for TargetRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TargetRole::CommentButton => "comment-button",
            TargetRole::CommentField => "comment-field",
            TargetRole::SubmitButton => "submit-button",
        };
        f.write_str(s)
    }
}

/// Opaque handle to a located UI element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target(pub String);

/// Physical interactions with the host page. All of them may suspend.
#[async_trait]
pub trait InteractionCapabilities: Send + Sync {
    /// `None` means the element is not on the page, which is a soft failure.
    async fn locate(&self, candidate: &CandidateItem, role: TargetRole) -> Result<Option<Target>>;
    async fn click(&self, target: &Target) -> Result<()>;
    async fn focus(&self, target: &Target) -> Result<()>;
    async fn type_into(&self, target: &Target, text: &str) -> Result<()>;
}
