use thiserror::Error;

/// Errors surfaced by the engine's public API.
///
/// Item-local problems (missing UI target, no generated text) are not errors;
/// they come back as `ActionOutcome::SoftFailure`.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("automation is already running")]
    AlreadyRunning,

    #[error("config cannot be changed while a run is in progress")]
    ConfigLocked,

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("store error: {0}")]
    Store(String),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{0:#}")]
    Collaborator(#[from] anyhow::Error),
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            EngineError::AlreadyRunning.to_string(),
            "automation is already running"
        );
        assert_eq!(
            EngineError::InvalidConfig("target_action_count must be > 0".to_string()).to_string(),
            "invalid config: target_action_count must be > 0"
        );
    }

    #[test]
    fn test_collaborator_error_keeps_context() {
        let err = anyhow::anyhow!("connection reset").context("generate comment failed");
        let engine_err: EngineError = err.into();
        assert_eq!(
            engine_err.to_string(),
            "generate comment failed: connection reset"
        );
    }
}
