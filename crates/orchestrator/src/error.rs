use appforge_core::CoreError;
use thiserror::Error;

use crate::state_machine::BuildStage;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Invalid secret")]
    Authentication,

    #[error("Invalid request: {0}")]
    InvalidRequest(#[from] CoreError),

    #[error("Invalid stage transition from {from:?} to {to:?}")]
    InvalidTransition { from: BuildStage, to: BuildStage },

    #[error(transparent)]
    Hosting(#[from] github::GitHubError),

    #[error("Failed to {verb} application: {reason}")]
    PipelineFailed { verb: &'static str, reason: String },

    #[error("Job queue is not accepting jobs")]
    QueueClosed,
}

impl OrchestratorError {
    pub fn pipeline_failed(verb: &'static str, reason: impl Into<String>) -> Self {
        Self::PipelineFailed {
            verb,
            reason: reason.into(),
        }
    }

    /// True for errors caused by the caller rather than by a collaborator.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Authentication | Self::InvalidRequest(_))
    }
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_failure_message() {
        let err = OrchestratorError::pipeline_failed("update", "Not found: Not Found");
        assert_eq!(
            err.to_string(),
            "Failed to update application: Not found: Not Found"
        );
        assert!(!err.is_client_error());
    }

    #[test]
    fn test_client_errors() {
        assert!(OrchestratorError::Authentication.is_client_error());
        assert!(OrchestratorError::from(CoreError::InvalidRound(0)).is_client_error());
        assert_eq!(OrchestratorError::Authentication.to_string(), "Invalid secret");
    }
}
