use appforge_core::BuildMode;
use serde::Serialize;

use crate::error::{OrchestratorError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStage {
    Validating,
    Generating,
    PublishingRepo,
    CommittingFiles,
    PublishingSite,
    VerifyingLiveness,
    NotifyingEvaluator,
    Done,
    Failed,
}

impl BuildStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validating => "validating",
            Self::Generating => "generating",
            Self::PublishingRepo => "publishing_repo",
            Self::CommittingFiles => "committing_files",
            Self::PublishingSite => "publishing_site",
            Self::VerifyingLiveness => "verifying_liveness",
            Self::NotifyingEvaluator => "notifying_evaluator",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

pub struct BuildStateMachine;

impl BuildStateMachine {
    pub fn validate_transition(from: BuildStage, to: BuildStage) -> Result<()> {
        if Self::allowed_transitions(from).contains(&to) {
            Ok(())
        } else {
            Err(OrchestratorError::InvalidTransition { from, to })
        }
    }

    /// Past the site publication nothing can fail the build anymore.
    fn allowed_transitions(from: BuildStage) -> Vec<BuildStage> {
        use BuildStage::*;
        match from {
            Validating => vec![Generating, Failed],
            // Updates reuse the repository located while generating.
            Generating => vec![PublishingRepo, CommittingFiles, Failed],
            PublishingRepo => vec![CommittingFiles, Failed],
            CommittingFiles => vec![PublishingSite, Failed],
            PublishingSite => vec![VerifyingLiveness, Failed],
            VerifyingLiveness => vec![NotifyingEvaluator, Failed],
            NotifyingEvaluator => vec![Done],
            Done | Failed => vec![],
        }
    }

    pub fn can_transition(from: BuildStage, to: BuildStage) -> bool {
        Self::validate_transition(from, to).is_ok()
    }

    /// The stage that follows `current` on the happy path for `mode`.
    pub fn next_stage(current: BuildStage, mode: BuildMode) -> Option<BuildStage> {
        use BuildStage::*;
        match current {
            Validating => Some(Generating),
            Generating if mode.is_initial() => Some(PublishingRepo),
            Generating => Some(CommittingFiles),
            PublishingRepo => Some(CommittingFiles),
            CommittingFiles => Some(PublishingSite),
            PublishingSite => Some(VerifyingLiveness),
            VerifyingLiveness => Some(NotifyingEvaluator),
            NotifyingEvaluator => Some(Done),
            Done | Failed => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_for_initial_build() {
        let mut stage = BuildStage::Validating;
        let mut visited = vec![stage];
        while let Some(next) = BuildStateMachine::next_stage(stage, BuildMode::Initial) {
            assert!(BuildStateMachine::can_transition(stage, next));
            stage = next;
            visited.push(stage);
        }

        assert_eq!(visited.len(), 8);
        assert_eq!(stage, BuildStage::Done);
    }

    #[test]
    fn test_update_skips_repository_creation() {
        let mode = BuildMode::Update { round: 2 };
        assert_eq!(
            BuildStateMachine::next_stage(BuildStage::Generating, mode),
            Some(BuildStage::CommittingFiles)
        );
    }

    #[test]
    fn test_failed_reachable_until_notification() {
        assert!(BuildStateMachine::can_transition(
            BuildStage::Validating,
            BuildStage::Failed
        ));
        assert!(BuildStateMachine::can_transition(
            BuildStage::PublishingSite,
            BuildStage::Failed
        ));
        assert!(!BuildStateMachine::can_transition(
            BuildStage::NotifyingEvaluator,
            BuildStage::Failed
        ));
        assert!(!BuildStateMachine::can_transition(
            BuildStage::Done,
            BuildStage::Failed
        ));
    }

    #[test]
    fn test_invalid_transitions() {
        assert!(!BuildStateMachine::can_transition(
            BuildStage::Validating,
            BuildStage::CommittingFiles
        ));
        let err = BuildStateMachine::validate_transition(BuildStage::Done, BuildStage::Validating)
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidTransition { .. }));
        assert!(BuildStage::Failed.is_terminal());
        assert_eq!(BuildStage::PublishingRepo.as_str(), "publishing_repo");
    }
}
