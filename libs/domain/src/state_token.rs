//! The task state token: a closed enumeration of every state a task can
//! occupy, plus the fifteen-phase pipeline the task walks through.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use typeshare::typeshare;

/// One of the fifteen ordered pipeline phases, in pipeline order.
#[typeshare]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    TaskUnderstanding,
    ProjectUnderstanding,
    TaskPlanning,
    TechnologySelection,
    CodeGeneration,
    CodeRefinement,
    SelfReview,
    ErrorCorrection,
    TestGeneration,
    CodeExecution,
    TestAnalysis,
    DocumentationUpdate,
    LearningUpdate,
    PrPreparation,
    FeedbackIntegration,
}

/// All phases, in pipeline order. The order here is load-bearing: the
/// Transition Manager's `<phase>_completed -> <next phase>` rule walks
/// this array.
pub const PHASES: [Phase; 15] = [
    Phase::TaskUnderstanding,
    Phase::ProjectUnderstanding,
    Phase::TaskPlanning,
    Phase::TechnologySelection,
    Phase::CodeGeneration,
    Phase::CodeRefinement,
    Phase::SelfReview,
    Phase::ErrorCorrection,
    Phase::TestGeneration,
    Phase::CodeExecution,
    Phase::TestAnalysis,
    Phase::DocumentationUpdate,
    Phase::LearningUpdate,
    Phase::PrPreparation,
    Phase::FeedbackIntegration,
];

impl Phase {
    /// Machine-readable name, also used as the step name resolved by the
    /// Step Executor Registry.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::TaskUnderstanding => "task_understanding",
            Self::ProjectUnderstanding => "project_understanding",
            Self::TaskPlanning => "task_planning",
            Self::TechnologySelection => "technology_selection",
            Self::CodeGeneration => "code_generation",
            Self::CodeRefinement => "code_refinement",
            Self::SelfReview => "self_review",
            Self::ErrorCorrection => "error_correction",
            Self::TestGeneration => "test_generation",
            Self::CodeExecution => "code_execution",
            Self::TestAnalysis => "test_analysis",
            Self::DocumentationUpdate => "documentation_update",
            Self::LearningUpdate => "learning_update",
            Self::PrPreparation => "pr_preparation",
            Self::FeedbackIntegration => "feedback_integration",
        }
    }

    /// The 1-based ordering position in the pipeline, matching the
    /// Step Executor contract's declared `ordering_position`.
    #[must_use]
    pub fn position(self) -> u8 {
        PHASES
            .iter()
            .position(|p| *p == self)
            .expect("Phase is always present in PHASES") as u8
            + 1
    }

    /// The phase that follows this one, or `None` if this is the last phase.
    #[must_use]
    pub fn next(self) -> Option<Phase> {
        let idx = self.position() as usize;
        PHASES.get(idx).copied()
    }

    /// Parse a phase from its machine-readable name.
    pub fn parse(name: &str) -> Result<Self, StateTokenParseError> {
        PHASES
            .iter()
            .copied()
            .find(|p| p.name() == name)
            .ok_or_else(|| StateTokenParseError::UnknownPhase(name.to_string()))
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Errors parsing a `StateToken` or `Phase` from a string.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StateTokenParseError {
    #[error("unknown phase: {0}")]
    UnknownPhase(String),
    #[error("unknown state token: {0}")]
    UnknownToken(String),
}

/// The authoritative state token, drawn from the closed enumeration
/// described in the orchestration spec's data model.
#[typeshare]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StateToken {
    Initialized,
    Phase(Phase),
    PhaseCompleted(Phase),
    Completed,
    Failed,
    Paused,
    WaitingForInput,
    Recovering,
}

impl StateToken {
    /// Whether this is one of the two terminal states.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether a task in this state counts against the admission limit
    /// (i.e. is actively being processed, not paused/waiting/terminal).
    #[must_use]
    pub fn is_active_processing(self) -> bool {
        !matches!(
            self,
            Self::Completed | Self::Failed | Self::Paused | Self::WaitingForInput
        )
    }

    /// The machine-readable token name, matching the wire format used
    /// throughout persistence and the external operation surface.
    #[must_use]
    pub fn name(self) -> String {
        match self {
            Self::Initialized => "initialized".to_string(),
            Self::Phase(p) => p.name().to_string(),
            Self::PhaseCompleted(p) => format!("{}_completed", p.name()),
            Self::Completed => "completed".to_string(),
            Self::Failed => "failed".to_string(),
            Self::Paused => "paused".to_string(),
            Self::WaitingForInput => "waiting_for_input".to_string(),
            Self::Recovering => "recovering".to_string(),
        }
    }
}

impl fmt::Display for StateToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for StateToken {
    type Err = StateTokenParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "initialized" => Ok(Self::Initialized),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "paused" => Ok(Self::Paused),
            "waiting_for_input" => Ok(Self::WaitingForInput),
            "recovering" => Ok(Self::Recovering),
            other => {
                if let Some(phase_name) = other.strip_suffix("_completed") {
                    if let Ok(phase) = Phase::parse(phase_name) {
                        return Ok(Self::PhaseCompleted(phase));
                    }
                }
                Phase::parse(other)
                    .map(Self::Phase)
                    .map_err(|_| StateTokenParseError::UnknownToken(other.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_ordering_and_names() {
        assert_eq!(Phase::TaskUnderstanding.position(), 1);
        assert_eq!(Phase::FeedbackIntegration.position(), 15);
        assert_eq!(Phase::TaskUnderstanding.name(), "task_understanding");
    }

    #[test]
    fn test_phase_next() {
        assert_eq!(
            Phase::TaskUnderstanding.next(),
            Some(Phase::ProjectUnderstanding)
        );
        assert_eq!(Phase::FeedbackIntegration.next(), None);
    }

    #[test]
    fn test_state_token_roundtrip() {
        for token in [
            StateToken::Initialized,
            StateToken::Phase(Phase::CodeGeneration),
            StateToken::PhaseCompleted(Phase::CodeGeneration),
            StateToken::Completed,
            StateToken::Failed,
            StateToken::Paused,
            StateToken::WaitingForInput,
            StateToken::Recovering,
        ] {
            let s = token.name();
            let parsed: StateToken = s.parse().unwrap();
            assert_eq!(token, parsed, "roundtrip failed for {s}");
        }
    }

    #[test]
    fn test_terminal_states() {
        assert!(StateToken::Completed.is_terminal());
        assert!(StateToken::Failed.is_terminal());
        assert!(!StateToken::Paused.is_terminal());
        assert!(!StateToken::Phase(Phase::CodeGeneration).is_terminal());
    }

    #[test]
    fn test_active_processing() {
        assert!(StateToken::Phase(Phase::CodeGeneration).is_active_processing());
        assert!(!StateToken::Paused.is_active_processing());
        assert!(!StateToken::WaitingForInput.is_active_processing());
        assert!(!StateToken::Completed.is_active_processing());
    }

    #[test]
    fn test_unknown_token_rejected() {
        assert!("bogus_state".parse::<StateToken>().is_err());
    }
}
