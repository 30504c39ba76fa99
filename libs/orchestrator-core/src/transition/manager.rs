//! Owns the transition table and the "what runs next" decision.

use orch_domain::state_token::{Phase, StateToken};

use super::table::is_admissible;

/// Computes the next state from `(current state, last result, recovery
/// decision)` and answers "what step runs next" for the Scheduler.
#[derive(Debug, Default, Clone, Copy)]
pub struct TransitionManager;

impl TransitionManager {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Whether moving from `from` to `to` is admitted by the table.
    #[must_use]
    pub fn is_admissible(&self, from: StateToken, to: StateToken) -> bool {
        is_admissible(from, to)
    }

    /// The step name whose execution produces the expected
    /// `_completed` transition, or `None` at terminal states or when
    /// the current state requires user input before progress resumes.
    #[must_use]
    pub fn next_step(&self, current: StateToken) -> Option<Phase> {
        match current {
            StateToken::Phase(p) => Some(p),
            StateToken::PhaseCompleted(p) => p.next(),
            StateToken::Initialized => Some(Phase::TaskUnderstanding),
            StateToken::Completed
            | StateToken::Failed
            | StateToken::Paused
            | StateToken::WaitingForInput
            | StateToken::Recovering => None,
        }
    }

    /// The default `<phase>_completed -> <next>` target for a phase
    /// that just finished, honoring the named branch exceptions;
    /// `None` once past the last phase (the caller should transition to
    /// `completed` instead).
    #[must_use]
    pub fn default_next_state(&self, completed: Phase) -> Option<StateToken> {
        completed.next().map(StateToken::Phase)
    }
}
