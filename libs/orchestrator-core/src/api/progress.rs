//! The fixed per-step progress weights `getStatus` reports against,
//! summing to 100 across the fifteen phases.

use orch_domain::context::TransitionRecord;
use orch_domain::state_token::{Phase, StateToken, PHASES};

const WEIGHTS: [u8; 15] = [5, 5, 7, 5, 15, 10, 8, 8, 10, 10, 7, 4, 3, 2, 1];

fn weight(phase: Phase) -> u32 {
    WEIGHTS[phase.position() as usize - 1] as u32
}

fn completed_weight_before(phase: Phase) -> u32 {
    PHASES
        .iter()
        .filter(|p| p.position() < phase.position())
        .map(|p| weight(*p))
        .sum()
}

/// Percentage complete, `[0, 100]`. A phase currently executing counts
/// half its weight; a phase already completed counts its full weight.
#[must_use]
pub fn progress_percent(state: StateToken, history: &[TransitionRecord]) -> u8 {
    let effective = match state {
        StateToken::Phase(_) | StateToken::PhaseCompleted(_) | StateToken::Initialized | StateToken::Completed => {
            state
        }
        StateToken::Paused | StateToken::WaitingForInput | StateToken::Failed | StateToken::Recovering => history
            .iter()
            .rev()
            .map(|t| t.to_state)
            .find(|s| matches!(s, StateToken::Phase(_) | StateToken::PhaseCompleted(_)))
            .unwrap_or(StateToken::Initialized),
    };

    let percent = match effective {
        StateToken::Initialized => 0,
        StateToken::Completed => 100,
        StateToken::Phase(p) => completed_weight_before(p) + weight(p) / 2,
        StateToken::PhaseCompleted(p) => completed_weight_before(p) + weight(p),
        _ => 0,
    };
    percent.min(100) as u8
}
