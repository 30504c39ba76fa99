//! The value the Recovery Engine returns, instructing the Scheduler
//! what to do next.

use serde_json::Value as Json;

use orch_domain::context::StepResult;

/// What the Scheduler should do in response to a step failure.
#[derive(Debug, Clone)]
pub enum RecoveryDirective {
    /// Sleep for `delay_ms` then re-execute the step, optionally with a
    /// modified `input` (set by `alternative_approach`).
    Retry { delay_ms: u64, input: Json },
    /// Record the step as failed-but-skipped; the Transition Manager
    /// advances past it.
    Skip,
    /// Treat the step as though it succeeded, with a compensated result.
    Continue { result: StepResult },
    /// Transition the task to `failed` (or `waiting_for_input` when
    /// `human_intervention_required` is set).
    Abort {
        reason: String,
        human_intervention_required: bool,
    },
}
