//! Recovery Engine (C5): classifies step-execution errors, picks a
//! strategy, and produces the Scheduler's next-action directive.

pub mod classify;
pub mod directive;
pub mod engine;
pub mod policy;

pub use classify::classify_error;
pub use directive::RecoveryDirective;
pub use engine::{RecoveryEngine, StepFailure};
pub use policy::{default_policy_table, escalation_for, RecoveryPolicy};
