//! The default recovery policy table and its per-error-type overrides.

use std::collections::HashMap;

use orch_domain::enums::{ErrorType, RecoveryStrategy};

/// One row of the policy table: the strategy chosen for an error type
/// and the backoff parameters that govern retries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecoveryPolicy {
    pub strategy: RecoveryStrategy,
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub factor: f64,
}

impl RecoveryPolicy {
    const fn retry(max_attempts: u32) -> Self {
        Self {
            strategy: RecoveryStrategy::Retry,
            max_attempts,
            initial_delay_ms: 0,
            max_delay_ms: 0,
            factor: 1.0,
        }
    }

    const fn retry_with_backoff(
        max_attempts: u32,
        initial_delay_ms: u64,
        max_delay_ms: u64,
        factor: f64,
    ) -> Self {
        Self {
            strategy: RecoveryStrategy::RetryWithBackoff,
            max_attempts,
            initial_delay_ms,
            max_delay_ms,
            factor,
        }
    }

    const fn immediate(strategy: RecoveryStrategy) -> Self {
        Self {
            strategy,
            max_attempts: 0,
            initial_delay_ms: 0,
            max_delay_ms: 0,
            factor: 1.0,
        }
    }

    /// The delay to wait after the attempt numbered `attempt` (1-based)
    /// has just failed, before making the next attempt, per the
    /// closed-form `min(maxDelay, initialDelay * factor^(attempt - 1))`.
    /// Exposed independent of the `backoff` crate's own jitter so exact
    /// millisecond fixtures stay testable.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> u64 {
        if self.strategy != RecoveryStrategy::RetryWithBackoff {
            return 0;
        }
        let exponent = attempt.saturating_sub(1) as i32;
        let scaled = (self.initial_delay_ms as f64) * self.factor.powi(exponent);
        scaled.min(self.max_delay_ms as f64) as u64
    }
}

/// The error-type to escalation-strategy mapping applied once an error
/// type's `max_attempts` is exhausted.
#[must_use]
pub fn escalation_for(error_type: ErrorType) -> RecoveryStrategy {
    match error_type {
        ErrorType::LlmError => RecoveryStrategy::AlternativeApproach,
        ErrorType::NetworkError | ErrorType::DbError | ErrorType::GitError => {
            RecoveryStrategy::HumanIntervention
        }
        _ => RecoveryStrategy::Abort,
    }
}

/// Builds the default policy table from spec, keyed by error type.
#[must_use]
pub fn default_policy_table() -> HashMap<ErrorType, RecoveryPolicy> {
    let mut table = HashMap::new();
    table.insert(ErrorType::ValidationError, RecoveryPolicy::retry(3));
    table.insert(ErrorType::SchemaError, RecoveryPolicy::retry(3));
    table.insert(
        ErrorType::LlmError,
        RecoveryPolicy::retry_with_backoff(5, 1000, 60_000, 2.0),
    );
    table.insert(
        ErrorType::DbError,
        RecoveryPolicy::retry_with_backoff(3, 1000, 15_000, 2.0),
    );
    table.insert(ErrorType::GitError, RecoveryPolicy::retry(3));
    table.insert(
        ErrorType::NetworkError,
        RecoveryPolicy::retry_with_backoff(5, 1000, 30_000, 2.0),
    );
    table.insert(ErrorType::TimeoutError, RecoveryPolicy::retry(2));
    table.insert(
        ErrorType::ExecutionError,
        RecoveryPolicy::immediate(RecoveryStrategy::AlternativeApproach),
    );
    table.insert(
        ErrorType::ResourceError,
        RecoveryPolicy::retry_with_backoff(3, 5000, 60_000, 2.0),
    );
    table.insert(ErrorType::OrchestrationError, RecoveryPolicy::retry(3));
    table.insert(
        ErrorType::UnknownError,
        RecoveryPolicy::immediate(RecoveryStrategy::HumanIntervention),
    );
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_llm_error_backoff_delays_match_fixture() {
        let table = default_policy_table();
        let policy = table[&ErrorType::LlmError];
        assert_eq!(policy.delay_for_attempt(1), 1000);
        assert_eq!(policy.delay_for_attempt(2), 2000);
        assert_eq!(policy.delay_for_attempt(3), 4000);
    }

    #[test]
    fn test_delay_caps_at_max() {
        let table = default_policy_table();
        let policy = table[&ErrorType::LlmError];
        assert_eq!(policy.delay_for_attempt(10), 60_000);
    }

    #[test]
    fn test_plain_retry_has_no_delay() {
        let table = default_policy_table();
        let policy = table[&ErrorType::ValidationError];
        assert_eq!(policy.delay_for_attempt(2), 0);
    }

    #[test]
    fn test_escalation_table() {
        assert_eq!(
            escalation_for(ErrorType::LlmError),
            RecoveryStrategy::AlternativeApproach
        );
        assert_eq!(
            escalation_for(ErrorType::NetworkError),
            RecoveryStrategy::HumanIntervention
        );
        assert_eq!(
            escalation_for(ErrorType::DbError),
            RecoveryStrategy::HumanIntervention
        );
        assert_eq!(
            escalation_for(ErrorType::GitError),
            RecoveryStrategy::HumanIntervention
        );
        assert_eq!(
            escalation_for(ErrorType::ValidationError),
            RecoveryStrategy::Abort
        );
    }
}
