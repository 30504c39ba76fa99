//! Classifies step-execution errors, picks a recovery strategy, and
//! produces a next-action directive for the Scheduler.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use serde_json::Value as Json;

use orch_db::repo::traits::RecoveryRepository;
use orch_domain::context::{RecoveryMeta, StepResult};
use orch_domain::enums::{ErrorType, RecoveryStrategy};
use orch_domain::ids::TaskId;
use orch_domain::recovery::RecoveryRecord;

use super::directive::RecoveryDirective;
use super::policy::{default_policy_table, escalation_for, RecoveryPolicy};

/// A classified step-execution error, as reported by the Scheduler
/// after an executor's `execute` call fails.
#[derive(Debug, Clone)]
pub struct StepFailure {
    pub error_type: ErrorType,
    pub message: String,
}

/// The engine's retry-counter map is keyed by `(task_id, step_name)`
/// and reset on that step's first success.
pub struct RecoveryEngine {
    policy: HashMap<ErrorType, RecoveryPolicy>,
    attempts: DashMap<(TaskId, String), u32>,
    recovery_repo: Arc<dyn RecoveryRepository>,
}

impl RecoveryEngine {
    #[must_use]
    pub fn new(
        overrides: HashMap<ErrorType, RecoveryPolicy>,
        recovery_repo: Arc<dyn RecoveryRepository>,
    ) -> Self {
        let mut policy = default_policy_table();
        policy.extend(overrides);
        Self {
            policy,
            attempts: DashMap::new(),
            recovery_repo,
        }
    }

    /// Reset the retry counter for `(task_id, step_name)`, called by the
    /// Scheduler on that step's first success.
    pub fn reset(&self, task_id: TaskId, step_name: &str) {
        self.attempts.remove(&(task_id, step_name.to_string()));
    }

    /// Ground-truth attempt count for `(task_id, step_name)`, read from
    /// the persisted recovery log rather than the in-memory retry
    /// counter `reset` clears on success. Used to stamp a step result's
    /// `recovery.attempts` once the step finally succeeds or is skipped
    /// (spec §8 invariant 4).
    pub async fn attempt_count(&self, task_id: TaskId, step_name: &str) -> u32 {
        self.recovery_repo
            .attempt_count(&task_id, step_name)
            .await
            .unwrap_or(0)
    }

    /// Decide what the Scheduler should do in response to `failure`.
    pub async fn recover(
        &self,
        task_id: TaskId,
        step_name: &str,
        failure: StepFailure,
        input: Json,
    ) -> RecoveryDirective {
        let key = (task_id, step_name.to_string());
        let attempt = {
            let mut counter = self.attempts.entry(key.clone()).or_insert(0);
            *counter += 1;
            *counter
        };

        let policy = self
            .policy
            .get(&failure.error_type)
            .copied()
            .unwrap_or_else(|| {
                self.policy[&ErrorType::UnknownError]
            });

        self.record(task_id, step_name, &failure, policy.strategy, attempt)
            .await;

        if attempt > policy.max_attempts {
            return self.escalate(task_id, step_name, failure, input, attempt);
        }

        match policy.strategy {
            RecoveryStrategy::Retry => RecoveryDirective::Retry { delay_ms: 0, input },
            RecoveryStrategy::RetryWithBackoff => RecoveryDirective::Retry {
                delay_ms: policy.delay_for_attempt(attempt),
                input,
            },
            RecoveryStrategy::AlternativeApproach => {
                RecoveryDirective::Retry {
                    delay_ms: 0,
                    input: alternative_input(input),
                }
            }
            RecoveryStrategy::SkipStep => RecoveryDirective::Skip,
            RecoveryStrategy::CompensatingAction => RecoveryDirective::Continue {
                result: compensated_result(step_name, &failure, attempt),
            },
            RecoveryStrategy::HumanIntervention => RecoveryDirective::Abort {
                reason: format!("{:?}: {}", failure.error_type, failure.message),
                human_intervention_required: true,
            },
            RecoveryStrategy::Abort => RecoveryDirective::Abort {
                reason: format!("{:?}: {}", failure.error_type, failure.message),
                human_intervention_required: false,
            },
        }
    }

    fn escalate(
        &self,
        _task_id: TaskId,
        _step_name: &str,
        failure: StepFailure,
        input: Json,
        _attempt: u32,
    ) -> RecoveryDirective {
        match escalation_for(failure.error_type) {
            RecoveryStrategy::AlternativeApproach => RecoveryDirective::Retry {
                delay_ms: 0,
                input: alternative_input(input),
            },
            RecoveryStrategy::HumanIntervention => RecoveryDirective::Abort {
                reason: format!(
                    "{:?} exhausted retries: {}",
                    failure.error_type, failure.message
                ),
                human_intervention_required: true,
            },
            _ => RecoveryDirective::Abort {
                reason: format!(
                    "{:?} exhausted retries: {}",
                    failure.error_type, failure.message
                ),
                human_intervention_required: false,
            },
        }
    }

    async fn record(
        &self,
        task_id: TaskId,
        step_name: &str,
        failure: &StepFailure,
        strategy: RecoveryStrategy,
        attempt: u32,
    ) {
        let record = RecoveryRecord {
            task_id,
            step_name: step_name.to_string(),
            error_type: failure.error_type,
            error_message: failure.message.clone(),
            strategy,
            attempt_number: attempt,
            timestamp: Utc::now(),
        };
        if let Err(err) = self.recovery_repo.record(record).await {
            tracing::warn!(%task_id, step = step_name, error = %err, "failed to persist recovery record");
        }
    }
}

/// The result a `compensating_action` strategy hands back to the
/// Scheduler in place of the executor's own output: spec.md:152 treats
/// the step "as though it succeeded", so `success` is `true` and the
/// summary records what was actually compensated for.
fn compensated_result(step_name: &str, failure: &StepFailure, attempt: u32) -> StepResult {
    StepResult {
        success: true,
        summary: format!(
            "step `{step_name}` compensated after {:?}: {}",
            failure.error_type, failure.message
        ),
        payload: Json::Null,
        timestamp: Utc::now(),
        duration_ms: 0,
        recovery: RecoveryMeta {
            attempts: attempt,
            last_error_type: Some(failure.error_type),
            last_strategy: Some(RecoveryStrategy::CompensatingAction),
        },
    }
}

/// The `alternative_approach` input mutation applied once `llm_error`
/// exhausts its retries, per the S3 fixture.
fn alternative_input(input: Json) -> Json {
    let mut input = input;
    if let Json::Object(map) = &mut input {
        map.insert("simplifyRequest".to_string(), Json::Bool(true));
        map.insert("splitIntoChunks".to_string(), Json::Bool(true));
    }
    input
}

#[cfg(test)]
mod tests {
    use super::*;
    use orch_db::repo::memory::InMemoryRecoveryRepository;

    fn engine() -> RecoveryEngine {
        RecoveryEngine::new(HashMap::new(), Arc::new(InMemoryRecoveryRepository::new()))
    }

    #[tokio::test]
    async fn test_llm_error_retries_with_backoff_then_alternative() {
        let engine = engine();
        let task_id = TaskId::new();
        let mut last = None;
        for _ in 0..5 {
            let directive = engine
                .recover(
                    task_id,
                    "code_generation",
                    StepFailure {
                        error_type: ErrorType::LlmError,
                        message: "timed out".to_string(),
                    },
                    serde_json::json!({}),
                )
                .await;
            last = Some(directive);
        }
        match last.unwrap() {
            RecoveryDirective::Retry { delay_ms, .. } => assert_eq!(delay_ms, 16_000),
            other => panic!("expected retry, got {other:?}"),
        }

        let sixth = engine
            .recover(
                task_id,
                "code_generation",
                StepFailure {
                    error_type: ErrorType::LlmError,
                    message: "timed out".to_string(),
                },
                serde_json::json!({}),
            )
            .await;
        match sixth {
            RecoveryDirective::Retry { input, .. } => {
                assert_eq!(input["simplifyRequest"], serde_json::json!(true));
                assert_eq!(input["splitIntoChunks"], serde_json::json!(true));
            }
            other => panic!("expected alternative-approach retry, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_network_error_escalates_to_human_intervention() {
        let engine = engine();
        let task_id = TaskId::new();
        let mut last = None;
        for _ in 0..6 {
            last = Some(
                engine
                    .recover(
                        task_id,
                        "pr_preparation",
                        StepFailure {
                            error_type: ErrorType::NetworkError,
                            message: "connection reset".to_string(),
                        },
                        serde_json::json!({}),
                    )
                    .await,
            );
        }
        match last.unwrap() {
            RecoveryDirective::Abort {
                human_intervention_required,
                ..
            } => assert!(human_intervention_required),
            other => panic!("expected abort with human intervention, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_compensating_action_continues_with_compensated_result() {
        let mut overrides = HashMap::new();
        overrides.insert(
            ErrorType::ExecutionError,
            RecoveryPolicy {
                strategy: RecoveryStrategy::CompensatingAction,
                max_attempts: 3,
                initial_delay_ms: 0,
                max_delay_ms: 0,
                factor: 1.0,
            },
        );
        let engine = RecoveryEngine::new(overrides, Arc::new(InMemoryRecoveryRepository::new()));
        let task_id = TaskId::new();
        let directive = engine
            .recover(
                task_id,
                "code_execution",
                StepFailure {
                    error_type: ErrorType::ExecutionError,
                    message: "container exited non-zero".to_string(),
                },
                serde_json::json!({}),
            )
            .await;
        match directive {
            RecoveryDirective::Continue { result } => {
                assert!(result.success);
                assert_eq!(result.recovery.attempts, 1);
            }
            other => panic!("expected continue with compensated result, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_reset_clears_attempt_counter() {
        let engine = engine();
        let task_id = TaskId::new();
        engine
            .recover(
                task_id,
                "self_review",
                StepFailure {
                    error_type: ErrorType::ValidationError,
                    message: "bad".to_string(),
                },
                serde_json::json!({}),
            )
            .await;
        engine.reset(task_id, "self_review");
        assert!(engine
            .attempts
            .get(&(task_id, "self_review".to_string()))
            .is_none());
    }
}
