//! The per-task processing loop: walks a task through the pipeline one
//! step at a time until it reaches a terminal or paused state.

use std::sync::Arc;
use std::time::Duration;

use orch_domain::context::{Context, RecoveryMeta, StepResult};
use orch_domain::enums::{NotificationPriority, NotificationType};
use orch_domain::ids::TaskId;
use orch_domain::notification::Notification;
use orch_domain::state_token::{Phase, StateToken};
use tokio_util::sync::CancellationToken;

use orch_db::repo::traits::bump_attempts;

use crate::executor::traits::StepExecutor;
use crate::recovery::{classify_error, RecoveryDirective, StepFailure};

use super::admission::SchedulerInner;

/// Drive `task_id` forward until it reaches a terminal state, is
/// paused/waiting for input, or is cancelled. Runs as its own spawned
/// task; the caller owns releasing the admission permit afterward.
pub(super) async fn run_task(inner: Arc<SchedulerInner>, task_id: TaskId, cancellation: CancellationToken) {
    loop {
        if cancellation.is_cancelled() {
            abort_task(&inner, task_id, "cancelled", false).await;
            return;
        }

        let current = match inner.state_manager.get_current_state(task_id).await {
            Ok(state) => state,
            Err(err) => {
                tracing::error!(%task_id, error = %err, "failed to read current state");
                return;
            }
        };

        let Some(phase) = inner.transitions.next_step(current) else {
            match current {
                StateToken::PhaseCompleted(Phase::FeedbackIntegration) => {
                    complete_task(&inner, task_id).await;
                }
                StateToken::Completed | StateToken::Failed => {}
                _ => {
                    // Paused, waiting_for_input, or recovering: the
                    // loop stops here and resumes externally via the
                    // Orchestrator API.
                }
            }
            return;
        };

        if current != StateToken::Phase(phase) {
            if let Err(err) = inner
                .state_manager
                .update_state(task_id, StateToken::Phase(phase), None, serde_json::Value::Null)
                .await
            {
                tracing::error!(%task_id, step = phase.name(), error = %err, "failed to enter phase");
                return;
            }
            notify(
                &inner,
                task_id,
                NotificationType::Progress,
                None,
                format!("{} started", phase.name()),
                format!("Step `{}` is running.", phase.name()),
                progress_data(&inner, task_id, StateToken::Phase(phase)).await,
            )
            .await;
        }

        let Ok(executor) = inner.registry.resolve(phase.name()) else {
            abort_task(
                &inner,
                task_id,
                &format!("no executor registered for step `{}`", phase.name()),
                false,
            )
            .await;
            return;
        };

        if !run_step(&inner, task_id, phase, executor, cancellation.clone()).await {
            return;
        }
    }
}

/// Executes one step to success, skip, or abort, retrying per the
/// Recovery Engine's directive as needed. Returns whether the
/// processing loop should continue to the next step.
async fn run_step(
    inner: &Arc<SchedulerInner>,
    task_id: TaskId,
    phase: Phase,
    executor: Arc<dyn StepExecutor>,
    cancellation: CancellationToken,
) -> bool {
    let mut input = match build_input(inner, task_id, phase).await {
        Ok(input) => input,
        Err(err) => {
            abort_task(inner, task_id, &err, false).await;
            return false;
        }
    };

    loop {
        let context = match inner.context_store.get(task_id).await {
            Ok(ctx) => ctx,
            Err(err) => {
                tracing::error!(%task_id, error = %err, "failed to read context before step execution");
                return false;
            }
        };

        if !executor.can_execute(&context) {
            abort_task(
                inner,
                task_id,
                &format!("preconditions not met for step `{}`", phase.name()),
                false,
            )
            .await;
            return false;
        }

        let start = std::time::Instant::now();
        let timeout = inner
            .dispatch
            .step_timeouts
            .get(phase.name())
            .copied()
            .unwrap_or(inner.dispatch.default_step_timeout);
        let dispatched = dispatch_step(inner, task_id, phase, &executor, input.clone(), &context, cancellation.clone());
        let outcome = match tokio::time::timeout(timeout, dispatched).await {
            Ok(outcome) => outcome,
            Err(_) => Err(crate::executor::traits::StepError::classified(
                orch_domain::enums::ErrorType::TimeoutError,
                format!("step `{}` exceeded its soft timeout of {timeout:?}", phase.name()),
            )),
        };

        // Cancellation never interrupts an in-flight direct or queued
        // execution (spec §4.8/§5); once it returns, a cancelled task's
        // result is discarded rather than recorded, so no transition is
        // appended for work that raced a cancelTask call (S6).
        if cancellation.is_cancelled() {
            abort_task(inner, task_id, "cancelled", false).await;
            return false;
        }

        match outcome {
            Ok(mut result) => {
                inner.recovery.reset(task_id, phase.name());
                result.recovery = stamped_recovery(inner, task_id, phase, &context).await;
                return complete_step(inner, task_id, phase, result).await;
            }
            Err(step_error) => {
                let error_type = step_error
                    .error_type
                    .unwrap_or_else(|| classify_error(step_error.code.as_deref(), &step_error.message));
                let directive = inner
                    .recovery
                    .recover(
                        task_id,
                        phase.name(),
                        StepFailure {
                            error_type,
                            message: step_error.message.clone(),
                        },
                        input.clone(),
                    )
                    .await;

                match directive {
                    RecoveryDirective::Retry { delay_ms, input: new_input } => {
                        input = new_input;
                        if delay_ms > 0
                            && tokio::select! {
                                () = tokio::time::sleep(Duration::from_millis(delay_ms)) => false,
                                () = cancellation.cancelled() => true,
                            }
                        {
                            abort_task(inner, task_id, "cancelled during backoff", false).await;
                            return false;
                        }
                    }
                    RecoveryDirective::Skip => {
                        let result = StepResult {
                            success: false,
                            summary: format!("step `{}` skipped after recovery", phase.name()),
                            payload: serde_json::Value::Null,
                            timestamp: chrono::Utc::now(),
                            duration_ms: start.elapsed().as_millis() as u64,
                            recovery: stamped_recovery(inner, task_id, phase, &context).await,
                        };
                        return complete_step(inner, task_id, phase, result).await;
                    }
                    RecoveryDirective::Continue { result } => {
                        return complete_step(inner, task_id, phase, result).await;
                    }
                    RecoveryDirective::Abort {
                        reason,
                        human_intervention_required,
                    } => {
                        abort_task_at_phase(
                            inner,
                            task_id,
                            &reason,
                            human_intervention_required,
                            Some(phase),
                        )
                        .await;
                        return false;
                    }
                }
            }
        }
    }
}

/// Direct-vs-queued dispatch (spec §4.8.2): steps named in
/// `dispatch.long_running_steps` run through the job-queue contract;
/// everything else runs inline within this processor.
async fn dispatch_step(
    inner: &Arc<SchedulerInner>,
    task_id: TaskId,
    phase: Phase,
    executor: &Arc<dyn StepExecutor>,
    input: serde_json::Value,
    context: &Context,
    cancellation: CancellationToken,
) -> Result<StepResult, crate::executor::traits::StepError> {
    if inner.dispatch.long_running_steps.contains(phase.name()) {
        let request = crate::scheduler::job_queue::JobRequest {
            task_id,
            step_name: phase.name().to_string(),
            input,
            context_id: task_id,
            cancellation,
        };
        let handle = inner
            .job_queue
            .enqueue(request)
            .await
            .map_err(|err| crate::executor::traits::StepError::new(err.to_string()))?;
        handle.join().await
    } else {
        executor.execute(task_id, input, context, cancellation).await
    }
}

/// Stamps a step result's `RecoveryMeta` with the ground-truth attempt
/// count from the persisted recovery log (spec §8 invariant 4), rather
/// than trusting the in-memory retry counter `RecoveryEngine::reset`
/// clears on success. Chains `last_error_type`/`last_strategy` forward
/// from whatever was already stored for this step, if anything.
async fn stamped_recovery(
    inner: &Arc<SchedulerInner>,
    task_id: TaskId,
    phase: Phase,
    context: &Context,
) -> RecoveryMeta {
    let attempts = inner.recovery.attempt_count(task_id, phase.name()).await;
    let prior = context.step_results.get(phase.name()).map(|r| &r.recovery);
    let mut recovery = bump_attempts(prior);
    recovery.attempts = attempts;
    recovery
}

/// Records the step's result, advances `currentState` to
/// `phase_completed`, and notifies subscribers.
async fn complete_step(
    inner: &Arc<SchedulerInner>,
    task_id: TaskId,
    phase: Phase,
    result: StepResult,
) -> bool {
    if let Err(err) = inner
        .context_store
        .add_step_result(task_id, phase.name(), result)
        .await
    {
        tracing::error!(%task_id, step = phase.name(), error = %err, "failed to record step result");
        return false;
    }

    if let Err(err) = inner
        .state_manager
        .update_state(
            task_id,
            StateToken::PhaseCompleted(phase),
            None,
            serde_json::Value::Null,
        )
        .await
    {
        tracing::error!(%task_id, step = phase.name(), error = %err, "failed to commit phase completion");
        return false;
    }

    notify(
        inner,
        task_id,
        NotificationType::Progress,
        None,
        format!("{} completed", phase.name()),
        format!("Step `{}` finished successfully.", phase.name()),
        progress_data(inner, task_id, StateToken::PhaseCompleted(phase)).await,
    )
    .await;

    true
}

async fn complete_task(inner: &Arc<SchedulerInner>, task_id: TaskId) {
    if let Err(err) = inner
        .state_manager
        .update_state(task_id, StateToken::Completed, None, serde_json::Value::Null)
        .await
    {
        tracing::error!(%task_id, error = %err, "failed to commit task completion");
        return;
    }
    notify(
        inner,
        task_id,
        NotificationType::Success,
        None,
        "Task completed".to_string(),
        "All fifteen pipeline phases finished successfully.".to_string(),
        serde_json::Value::Null,
    )
    .await;
}

async fn abort_task(inner: &Arc<SchedulerInner>, task_id: TaskId, reason: &str, human_intervention_required: bool) {
    abort_task_at_phase(inner, task_id, reason, human_intervention_required, None).await;
}

/// `phase` is the step active at the time of abort; when
/// `human_intervention_required` is set, its entry state is recorded
/// as the phase `provideUserInput` resumes at, per the re-enter-at-
/// entry-state design decision.
async fn abort_task_at_phase(
    inner: &Arc<SchedulerInner>,
    task_id: TaskId,
    reason: &str,
    human_intervention_required: bool,
    phase: Option<Phase>,
) {
    let target = if human_intervention_required {
        StateToken::WaitingForInput
    } else {
        StateToken::Failed
    };

    if human_intervention_required {
        if let Some(phase) = phase {
            if let Err(err) = inner
                .context_store
                .update(
                    task_id,
                    orch_domain::context::reserved_data_keys::NEXT_STATE_AFTER_INPUT,
                    serde_json::Value::String(StateToken::Phase(phase).name()),
                )
                .await
            {
                tracing::error!(%task_id, error = %err, "failed to stash next-state-after-input");
            }
        }
    }

    if let Err(err) = inner
        .state_manager
        .update_state(task_id, target, Some(reason.to_string()), serde_json::Value::Null)
        .await
    {
        tracing::error!(%task_id, error = %err, "failed to commit task abort");
        return;
    }

    let notification_type = if human_intervention_required {
        NotificationType::ActionRequired
    } else {
        NotificationType::Error
    };
    notify(
        inner,
        task_id,
        notification_type,
        Some(NotificationPriority::High),
        "Task requires attention".to_string(),
        reason.to_string(),
        serde_json::Value::Null,
    )
    .await;
}

/// Percentage complete at `state`, per the fixed per-step weights
/// `api::progress::progress_percent` computes (an in-flight step
/// counts half its weight, spec §4.8 step 4).
async fn progress_data(inner: &Arc<SchedulerInner>, task_id: TaskId, state: StateToken) -> serde_json::Value {
    let history = inner
        .state_manager
        .get_state_history(task_id)
        .await
        .unwrap_or_default();
    let pct = crate::api::progress::progress_percent(state, &history);
    serde_json::json!({ "progressPercent": pct })
}

async fn notify(
    inner: &Arc<SchedulerInner>,
    task_id: TaskId,
    notification_type: NotificationType,
    priority_override: Option<NotificationPriority>,
    title: String,
    message: String,
    data: serde_json::Value,
) {
    let project_id = inner
        .task_repo
        .find_by_id(&task_id)
        .await
        .ok()
        .flatten()
        .and_then(|t| t.project_id);
    let notification = Notification::new(
        notification_type,
        priority_override,
        Some(task_id),
        project_id,
        title,
        message,
        data,
    );
    if let Err(err) = inner.notifications.dispatch(notification, Some(task_id), project_id).await {
        tracing::warn!(%task_id, error = %err, "notification dispatch failed");
    }
}

/// Builds the executor input: the task descriptor, the full context
/// data map, and the results of every step this phase declares as a
/// dependency.
async fn build_input(
    inner: &Arc<SchedulerInner>,
    task_id: TaskId,
    phase: Phase,
) -> Result<serde_json::Value, String> {
    let context: Context = inner
        .context_store
        .get(task_id)
        .await
        .map_err(|e| e.to_string())?;

    let dependencies = inner.registry.dependencies(phase.name());
    let mut dependency_results = serde_json::Map::new();
    for dep in &dependencies {
        let result = context
            .step_results
            .get(dep)
            .ok_or_else(|| format!("missing dependency `{dep}` for step `{}`", phase.name()))?;
        dependency_results.insert(dep.clone(), serde_json::to_value(result).map_err(|e| e.to_string())?);
    }

    Ok(serde_json::json!({
        "task": context.task,
        "context": context.data,
        "dependencies": dependency_results,
    }))
}
