//! End-to-end scenarios exercising the full in-memory stack together
//! (admission, state transitions, recovery, notification dispatch), as
//! opposed to the inline `#[cfg(test)]` unit tests sitting next to each
//! component. Grounded in `globalbusinessadvisors-llm-orchestrator`'s
//! `tests/disaster_recovery_tests.rs`, the one repo in the retrieval
//! pack that exercises an orchestration engine through a top-level
//! `tests/` directory rather than purely inline modules.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value as Json;
use tokio_util::sync::CancellationToken;

use orch_core::api::OrchestratorApi;
use orch_core::context::ContextStore;
use orch_core::executor::traits::{StepError, StepExecutor, StepMetadata};
use orch_core::executor::StepExecutorRegistry;
use orch_core::notification::{NotificationChannel, NotificationDispatcher, SystemLogChannel};
use orch_core::recovery::RecoveryEngine;
use orch_core::scheduler::{DispatchConfig, ExecuteOutcome, LocalJobQueue, Scheduler};
use orch_core::state::StateManager;
use orch_core::validator::Validator;
use orch_db::repo::memory::{
    InMemoryContextRepository, InMemoryNotificationRepository, InMemoryRecoveryRepository,
    InMemoryStateRepository, InMemorySubscriberRepository, InMemoryTaskRepository,
};
use orch_db::repo::traits::NewTask;
use orch_domain::context::{reserved_data_keys, Context, StepResult};
use orch_domain::enums::{ErrorType, NotificationChannelKind, NotificationType, TaskPriority, TaskType};
use orch_domain::ids::TaskId;
use orch_domain::state_token::{Phase, StateToken, PHASES};

const MAX_METADATA_BYTES: usize = 1 << 20;
const POLL_INTERVAL: Duration = Duration::from_millis(20);

// ---------------------------------------------------------------------------
// Test-double Step Executors
// ---------------------------------------------------------------------------

/// Succeeds on every call; stands in for the phases not under test in a
/// given scenario.
struct SucceedExecutor {
    metadata: StepMetadata,
}

impl SucceedExecutor {
    fn new(phase: Phase) -> Self {
        Self {
            metadata: StepMetadata::new(phase.name(), phase.position(), vec![]),
        }
    }
}

#[async_trait]
impl StepExecutor for SucceedExecutor {
    fn metadata(&self) -> &StepMetadata {
        &self.metadata
    }

    async fn execute(
        &self,
        _task_id: TaskId,
        _input: Json,
        _context: &Context,
        _cancellation: CancellationToken,
    ) -> Result<StepResult, StepError> {
        Ok(StepResult {
            success: true,
            summary: format!("{} ok", self.metadata.step_name),
            payload: Json::Null,
            timestamp: chrono::Utc::now(),
            duration_ms: 1,
            recovery: Default::default(),
        })
    }
}

/// Fails `failures` times with `error_type`, then succeeds — unless
/// `userInput.<step_name>` is already present in the context, which
/// short-circuits straight to success (the re-entry path `S4` exercises
/// after `provideUserInput`). Also records the last `input` it was
/// called with, so a test can assert on `alternative_approach`'s
/// `simplifyRequest`/`splitIntoChunks` injection.
struct FlakyExecutor {
    metadata: StepMetadata,
    failures_remaining: AtomicU32,
    error_type: ErrorType,
    last_input: Mutex<Option<Json>>,
}

impl FlakyExecutor {
    fn new(phase: Phase, failures: u32, error_type: ErrorType) -> Self {
        Self {
            metadata: StepMetadata::new(phase.name(), phase.position(), vec![]),
            failures_remaining: AtomicU32::new(failures),
            error_type,
            last_input: Mutex::new(None),
        }
    }

    fn last_input(&self) -> Option<Json> {
        self.last_input.lock().expect("mutex poisoned").clone()
    }
}

#[async_trait]
impl StepExecutor for FlakyExecutor {
    fn metadata(&self) -> &StepMetadata {
        &self.metadata
    }

    async fn execute(
        &self,
        _task_id: TaskId,
        input: Json,
        context: &Context,
        _cancellation: CancellationToken,
    ) -> Result<StepResult, StepError> {
        *self.last_input.lock().expect("mutex poisoned") = Some(input);

        let human_approved = context
            .data
            .get(reserved_data_keys::USER_INPUT)
            .and_then(|v| v.get(&self.metadata.step_name))
            .is_some();

        if human_approved || self.failures_remaining.load(Ordering::SeqCst) == 0 {
            return Ok(StepResult {
                success: true,
                summary: format!("{} ok after retries", self.metadata.step_name),
                payload: Json::Null,
                timestamp: chrono::Utc::now(),
                duration_ms: 1,
                recovery: Default::default(),
            });
        }

        self.failures_remaining.fetch_sub(1, Ordering::SeqCst);
        Err(StepError::classified(
            self.error_type,
            format!("{} failed", self.metadata.step_name),
        ))
    }
}

/// Never returns, regardless of cancellation. Stands in for a step
/// that is genuinely still admitted/running, so a concurrency-limit
/// observation has something to observe against.
struct HangExecutor {
    metadata: StepMetadata,
}

#[async_trait]
impl StepExecutor for HangExecutor {
    fn metadata(&self) -> &StepMetadata {
        &self.metadata
    }

    async fn execute(
        &self,
        _task_id: TaskId,
        _input: Json,
        _context: &Context,
        _cancellation: CancellationToken,
    ) -> Result<StepResult, StepError> {
        std::future::pending::<()>().await;
        unreachable!("pending future never resolves")
    }
}

/// Blocks until cancelled, then returns success anyway — simulating a
/// job-queue worker whose result arrives after `cancelTask` already
/// fired, which the Scheduler must discard rather than record (S6).
struct CancelAwareHangExecutor {
    metadata: StepMetadata,
}

#[async_trait]
impl StepExecutor for CancelAwareHangExecutor {
    fn metadata(&self) -> &StepMetadata {
        &self.metadata
    }

    async fn execute(
        &self,
        _task_id: TaskId,
        _input: Json,
        _context: &Context,
        cancellation: CancellationToken,
    ) -> Result<StepResult, StepError> {
        cancellation.cancelled().await;
        Ok(StepResult {
            success: true,
            summary: "late result after cancellation".to_string(),
            payload: Json::Null,
            timestamp: chrono::Utc::now(),
            duration_ms: 1,
            recovery: Default::default(),
        })
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

struct Harness {
    api: OrchestratorApi,
    state_repo: Arc<InMemoryStateRepository>,
    notification_repo: Arc<InMemoryNotificationRepository>,
}

fn default_dispatch() -> DispatchConfig {
    DispatchConfig {
        long_running_steps: Default::default(),
        step_timeouts: Default::default(),
        default_step_timeout: Duration::from_secs(120),
    }
}

fn build_harness(registry: StepExecutorRegistry, max_concurrent: usize, queue_capacity: usize, dispatch: DispatchConfig) -> Harness {
    let task_repo = Arc::new(InMemoryTaskRepository::default());
    let context_repo = Arc::new(InMemoryContextRepository::default());
    let state_repo = Arc::new(InMemoryStateRepository::default());
    let recovery_repo = Arc::new(InMemoryRecoveryRepository::default());
    let notification_repo = Arc::new(InMemoryNotificationRepository::default());
    let subscriber_repo = Arc::new(InMemorySubscriberRepository::default());

    let validator = Arc::new(Validator::new(MAX_METADATA_BYTES));
    let context_store = Arc::new(ContextStore::new(context_repo.clone(), validator.clone()));
    let state_manager = Arc::new(StateManager::new(
        state_repo.clone(),
        context_repo,
        task_repo.clone(),
        validator,
    ));
    let recovery = Arc::new(RecoveryEngine::new(HashMap::new(), recovery_repo));

    let mut channels: HashMap<NotificationChannelKind, Arc<dyn NotificationChannel>> = HashMap::new();
    channels.insert(
        NotificationChannelKind::SystemLog,
        Arc::new(SystemLogChannel::new(notification_repo.clone())),
    );
    let notifications = Arc::new(NotificationDispatcher::new(
        channels,
        subscriber_repo,
        notification_repo.clone(),
        Default::default(),
    ));

    let registry = Arc::new(registry);
    let job_queue = Arc::new(LocalJobQueue::new(registry.clone(), context_store.clone()));
    let scheduler = Arc::new(Scheduler::new(
        max_concurrent,
        queue_capacity,
        state_manager.clone(),
        context_store.clone(),
        registry,
        recovery,
        notifications.clone(),
        task_repo.clone(),
        job_queue,
        dispatch,
    ));

    let api = OrchestratorApi::new(task_repo, context_store, state_manager, scheduler, notifications);
    Harness {
        api,
        state_repo,
        notification_repo,
    }
}

async fn new_task(h: &Harness, title: &str) -> TaskId {
    let task = h
        .api
        .create_task(NewTask {
            title: title.to_string(),
            description: "d".to_string(),
            priority: TaskPriority::Medium,
            task_type: TaskType::Feature,
            project_id: None,
            assignee: None,
            tags: vec![],
        })
        .await
        .unwrap();
    h.state_repo.seed(task.id, StateToken::Initialized);
    h.api.initialize_task(task.id, HashMap::new()).await.unwrap();
    task.id
}

/// Polls `get_status` until `pred` holds or `max_iters` polls elapse.
/// Tests run with `start_paused = true`, so each poll's sleep costs no
/// real wall-clock time; it only gives the runtime a point to drive
/// the spawned processing loop (and its own backoff sleeps) forward.
async fn wait_for(h: &Harness, task_id: TaskId, max_iters: u32, pred: impl Fn(StateToken) -> bool) -> StateToken {
    for _ in 0..max_iters {
        let status = h.api.get_status(task_id).await.unwrap();
        if pred(status.state) {
            return status.state;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
    panic!("timed out waiting for task {task_id} to reach the expected state");
}

fn all_succeed_registry() -> StepExecutorRegistry {
    let mut registry = StepExecutorRegistry::new();
    for phase in PHASES {
        registry.register(Arc::new(SucceedExecutor::new(phase)));
    }
    registry
}

// ---------------------------------------------------------------------------
// S1 — happy path: all fifteen phases succeed
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn s1_happy_path_completes_all_fifteen_phases() {
    let registry = all_succeed_registry();
    registry.verify_complete().unwrap();
    let h = build_harness(registry, 5, 5, default_dispatch());

    let task_id = new_task(&h, "S1").await;
    assert_eq!(h.api.execute_task(task_id).await.unwrap(), ExecuteOutcome::Started);

    let state = wait_for(&h, task_id, 500, StateToken::is_terminal).await;
    assert_eq!(state, StateToken::Completed);

    let status = h.api.get_status(task_id).await.unwrap();
    assert_eq!(status.progress_percent, 100);
    // Every phase contributes an entry + completed transition: thirty
    // in total, plus the final `completed` transition.
    assert_eq!(status.history.len(), 31);
    assert_eq!(status.step_result_summaries.len(), 15);

    let mut last = 0u8;
    for record in &status.history {
        let pct = orch_core::api::progress::progress_percent(record.to_state, &[]);
        assert!(pct >= last, "progress regressed at {:?}", record.to_state);
        last = pct;
    }
}

// ---------------------------------------------------------------------------
// S2 — retry with backoff: three llm_errors then success
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn s2_retries_with_backoff_then_succeeds() {
    let mut registry = all_succeed_registry();
    registry.register(Arc::new(FlakyExecutor::new(
        Phase::CodeGeneration,
        3,
        ErrorType::LlmError,
    )));
    registry.verify_complete().unwrap();
    let h = build_harness(registry, 5, 5, default_dispatch());

    let task_id = new_task(&h, "S2").await;
    h.api.execute_task(task_id).await.unwrap();

    let state = wait_for(&h, task_id, 3000, StateToken::is_terminal).await;
    assert_eq!(state, StateToken::Completed);

    let status = h.api.get_status(task_id).await.unwrap();
    let result = status.step_result_summaries.get("code_generation").unwrap();
    assert_eq!(result, "code_generation ok after retries");
}

// ---------------------------------------------------------------------------
// S3 — alternative approach after exhaustion
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn s3_exhausts_retries_then_applies_alternative_approach() {
    let mut registry = all_succeed_registry();
    let flaky = Arc::new(FlakyExecutor::new(Phase::CodeGeneration, 6, ErrorType::LlmError));
    registry.register(flaky.clone());
    registry.verify_complete().unwrap();
    let h = build_harness(registry, 5, 5, default_dispatch());

    let task_id = new_task(&h, "S3").await;
    h.api.execute_task(task_id).await.unwrap();

    let state = wait_for(&h, task_id, 3000, StateToken::is_terminal).await;
    assert_eq!(state, StateToken::Completed);

    // The call following max_attempts=5's exhaustion must have carried
    // the alternative-approach flags.
    let last_input = flaky.last_input().expect("executor was called");
    assert_eq!(last_input.get("simplifyRequest"), Some(&Json::Bool(true)));
    assert_eq!(last_input.get("splitIntoChunks"), Some(&Json::Bool(true)));
}

// ---------------------------------------------------------------------------
// S4 — human intervention: persistent network_error escalates, then
// provideUserInput resumes the task
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn s4_escalates_to_human_intervention_then_resumes() {
    let mut registry = all_succeed_registry();
    let flaky = Arc::new(FlakyExecutor::new(
        Phase::PrPreparation,
        999,
        ErrorType::NetworkError,
    ));
    registry.register(flaky);
    registry.verify_complete().unwrap();
    let h = build_harness(registry, 5, 5, default_dispatch());

    let task_id = new_task(&h, "S4").await;
    h.api.execute_task(task_id).await.unwrap();

    let state = wait_for(&h, task_id, 3000, |s| s == StateToken::WaitingForInput).await;
    assert_eq!(state, StateToken::WaitingForInput);

    let notifications = h
        .notification_repo
        .list_for_task(&task_id, orch_db::pagination::Pagination::default())
        .await
        .unwrap();
    assert!(notifications
        .items
        .iter()
        .any(|n| n.notification_type == NotificationType::ActionRequired));

    h.api
        .provide_user_input(task_id, "pr_preparation", serde_json::json!({"approved": true}))
        .await
        .unwrap();

    let state = wait_for(&h, task_id, 3000, StateToken::is_terminal).await;
    assert_eq!(state, StateToken::Completed);
}

// ---------------------------------------------------------------------------
// S5 — admission queueing: a third task waits behind two running ones
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn s5_third_task_queues_behind_the_concurrency_limit() {
    let mut registry = all_succeed_registry();
    registry.register(Arc::new(HangExecutor {
        metadata: StepMetadata::new(
            Phase::CodeGeneration.name(),
            Phase::CodeGeneration.position(),
            vec![],
        ),
    }));
    registry.verify_complete().unwrap();
    let h = build_harness(registry, 2, 2, default_dispatch());

    let t1 = new_task(&h, "S5-T1").await;
    let t2 = new_task(&h, "S5-T2").await;
    let t3 = new_task(&h, "S5-T3").await;

    assert_eq!(h.api.execute_task(t1).await.unwrap(), ExecuteOutcome::Started);
    assert_eq!(h.api.execute_task(t2).await.unwrap(), ExecuteOutcome::Started);
    assert_eq!(h.api.execute_task(t3).await.unwrap(), ExecuteOutcome::Queued);

    // T1/T2 stay stuck in code_generation, so T3 never gets admitted.
    wait_for(&h, t1, 100, |s| s == StateToken::Phase(Phase::CodeGeneration)).await;
    wait_for(&h, t2, 100, |s| s == StateToken::Phase(Phase::CodeGeneration)).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    let status = h.api.get_status(t3).await.unwrap();
    assert_eq!(status.state, StateToken::Initialized);
}

// ---------------------------------------------------------------------------
// S6 — cancellation discards an in-flight result
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn s6_cancel_during_execution_discards_the_result() {
    let mut registry = all_succeed_registry();
    registry.register(Arc::new(CancelAwareHangExecutor {
        metadata: StepMetadata::new(
            Phase::CodeExecution.name(),
            Phase::CodeExecution.position(),
            vec![],
        ),
    }));
    registry.verify_complete().unwrap();
    let h = build_harness(registry, 5, 5, default_dispatch());

    let task_id = new_task(&h, "S6").await;
    h.api.execute_task(task_id).await.unwrap();

    wait_for(&h, task_id, 500, |s| s == StateToken::Phase(Phase::CodeExecution)).await;

    h.api.cancel_task(task_id).await.unwrap();
    let state = wait_for(&h, task_id, 500, StateToken::is_terminal).await;
    assert_eq!(state, StateToken::Failed);

    let status = h.api.get_status(task_id).await.unwrap();
    assert!(
        !status
            .history
            .iter()
            .any(|r| r.to_state == StateToken::PhaseCompleted(Phase::CodeExecution)),
        "no phase_completed transition should be recorded for a cancelled step"
    );
}
