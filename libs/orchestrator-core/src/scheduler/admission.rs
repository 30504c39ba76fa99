//! Admission control: a `Semaphore` sized to `max_concurrent_tasks`
//! backs direct dispatch; overflow waits in a capped FIFO queue.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::{Mutex, Semaphore};
use tokio_util::sync::CancellationToken;

use orch_db::repo::traits::TaskRepository;
use orch_domain::ids::TaskId;

use crate::context::ContextStore;
use crate::error::OrchestratorError;
use crate::executor::StepExecutorRegistry;
use crate::notification::NotificationDispatcher;
use crate::recovery::RecoveryEngine;
use crate::state::StateManager;
use crate::transition::TransitionManager;

use super::job_queue::JobQueue;
use super::processor::run_task;

/// The step names dispatched through the job-queue contract (§4.8.2)
/// and the soft per-step execution timeout (§5), both sourced from
/// `OrchestratorConfig`.
#[derive(Debug, Clone, Default)]
pub struct DispatchConfig {
    pub long_running_steps: HashSet<String>,
    pub step_timeouts: HashMap<String, Duration>,
    pub default_step_timeout: Duration,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AdmissionError {
    #[error("waiting queue is at capacity ({0})")]
    QueueFull(usize),
}

/// Whether `submit` dispatched the task immediately or queued it
/// behind the admission limit, matching `executeTask`'s `{status}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecuteOutcome {
    Started,
    Queued,
}

/// Shared state behind every spawned per-task processing loop.
pub(super) struct SchedulerInner {
    pub semaphore: Semaphore,
    pub queue: Mutex<VecDeque<TaskId>>,
    pub queue_capacity: usize,
    pub cancellations: DashMap<TaskId, CancellationToken>,
    pub state_manager: Arc<StateManager>,
    pub context_store: Arc<ContextStore>,
    pub registry: Arc<StepExecutorRegistry>,
    pub recovery: Arc<RecoveryEngine>,
    pub notifications: Arc<NotificationDispatcher>,
    pub transitions: TransitionManager,
    pub task_repo: Arc<dyn TaskRepository>,
    pub job_queue: Arc<dyn JobQueue>,
    pub dispatch: DispatchConfig,
}

/// Admits tasks up to `max_concurrent_tasks` concurrently, queuing the
/// rest. Each admitted task runs its own `tokio::task::JoinHandle`
/// driving it through the fifteen-phase pipeline.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

impl Scheduler {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        max_concurrent_tasks: usize,
        queue_capacity: usize,
        state_manager: Arc<StateManager>,
        context_store: Arc<ContextStore>,
        registry: Arc<StepExecutorRegistry>,
        recovery: Arc<RecoveryEngine>,
        notifications: Arc<NotificationDispatcher>,
        task_repo: Arc<dyn TaskRepository>,
        job_queue: Arc<dyn JobQueue>,
        dispatch: DispatchConfig,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                semaphore: Semaphore::new(max_concurrent_tasks),
                queue: Mutex::new(VecDeque::new()),
                queue_capacity,
                cancellations: DashMap::new(),
                state_manager,
                context_store,
                registry,
                recovery,
                notifications,
                transitions: TransitionManager::new(),
                task_repo,
                job_queue,
                dispatch,
            }),
        }
    }

    /// Admit `task_id` directly if a permit is free, otherwise enqueue
    /// it (failing with `ResourceError` once the queue is also full).
    pub async fn submit(&self, task_id: TaskId) -> Result<ExecuteOutcome, OrchestratorError> {
        if let Ok(permit) = self.inner.semaphore.clone().try_acquire_owned() {
            self.spawn(task_id, permit);
            return Ok(ExecuteOutcome::Started);
        }

        let mut queue = self.inner.queue.lock().await;
        if queue.len() >= self.inner.queue_capacity {
            return Err(OrchestratorError::ResourceError(format!(
                "waiting queue is at capacity ({})",
                self.inner.queue_capacity
            )));
        }
        queue.push_back(task_id);
        Ok(ExecuteOutcome::Queued)
    }

    /// Cooperatively cancels the task's in-flight step, if any. The
    /// processing loop observes the token and transitions the task to
    /// `failed` rather than stopping mid-write.
    pub fn cancel(&self, task_id: TaskId) {
        if let Some(token) = self.inner.cancellations.get(&task_id) {
            token.cancel();
        }
    }

    /// Whether `task_id` currently has a live processing loop (running
    /// or in its recovery backoff sleep).
    #[must_use]
    pub fn is_active(&self, task_id: TaskId) -> bool {
        self.inner.cancellations.contains_key(&task_id)
    }

    fn spawn(&self, task_id: TaskId, permit: tokio::sync::OwnedSemaphorePermit) {
        let inner = self.inner.clone();
        let token = CancellationToken::new();
        inner.cancellations.insert(task_id, token.clone());
        tokio::spawn(async move {
            run_task(inner.clone(), task_id, token).await;
            drop(permit);
            inner.cancellations.remove(&task_id);
            Self::admit_next(inner).await;
        });
    }

    async fn admit_next(inner: Arc<SchedulerInner>) {
        let next = {
            let mut queue = inner.queue.lock().await;
            queue.pop_front()
        };
        let Some(task_id) = next else { return };
        let Ok(permit) = inner.semaphore.clone().try_acquire_owned() else {
            // Lost a race with another release; put it back.
            inner.queue.lock().await.push_front(task_id);
            return;
        };
        let token = CancellationToken::new();
        inner.cancellations.insert(task_id, token.clone());
        tokio::spawn(async move {
            run_task(inner.clone(), task_id, token).await;
            drop(permit);
            inner.cancellations.remove(&task_id);
            Box::pin(Scheduler::admit_next(inner)).await;
        });
    }
}
