//! The job-queue contract (spec §6): a typed enqueue accepting
//! `{taskId, stepName, input, contextId}` and returning a handle whose
//! completion yields a `StepResult` or an error. The background job
//! queue itself is an external collaborator; the Scheduler consumes
//! only this trait, never a concrete broker client. `contextId` lets
//! whatever runs the job (in-process here, a separate worker in a real
//! deployment) fetch its own consistent context snapshot rather than
//! trusting one handed to it at enqueue time.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value as Json;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use orch_domain::context::StepResult;
use orch_domain::ids::TaskId;

use crate::context::ContextStore;
use crate::executor::traits::StepError;
use crate::executor::StepExecutorRegistry;

/// The enqueue payload named in spec §6.
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub task_id: TaskId,
    pub step_name: String,
    pub input: Json,
    pub context_id: TaskId,
    pub cancellation: CancellationToken,
}

#[derive(Debug, Error)]
pub enum JobQueueError {
    #[error("job queue rejected enqueue for task {0}: {1}")]
    Rejected(TaskId, String),
}

/// A handle whose completion yields the queued step's result, matching
/// the "awaited job-queue completion" suspension point of spec §5.
pub struct JobHandle {
    receiver: tokio::sync::oneshot::Receiver<Result<StepResult, StepError>>,
}

impl JobHandle {
    #[must_use]
    pub fn new(receiver: tokio::sync::oneshot::Receiver<Result<StepResult, StepError>>) -> Self {
        Self { receiver }
    }

    /// Suspends until the queued job completes. A dropped sender (the
    /// queue's worker crashed) surfaces as an execution error.
    pub async fn join(self) -> Result<StepResult, StepError> {
        self.receiver
            .await
            .unwrap_or_else(|_| Err(StepError::new("job queue worker dropped without a result")))
    }
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, request: JobRequest) -> Result<JobHandle, JobQueueError>;
}

/// An in-process stand-in for the external job queue: enqueuing spawns
/// a `tokio::task` that loads the task's context from the same
/// `ContextStore` the rest of the core uses, runs the resolved
/// executor, and reports the result back through a oneshot channel.
/// This is what a single-binary deployment wires in by default; a real
/// deployment swaps in a broker-backed `JobQueue` (e.g. an AMQP
/// client whose workers pull `contextId` from the shared store) without
/// the Scheduler changing at all, since it only ever sees this trait.
pub struct LocalJobQueue {
    registry: Arc<StepExecutorRegistry>,
    context_store: Arc<ContextStore>,
}

impl LocalJobQueue {
    #[must_use]
    pub fn new(registry: Arc<StepExecutorRegistry>, context_store: Arc<ContextStore>) -> Self {
        Self { registry, context_store }
    }
}

#[async_trait]
impl JobQueue for LocalJobQueue {
    async fn enqueue(&self, request: JobRequest) -> Result<JobHandle, JobQueueError> {
        let executor = self
            .registry
            .resolve(&request.step_name)
            .map_err(|e| JobQueueError::Rejected(request.task_id, e.to_string()))?;

        let (tx, rx) = tokio::sync::oneshot::channel();
        let context_store = self.context_store.clone();
        tokio::spawn(async move {
            let result = match context_store.get(request.context_id).await {
                Ok(context) => {
                    executor
                        .execute(request.task_id, request.input, &context, request.cancellation)
                        .await
                }
                Err(err) => Err(StepError::new(format!(
                    "job queue could not load context {}: {err}",
                    request.context_id
                ))),
            };
            let _ = tx.send(result);
        });
        Ok(JobHandle::new(rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::traits::{StepExecutor, StepMetadata};
    use orch_db::repo::memory::InMemoryContextRepository;
    use orch_domain::context::Context;
    use orch_domain::enums::{TaskPriority, TaskType};
    use orch_domain::task::Task;
    use std::collections::HashMap;

    struct EchoExecutor {
        metadata: StepMetadata,
    }

    #[async_trait]
    impl StepExecutor for EchoExecutor {
        fn metadata(&self) -> &StepMetadata {
            &self.metadata
        }

        async fn execute(
            &self,
            _task_id: TaskId,
            input: Json,
            _context: &Context,
            _cancellation: CancellationToken,
        ) -> Result<StepResult, StepError> {
            Ok(StepResult {
                success: true,
                summary: "echoed".to_string(),
                payload: input,
                timestamp: chrono::Utc::now(),
                duration_ms: 0,
                recovery: Default::default(),
            })
        }
    }

    fn sample_task() -> Task {
        Task::new(
            "t".to_string(),
            "d".to_string(),
            TaskPriority::Low,
            TaskType::Feature,
            None,
            None,
            vec![],
        )
    }

    async fn seeded_context_store(task: &Task) -> Arc<ContextStore> {
        let repo = Arc::new(InMemoryContextRepository::default());
        let store = Arc::new(ContextStore::new(repo, Arc::new(crate::validator::Validator::new(1 << 20))));
        store.initialize(task, HashMap::new()).await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_enqueue_runs_registered_executor_and_returns_result() {
        let mut registry = StepExecutorRegistry::new();
        registry.register(Arc::new(EchoExecutor {
            metadata: StepMetadata::new("code_generation", 5, vec![]),
        }));
        let task = sample_task();
        let context_store = seeded_context_store(&task).await;
        let queue = LocalJobQueue::new(Arc::new(registry), context_store);

        let handle = queue
            .enqueue(JobRequest {
                task_id: task.id,
                step_name: "code_generation".to_string(),
                input: serde_json::json!({"x": 1}),
                context_id: task.id,
                cancellation: CancellationToken::new(),
            })
            .await
            .unwrap();

        let result = handle.join().await.unwrap();
        assert!(result.success);
        assert_eq!(result.payload, serde_json::json!({"x": 1}));
    }

    #[tokio::test]
    async fn test_enqueue_unknown_step_is_rejected() {
        let registry = StepExecutorRegistry::new();
        let task = sample_task();
        let context_store = seeded_context_store(&task).await;
        let queue = LocalJobQueue::new(Arc::new(registry), context_store);
        let err = queue
            .enqueue(JobRequest {
                task_id: task.id,
                step_name: "not_a_step".to_string(),
                input: Json::Null,
                context_id: task.id,
                cancellation: CancellationToken::new(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, JobQueueError::Rejected(_, _)));
    }
}
