//! The Step Executor contract: one implementation per pipeline phase,
//! supplied by an external collaborator and resolved by name through
//! the registry.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value as Json;
use tokio_util::sync::CancellationToken;

use orch_domain::context::{Context, StepResult};
use orch_domain::enums::ErrorType;
use orch_domain::ids::TaskId;

/// A step-execution failure as reported by an executor. `error_type`
/// is `None` when the executor doesn't self-classify; the Recovery
/// Engine then falls back to substring matching on `code`/`message`.
#[derive(Debug, Clone, thiserror::Error)]
#[error("step failed: {message}")]
pub struct StepError {
    pub error_type: Option<ErrorType>,
    pub code: Option<String>,
    pub message: String,
}

impl StepError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error_type: None,
            code: None,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn classified(error_type: ErrorType, message: impl Into<String>) -> Self {
        Self {
            error_type: Some(error_type),
            code: None,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

/// Coarse band used for advisory CPU-cost hints; not a scheduling
/// guarantee.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CpuBand {
    #[default]
    Low,
    Medium,
    High,
}

/// Advisory hint returned by `estimate_resources`. Never consulted by
/// the admission limiter; purely informational.
#[derive(Debug, Clone, Default)]
pub struct ResourceEstimate {
    pub time: Option<Duration>,
    pub memory_mb: Option<u32>,
    pub cpu_band: CpuBand,
    pub tokens: Option<u32>,
}

/// Static metadata an executor declares about itself: its step name,
/// 1-based ordering position in the fifteen-phase pipeline, and the
/// set of step names whose successful result it requires as input.
#[derive(Debug, Clone)]
pub struct StepMetadata {
    pub step_name: String,
    pub ordering_position: u8,
    pub dependencies: Vec<String>,
}

impl StepMetadata {
    #[must_use]
    pub fn new(step_name: impl Into<String>, ordering_position: u8, dependencies: Vec<&str>) -> Self {
        Self {
            step_name: step_name.into(),
            ordering_position,
            dependencies: dependencies.into_iter().map(str::to_string).collect(),
        }
    }
}

/// The fixed capability set every pipeline-phase executor implements.
/// Core ships no implementations of this trait; it is the plug-in
/// surface external collaborators (code generators, test runners, VCS
/// integrations, ...) implement.
#[async_trait]
pub trait StepExecutor: Send + Sync {
    /// Static declaration of name, ordering, and dependencies.
    fn metadata(&self) -> &StepMetadata;

    /// Cheap precondition check; default accepts unconditionally.
    fn can_execute(&self, _context: &Context) -> bool {
        true
    }

    /// Perform the step's work. Must be safe to replay with the same
    /// `recovery.attempts` counter on the prior result, since the
    /// Scheduler may re-invoke this after a retry directive.
    async fn execute(
        &self,
        task_id: TaskId,
        input: Json,
        context: &Context,
        cancellation: CancellationToken,
    ) -> Result<StepResult, StepError>;

    /// Undo observable side effects. Default is a no-op; most steps
    /// have nothing to roll back.
    async fn rollback(&self, _context: &Context) -> Result<(), StepError> {
        Ok(())
    }

    /// Optional advisory resource hint; the Scheduler never blocks on
    /// this.
    fn estimate_resources(&self, _context: &Context) -> ResourceEstimate {
        ResourceEstimate::default()
    }
}
