//! Resolves step names to their executor and enforces that every one
//! of the fifteen pipeline phases has a registered implementation
//! before the Scheduler admits any task.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use orch_domain::state_token::PHASES;

use super::traits::StepExecutor;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("no executor registered for step `{0}`")]
    NotFound(String),
    #[error("registry incomplete: missing executors for {0:?}")]
    Incomplete(Vec<String>),
}

/// Holds one boxed `StepExecutor` per step name. Registration is
/// last-write-wins, matching how the teacher's handler registry treats
/// re-registration during tests.
#[derive(Default)]
pub struct StepExecutorRegistry {
    executors: HashMap<String, Arc<dyn StepExecutor>>,
}

impl StepExecutorRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, executor: Arc<dyn StepExecutor>) {
        let name = executor.metadata().step_name.clone();
        self.executors.insert(name, executor);
    }

    #[must_use]
    pub fn get(&self, step_name: &str) -> Option<Arc<dyn StepExecutor>> {
        self.executors.get(step_name).cloned()
    }

    pub fn resolve(&self, step_name: &str) -> Result<Arc<dyn StepExecutor>, RegistryError> {
        self.get(step_name)
            .ok_or_else(|| RegistryError::NotFound(step_name.to_string()))
    }

    #[must_use]
    pub fn dependencies(&self, step_name: &str) -> Vec<String> {
        self.executors
            .get(step_name)
            .map(|e| e.metadata().dependencies.clone())
            .unwrap_or_default()
    }

    /// Fail-fast startup check: every one of the fifteen phases must
    /// resolve to an executor before the Scheduler admits any task.
    pub fn verify_complete(&self) -> Result<(), RegistryError> {
        let missing: Vec<String> = PHASES
            .iter()
            .map(|p| p.name().to_string())
            .filter(|name| !self.executors.contains_key(name))
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(RegistryError::Incomplete(missing))
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.executors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::traits::{StepError, StepMetadata};
    use async_trait::async_trait;
    use orch_domain::context::{Context, StepResult};
    use orch_domain::ids::TaskId;
    use orch_domain::state_token::Phase;
    use serde_json::Value as Json;
    use tokio_util::sync::CancellationToken;

    struct StubExecutor {
        metadata: StepMetadata,
    }

    #[async_trait]
    impl StepExecutor for StubExecutor {
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
            unimplemented!("stub")
        }
    }

    fn stub(name: &str, position: u8) -> Arc<dyn StepExecutor> {
        Arc::new(StubExecutor {
            metadata: StepMetadata::new(name, position, vec![]),
        })
    }

    #[test]
    fn test_resolve_unknown_step_errors() {
        let registry = StepExecutorRegistry::new();
        assert!(matches!(
            registry.resolve("code_generation"),
            Err(RegistryError::NotFound(_))
        ));
    }

    #[test]
    fn test_register_and_resolve() {
        let mut registry = StepExecutorRegistry::new();
        registry.register(stub("code_generation", Phase::CodeGeneration.position()));
        assert!(registry.resolve("code_generation").is_ok());
    }

    #[test]
    fn test_verify_complete_reports_missing_phases() {
        let mut registry = StepExecutorRegistry::new();
        registry.register(stub("code_generation", Phase::CodeGeneration.position()));
        let err = registry.verify_complete().unwrap_err();
        match err {
            RegistryError::Incomplete(missing) => {
                assert_eq!(missing.len(), 14);
                assert!(!missing.contains(&"code_generation".to_string()));
            }
            RegistryError::NotFound(_) => panic!("wrong variant"),
        }
    }

    #[test]
    fn test_verify_complete_passes_with_all_fifteen() {
        let mut registry = StepExecutorRegistry::new();
        for phase in PHASES {
            registry.register(stub(phase.name(), phase.position()));
        }
        assert!(registry.verify_complete().is_ok());
    }
}
