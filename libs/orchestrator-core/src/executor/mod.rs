//! Step Executor Registry & contract (C7): resolves a step name to an
//! executor implementing the fixed `{canExecute, execute, rollback,
//! estimateResources, metadata}` capability set. Core ships no executor
//! implementations; all executors are external collaborators.

pub mod registry;
pub mod traits;

pub use registry::{RegistryError, StepExecutorRegistry};
pub use traits::{CpuBand, ResourceEstimate, StepError, StepExecutor, StepMetadata};
