//! Common utilities for the task orchestration subsystem
//!
//! Provides shared configuration and telemetry initialization used by
//! every binary in the workspace.

pub mod config;
pub mod telemetry;

pub use config::{ConfigError, OrchestratorConfig};
pub use telemetry::init_tracing;
