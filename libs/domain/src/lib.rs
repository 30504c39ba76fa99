//! Orchestrator Domain - Core domain models and types
//!
//! This crate contains all domain models, enums, and core types shared
//! across the task orchestration subsystem: the task descriptor, the
//! state token enumeration, the per-task context record, and the
//! append-only recovery and notification records.

pub mod context;
pub mod enums;
pub mod ids;
pub mod notification;
pub mod recovery;
pub mod state_token;
pub mod task;

pub use context::*;
pub use enums::*;
pub use ids::*;
pub use notification::*;
pub use recovery::*;
pub use state_token::*;
pub use task::*;
