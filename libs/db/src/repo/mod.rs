//! Repository module
//!
//! Contains repository traits, per-operation error types, Postgres
//! implementations, and in-memory implementations for testing.

pub mod errors;
pub mod memory;
pub mod pg_context;
pub mod pg_notification;
pub mod pg_recovery;
pub mod pg_state;
pub mod pg_subscriber;
pub mod pg_task;
pub mod traits;

pub use errors::*;
pub use memory::*;
pub use pg_context::PgContextRepository;
pub use pg_notification::PgNotificationRepository;
pub use pg_recovery::PgRecoveryRepository;
pub use pg_state::PgStateRepository;
pub use pg_subscriber::PgSubscriberRepository;
pub use pg_task::PgTaskRepository;
pub use traits::*;
