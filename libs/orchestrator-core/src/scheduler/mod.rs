//! Task Scheduler (C8): admission control, per-task processing loops,
//! and the step-input construction/dispatch rules of spec §4.8.

pub mod admission;
pub mod job_queue;
pub mod processor;

pub use admission::{AdmissionError, DispatchConfig, ExecuteOutcome, Scheduler};
pub use job_queue::{JobHandle, JobQueue, JobQueueError, JobRequest, LocalJobQueue};
