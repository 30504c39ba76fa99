//! Context Store (C2): the durable per-task map of inputs, step
//! results, history, and current state.

pub mod store;

pub use store::ContextStore;
