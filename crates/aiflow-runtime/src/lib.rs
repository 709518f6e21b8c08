//! Workflow execution runtime
//!
//! Orders a definition's nodes, runs them one at a time against a per-run
//! execution context, and exposes batch, streaming and callback entry
//! points plus run queries and cancellation.

mod config;
mod executor;
mod memory;
mod runtime;

pub use config::RuntimeConfig;
pub use executor::{ExecutionResult, WorkflowExecutor};
pub use memory::{InMemoryExecutionRepository, InMemoryWorkflowRepository};
pub use runtime::FlowRuntime;
