//! Storage seams. The engine reads definitions and writes run records
//! through these traits; backends live outside the core.

use crate::{FlowError, NodeExecutionRecord, RunRecord, WorkflowRecord};
use async_trait::async_trait;

/// Definition storage keyed by workflow id.
#[async_trait]
pub trait WorkflowRepository: Send + Sync {
    async fn create(&self, record: WorkflowRecord) -> Result<WorkflowRecord, FlowError>;

    async fn get(&self, id: &str) -> Result<Option<WorkflowRecord>, FlowError>;

    async fn update(&self, record: WorkflowRecord) -> Result<WorkflowRecord, FlowError>;

    async fn delete(&self, id: &str) -> Result<bool, FlowError>;

    async fn list(&self) -> Result<Vec<WorkflowRecord>, FlowError>;
}

/// Run and node-execution storage, written after every transition.
#[async_trait]
pub trait ExecutionRepository: Send + Sync {
    async fn save_run(&self, run: &RunRecord) -> Result<(), FlowError>;

    async fn get_run(&self, id: &str) -> Result<Option<RunRecord>, FlowError>;

    async fn save_node_execution(&self, record: &NodeExecutionRecord) -> Result<(), FlowError>;

    /// Node executions of a run, in the order they were first saved.
    async fn node_executions(&self, execution_id: &str) -> Result<Vec<NodeExecutionRecord>, FlowError>;
}
