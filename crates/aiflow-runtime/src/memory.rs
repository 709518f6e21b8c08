//! In-memory repositories, used by the server and CLI when no external
//! store is wired in, and by tests.

use aiflow_core::{
    ExecutionRepository, FlowError, NodeExecutionRecord, RunRecord, WorkflowError, WorkflowRecord,
    WorkflowRepository,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Clone, Default)]
pub struct InMemoryWorkflowRepository {
    workflows: Arc<RwLock<HashMap<String, WorkflowRecord>>>,
}

impl InMemoryWorkflowRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkflowRepository for InMemoryWorkflowRepository {
    async fn create(&self, record: WorkflowRecord) -> Result<WorkflowRecord, FlowError> {
        let mut workflows = self.workflows.write().await;
        if workflows.contains_key(&record.id) {
            return Err(FlowError::Repository(format!("workflow {} already exists", record.id)));
        }
        workflows.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn get(&self, id: &str) -> Result<Option<WorkflowRecord>, FlowError> {
        Ok(self.workflows.read().await.get(id).cloned())
    }

    async fn update(&self, record: WorkflowRecord) -> Result<WorkflowRecord, FlowError> {
        let mut workflows = self.workflows.write().await;
        match workflows.get_mut(&record.id) {
            Some(existing) => {
                *existing = record.clone();
                Ok(record)
            }
            None => Err(WorkflowError::NotFound(record.id).into()),
        }
    }

    async fn delete(&self, id: &str) -> Result<bool, FlowError> {
        Ok(self.workflows.write().await.remove(id).is_some())
    }

    async fn list(&self) -> Result<Vec<WorkflowRecord>, FlowError> {
        let mut records: Vec<WorkflowRecord> = self.workflows.read().await.values().cloned().collect();
        records.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(records)
    }
}

#[derive(Clone, Default)]
pub struct InMemoryExecutionRepository {
    runs: Arc<RwLock<HashMap<String, RunRecord>>>,
    node_runs: Arc<RwLock<HashMap<String, Vec<NodeExecutionRecord>>>>,
}

impl InMemoryExecutionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ExecutionRepository for InMemoryExecutionRepository {
    async fn save_run(&self, run: &RunRecord) -> Result<(), FlowError> {
        self.runs.write().await.insert(run.id.clone(), run.clone());
        Ok(())
    }

    async fn get_run(&self, id: &str) -> Result<Option<RunRecord>, FlowError> {
        Ok(self.runs.read().await.get(id).cloned())
    }

    async fn save_node_execution(&self, record: &NodeExecutionRecord) -> Result<(), FlowError> {
        let mut node_runs = self.node_runs.write().await;
        let entries = node_runs.entry(record.execution_id.clone()).or_default();
        match entries.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => *existing = record.clone(),
            None => entries.push(record.clone()),
        }
        Ok(())
    }

    async fn node_executions(&self, execution_id: &str) -> Result<Vec<NodeExecutionRecord>, FlowError> {
        Ok(self
            .node_runs
            .read()
            .await
            .get(execution_id)
            .cloned()
            .unwrap_or_default())
    }
}
