use crate::{ExecutionId, NodeStatus, Value, ValueMap, WorkflowId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowStatus {
    Draft,
    Published,
    Archived,
}

/// A stored workflow. The definition is kept as the raw document so that
/// a broken document is only discovered when a run tries to load it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowRecord {
    pub id: WorkflowId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub definition: String,
    pub status: WorkflowStatus,
    pub version: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowRecord {
    pub fn new(name: impl Into<String>, definition: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            description: None,
            definition: definition.into(),
            status: WorkflowStatus::Draft,
            version: "1.0.0".to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_id(mut self, id: impl Into<WorkflowId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Run-level status. `Paused` is reserved; the engine never enters it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
    Paused,
}

impl RunStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed | RunStatus::Cancelled)
    }
}

/// One execution of a definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    pub id: ExecutionId,
    pub workflow_id: WorkflowId,
    pub status: RunStatus,
    pub input: Value,
    #[serde(default)]
    pub output: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
}

impl RunRecord {
    pub fn start(workflow_id: impl Into<WorkflowId>, input: &ValueMap) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            workflow_id: workflow_id.into(),
            status: RunStatus::Running,
            input: to_value(input),
            output: None,
            error: None,
            start_time: Utc::now(),
            end_time: None,
        }
    }

    pub fn complete(&mut self, output: &ValueMap) {
        self.status = RunStatus::Completed;
        self.output = Some(to_value(output));
        self.end_time = Some(Utc::now());
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = RunStatus::Failed;
        self.error = Some(error.into());
        self.end_time = Some(Utc::now());
    }

    /// Variables merged before the cancel point are kept as the output.
    pub fn cancel(&mut self, output: &ValueMap) {
        self.status = RunStatus::Cancelled;
        self.output = Some(to_value(output));
        self.end_time = Some(Utc::now());
    }
}

/// One node's execution within a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeExecutionRecord {
    pub id: String,
    pub execution_id: ExecutionId,
    pub node_id: String,
    pub node_name: String,
    pub node_type: String,
    pub status: NodeStatus,
    #[serde(default)]
    pub input: Option<Value>,
    #[serde(default)]
    pub output: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    /// Reserved; the engine does not retry.
    pub retry_count: u32,
}

impl NodeExecutionRecord {
    pub fn pending(
        execution_id: impl Into<ExecutionId>,
        node_id: impl Into<String>,
        node_name: impl Into<String>,
        node_type: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            execution_id: execution_id.into(),
            node_id: node_id.into(),
            node_name: node_name.into(),
            node_type: node_type.into(),
            status: NodeStatus::Pending,
            input: None,
            output: None,
            error: None,
            start_time: None,
            end_time: None,
            retry_count: 0,
        }
    }

    pub fn start(&mut self, input: &ValueMap) {
        self.status = NodeStatus::Running;
        self.input = Some(to_value(input));
        self.start_time = Some(Utc::now());
    }

    pub fn finish(&mut self, status: NodeStatus, output: &ValueMap) {
        self.status = status;
        self.output = Some(to_value(output));
        self.end_time = Some(Utc::now());
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = NodeStatus::Failed;
        self.error = Some(error.into());
        self.end_time = Some(Utc::now());
    }
}

fn to_value(map: &ValueMap) -> Value {
    Value::Object(map.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
}
