use crate::{EventEmitter, ExecutionContext, NodeError, TokenKind, Value, ValueMap};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// Core trait that all node types implement
#[async_trait]
pub trait Node: Send + Sync {
    /// Registry key (e.g. "llm", "knowledge_base")
    fn node_type(&self) -> &str;

    /// Descriptive metadata for editors. Never consulted by the scheduler.
    fn metadata(&self) -> NodeMetadata;

    /// Check the node's static configuration at publish time.
    fn validate_config(&self, _config: &ValueMap) -> Result<(), NodeError> {
        Ok(())
    }

    /// Execute the node against a snapshot of the run's variables.
    async fn execute(&self, input: NodeInput, ctx: &NodeContext<'_>) -> Result<NodeOutput, NodeError>;
}

/// Fail with a configuration error naming the first absent key.
pub fn require_config_keys(config: &ValueMap, keys: &[&str]) -> Result<(), NodeError> {
    for key in keys {
        match config.get(*key) {
            Some(v) if !v.is_null() => {}
            _ => return Err(NodeError::missing_config(key)),
        }
    }
    Ok(())
}

/// Snapshot of the run's variables plus the node's own config.
#[derive(Debug, Clone, Default)]
pub struct NodeInput {
    pub data: ValueMap,
    pub config: ValueMap,
}

impl NodeInput {
    pub fn new(data: ValueMap, config: ValueMap) -> Self {
        Self { data, config }
    }

    pub fn config_str(&self, key: &str) -> Option<&str> {
        crate::value::get_str(&self.config, key)
    }

    pub fn config_f64(&self, key: &str) -> Option<f64> {
        crate::value::get_f64(&self.config, key)
    }

    pub fn require_config_str(&self, key: &str) -> Result<&str, NodeError> {
        self.config_str(key).ok_or_else(|| NodeError::missing_config(key))
    }

    /// First non-blank string variable among `keys`.
    pub fn data_str(&self, keys: &[&str]) -> Option<&str> {
        keys.iter()
            .filter_map(|k| crate::value::get_str(&self.data, k))
            .find(|s| !s.trim().is_empty())
    }
}

/// What a node sees of the run while it executes.
pub struct NodeContext<'a> {
    pub node_id: &'a str,
    /// Read-only view of the run state, for `{{path}}` interpolation.
    pub execution: &'a ExecutionContext,
    pub events: &'a EventEmitter,
    pub cancellation: CancellationToken,
}

impl<'a> NodeContext<'a> {
    pub fn new(node_id: &'a str, execution: &'a ExecutionContext, events: &'a EventEmitter) -> Self {
        Self {
            node_id,
            execution,
            events,
            cancellation: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// True when the run is streaming events to a caller.
    pub fn is_streaming(&self) -> bool {
        self.events.is_enabled()
    }

    pub fn resolve(&self, template: &str) -> String {
        self.execution.resolve(template)
    }

    pub async fn emit_token(&self, token: impl Into<String>, kind: TokenKind) {
        self.events.token(self.node_id, token, kind).await;
    }
}

/// Status of a node execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

/// Output from node execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeOutput {
    pub outputs: ValueMap,
    pub status: NodeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl NodeOutput {
    pub fn new() -> Self {
        Self::completed(ValueMap::new())
    }

    pub fn completed(outputs: ValueMap) -> Self {
        Self {
            outputs,
            status: NodeStatus::Completed,
            error: None,
        }
    }

    pub fn skipped() -> Self {
        Self {
            outputs: ValueMap::new(),
            status: NodeStatus::Skipped,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            outputs: ValueMap::new(),
            status: NodeStatus::Failed,
            error: Some(error.into()),
        }
    }

    pub fn with_output(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.outputs.insert(key.into(), value.into());
        self
    }
}

impl Default for NodeOutput {
    fn default() -> Self {
        Self::new()
    }
}

/// Metadata about a node type, consumed by an editor UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeMetadata {
    #[serde(rename = "type")]
    pub node_type: String,
    pub display_name: String,
    pub description: String,
    pub category: String,
    pub icon: String,
    pub parameters: Vec<NodeParameter>,
    pub input_ports: Vec<String>,
    pub output_ports: Vec<String>,
}

impl NodeMetadata {
    pub fn new(node_type: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            node_type: node_type.into(),
            display_name: display_name.into(),
            description: String::new(),
            category: "general".to_string(),
            icon: String::new(),
            parameters: Vec::new(),
            input_ports: Vec::new(),
            output_ports: Vec::new(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = icon.into();
        self
    }

    pub fn parameter(mut self, parameter: NodeParameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn ports(mut self, inputs: &[&str], outputs: &[&str]) -> Self {
        self.input_ports = inputs.iter().map(|s| s.to_string()).collect();
        self.output_ports = outputs.iter().map(|s| s.to_string()).collect();
        self
    }
}

/// A declared configuration parameter of a node type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeParameter {
    pub name: String,
    pub label: String,
    /// Editor widget kind: string, number, textarea, select, array, object...
    #[serde(rename = "type")]
    pub param_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
}

impl NodeParameter {
    pub fn new(name: impl Into<String>, label: impl Into<String>, param_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            param_type: param_type.into(),
            description: None,
            required: false,
            default_value: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default_value = Some(value.into());
        self
    }
}
