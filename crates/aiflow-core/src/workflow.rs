use crate::{Value, ValueMap, WorkflowError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type WorkflowId = String;
pub type NodeId = String;

/// Complete workflow definition. Immutable once loaded into a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDefinition {
    #[serde(default)]
    pub id: WorkflowId,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub nodes: Vec<NodeDefinition>,
    #[serde(default)]
    pub edges: Vec<EdgeDefinition>,
    /// Global variables, seeded into every run before the run input.
    #[serde(default)]
    pub variables: ValueMap,
    #[serde(default)]
    pub config: WorkflowConfig,
}

impl WorkflowDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            ..Default::default()
        }
    }

    /// Parse a definition document.
    pub fn from_json(json: &str) -> Result<Self, WorkflowError> {
        serde_json::from_str(json).map_err(|e| WorkflowError::Definition(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn add_node(&mut self, node: NodeDefinition) -> NodeId {
        let id = node.id.clone();
        self.nodes.push(node);
        id
    }

    /// Add a plain dependency edge from `source` to `target`.
    pub fn connect(&mut self, source: impl Into<NodeId>, target: impl Into<NodeId>) -> &mut EdgeDefinition {
        let edge = EdgeDefinition::new(source, target);
        self.edges.push(edge);
        let last = self.edges.len() - 1;
        &mut self.edges[last]
    }

    pub fn find_node(&self, id: &str) -> Option<&NodeDefinition> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn with_variable(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.variables.insert(key.into(), value.into());
        self
    }
}

/// Node declaration in a workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDefinition {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub node_type: String,
    /// Display label, not unique.
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub config: ValueMap,
    /// Layout only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
}

impl NodeDefinition {
    pub fn new(id: impl Into<NodeId>, node_type: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            node_type: node_type.into(),
            config: ValueMap::new(),
            position: None,
        }
    }

    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_position(mut self, x: f64, y: f64) -> Self {
        self.position = Some(Position { x, y });
        self
    }
}

/// Dependency edge between two nodes. Handles and conditions are carried
/// for the editor; the scheduler treats every edge as a plain dependency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeDefinition {
    #[serde(default)]
    pub id: String,
    pub source: NodeId,
    pub target: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<EdgeCondition>,
}

impl EdgeDefinition {
    pub fn new(source: impl Into<NodeId>, target: impl Into<NodeId>) -> Self {
        let source = source.into();
        let target = target.into();
        Self {
            id: format!("{}->{}", source, target),
            source,
            target,
            source_handle: None,
            target_handle: None,
            condition: None,
        }
    }

    pub fn with_condition(&mut self, expression: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.condition = Some(EdgeCondition {
            expression: expression.into(),
            value: value.into(),
        });
        self
    }

    pub fn with_handles(&mut self, source: impl Into<String>, target: impl Into<String>) -> &mut Self {
        self.source_handle = Some(source.into());
        self.target_handle = Some(target.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeCondition {
    #[serde(default)]
    pub expression: String,
    #[serde(default)]
    pub value: String,
}

/// Node position in visual editor
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// Per-definition execution settings.
///
/// Only `max_execution_time` is enforced; the rest are parsed and kept.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowConfig {
    /// Run deadline in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_execution_time: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_parallel: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallel_limit: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_editor_document() {
        let json = r#"{
            "id": "wf-1",
            "name": "Ask",
            "nodes": [
                {"id": "start", "type": "start", "name": "Start", "config": {}, "position": {"x": 0, "y": 0}},
                {"id": "llm", "type": "llm", "config": {"modelId": "gpt", "prompt": "{{question}}"}}
            ],
            "edges": [
                {"id": "e1", "source": "start", "target": "llm", "sourceHandle": "output",
                 "condition": {"expression": "x", "value": "true"}}
            ],
            "config": {"maxExecutionTime": 30, "enableParallel": false}
        }"#;

        let def = WorkflowDefinition::from_json(json).unwrap();
        assert_eq!(def.nodes.len(), 2);
        assert_eq!(def.nodes[1].node_type, "llm");
        assert_eq!(def.nodes[1].name, "");
        assert_eq!(def.edges[0].source_handle.as_deref(), Some("output"));
        assert_eq!(def.edges[0].condition.as_ref().unwrap().value, "true");
        assert_eq!(def.config.max_execution_time, Some(30));
        assert!(def.variables.is_empty());
    }

    #[test]
    fn unparsable_document_is_a_definition_error() {
        let err = WorkflowDefinition::from_json("{not json").unwrap_err();
        assert!(matches!(err, WorkflowError::Definition(_)));
    }

    #[test]
    fn builder_connects_nodes() {
        let mut def = WorkflowDefinition::new("demo");
        let a = def.add_node(NodeDefinition::new("a", "start"));
        let b = def.add_node(NodeDefinition::new("b", "output").with_config("fields", serde_json::json!([])));
        def.connect(a.clone(), b.clone()).with_handles("output", "input");

        assert_eq!(def.edges.len(), 1);
        assert_eq!(def.edges[0].id, "a->b");
        assert_eq!(def.find_node("b").unwrap().node_type, "output");
    }
}
