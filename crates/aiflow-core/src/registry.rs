use crate::{validator, Node, NodeMetadata, ValidationReport, WorkflowDefinition, WorkflowError};
use std::collections::HashMap;
use std::sync::Arc;

/// Registry of available node types.
///
/// Populated once at startup and then shared read-only (behind an `Arc`)
/// by every run.
pub struct NodeRegistry {
    nodes: HashMap<String, Arc<dyn Node>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
        }
    }

    /// Register a node implementation under its `node_type()`. A later
    /// registration for the same type replaces the earlier one.
    pub fn register(&mut self, node: Arc<dyn Node>) {
        let node_type = node.node_type().to_string();
        tracing::info!("Registering node type: {}", node_type);
        if self.nodes.insert(node_type.clone(), node).is_some() {
            tracing::warn!("Node type {} was already registered; replaced", node_type);
        }
    }

    pub fn lookup(&self, node_type: &str) -> Result<Arc<dyn Node>, WorkflowError> {
        self.nodes
            .get(node_type)
            .cloned()
            .ok_or_else(|| WorkflowError::UnknownNodeType(node_type.to_string()))
    }

    pub fn contains(&self, node_type: &str) -> bool {
        self.nodes.contains_key(node_type)
    }

    /// Get all registered node types, sorted
    pub fn list_node_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.nodes.keys().cloned().collect();
        types.sort();
        types
    }

    pub fn get_metadata(&self, node_type: &str) -> Option<NodeMetadata> {
        self.nodes.get(node_type).map(|n| n.metadata())
    }

    pub fn all_metadata(&self) -> Vec<NodeMetadata> {
        self.list_node_types()
            .iter()
            .filter_map(|t| self.get_metadata(t))
            .collect()
    }

    /// Publish-time validation: structural checks plus, for every node,
    /// a known type and a config its implementation accepts.
    pub fn validate_definition(&self, definition: &WorkflowDefinition) -> ValidationReport {
        let mut report = validator::validate(definition);

        for node_def in &definition.nodes {
            match self.nodes.get(&node_def.node_type) {
                None => report.add_error(format!(
                    "node `{}` has unknown type `{}`",
                    node_def.id, node_def.node_type
                )),
                Some(node) => {
                    if let Err(e) = node.validate_config(&node_def.config) {
                        report.add_error(format!("node `{}`: {}", node_def.id, e));
                    }
                }
            }
        }

        report
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
