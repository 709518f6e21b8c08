use crate::{WorkflowDefinition, WorkflowError, WorkflowGraph};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Outcome of validating a definition. Any error makes it unrunnable;
/// warnings never block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn add_error(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
    }

    pub fn add_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn into_result(self) -> Result<(), WorkflowError> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(WorkflowError::Validation(self.errors))
        }
    }
}

/// Structural validation: node presence, cycles, dangling edges.
///
/// Pure; never touches the definition. Node types and node config are
/// checked separately by `NodeRegistry::validate_definition`.
pub fn validate(definition: &WorkflowDefinition) -> ValidationReport {
    let mut report = ValidationReport::default();

    if definition.nodes.is_empty() {
        report.add_error("Workflow must have at least one node");
    }

    let mut seen = HashSet::new();
    for node in &definition.nodes {
        if !seen.insert(node.id.as_str()) {
            report.add_error(format!("duplicate node id `{}`", node.id));
        }
    }

    let graph = WorkflowGraph::build(definition);
    if graph.has_cycle() {
        report.add_error("Workflow contains circular dependency");
    }

    for edge in &definition.edges {
        if !graph.contains(&edge.source) {
            report.add_error(format!("edge references unknown node `{}`", edge.source));
        }
        if !graph.contains(&edge.target) {
            report.add_error(format!("edge references unknown node `{}`", edge.target));
        }
    }

    if definition.nodes.len() > 1 {
        let connected: HashSet<&str> = definition
            .edges
            .iter()
            .flat_map(|e| [e.source.as_str(), e.target.as_str()])
            .collect();
        for node in &definition.nodes {
            if !connected.contains(node.id.as_str()) {
                report.add_warning(format!("node `{}` is not connected to any other node", node.id));
            }
        }
    }

    for edge in definition.edges.iter().filter(|e| e.condition.is_some()) {
        report.add_warning(format!(
            "edge `{}` declares a condition; conditions do not prune execution",
            edge.id
        ));
    }

    if definition.config.enable_parallel == Some(true) {
        report.add_warning("enableParallel is set; nodes still run sequentially");
    }

    report
}
