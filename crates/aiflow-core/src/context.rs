use crate::{NodeId, Value, ValueExt, ValueMap, WorkflowId};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::collections::HashMap;

pub type ExecutionId = String;

static VARIABLE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{([^}]+)\}\}").expect("variable pattern is valid"));

/// Mutable state of one run: the flat variable table and the per-node
/// output cache.
///
/// Owned by exactly one run. Node outputs merge into `variables` wholesale,
/// so a later node silently shadows an earlier key of the same name; the
/// unmerged output stays addressable as `nodeId.field`.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub execution_id: ExecutionId,
    pub workflow_id: WorkflowId,
    variables: ValueMap,
    node_outputs: HashMap<NodeId, ValueMap>,
}

impl ExecutionContext {
    pub fn new(execution_id: impl Into<ExecutionId>, workflow_id: impl Into<WorkflowId>, input: ValueMap) -> Self {
        Self {
            execution_id: execution_id.into(),
            workflow_id: workflow_id.into(),
            variables: input,
            node_outputs: HashMap::new(),
        }
    }

    /// Seed with the definition's global variables, then the run input.
    /// Input wins on collision.
    pub fn seeded(
        execution_id: impl Into<ExecutionId>,
        workflow_id: impl Into<WorkflowId>,
        globals: &ValueMap,
        input: ValueMap,
    ) -> Self {
        let mut variables = globals.clone();
        variables.extend(input);
        Self::new(execution_id, workflow_id, variables)
    }

    pub fn variables(&self) -> &ValueMap {
        &self.variables
    }

    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    pub fn set_variable(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.variables.insert(name.into(), value.into());
    }

    pub fn node_output(&self, node_id: &str) -> Option<&ValueMap> {
        self.node_outputs.get(node_id)
    }

    /// Cache a node's raw output and merge it into the variable table.
    pub fn record_output(&mut self, node_id: impl Into<NodeId>, outputs: &ValueMap) {
        self.node_outputs.insert(node_id.into(), outputs.clone());
        for (key, value) in outputs {
            self.variables.insert(key.clone(), value.clone());
        }
    }

    /// Look up `name` in the variables or `nodeId.field` in the node
    /// outputs. Deeper paths are not supported.
    pub fn resolve_path(&self, path: &str) -> Option<&Value> {
        let parts: Vec<&str> = path.split('.').collect();
        match parts.as_slice() {
            [name] => self.variables.get(*name),
            [node_id, field] => self.node_outputs.get(*node_id)?.get(*field),
            _ => None,
        }
    }

    /// Substitute every `{{path}}` in `template`. Unresolvable paths become
    /// empty strings, so this never fails.
    pub fn resolve(&self, template: &str) -> String {
        VARIABLE_PATTERN
            .replace_all(template, |caps: &Captures| {
                self.resolve_path(caps[1].trim())
                    .map(|v| v.to_template_string())
                    .unwrap_or_default()
            })
            .into_owned()
    }

    pub fn into_variables(self) -> ValueMap {
        self.variables
    }
}
