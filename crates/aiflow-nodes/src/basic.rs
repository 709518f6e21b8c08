use aiflow_core::{
    require_config_keys, Node, NodeContext, NodeError, NodeInput, NodeMetadata, NodeOutput, NodeParameter, ValueMap,
};
use async_trait::async_trait;

/// Entry point of a workflow. Passes the run input through unchanged.
pub struct StartNode;

#[async_trait]
impl Node for StartNode {
    fn node_type(&self) -> &str {
        "start"
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::new("start", "Start")
            .description("Entry point of the workflow")
            .category("basic")
            .icon("start")
            .parameter(
                NodeParameter::new("fields", "Input fields", "array").describe("Fields the workflow expects as input"),
            )
            .ports(&[], &["output"])
    }

    async fn execute(&self, input: NodeInput, _ctx: &NodeContext<'_>) -> Result<NodeOutput, NodeError> {
        Ok(NodeOutput::completed(input.data))
    }
}

/// Declares the run input shape. The declaration is not enforced.
pub struct InputNode;

#[async_trait]
impl Node for InputNode {
    fn node_type(&self) -> &str {
        "input"
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::new("input", "Input")
            .description("Receives workflow input parameters")
            .category("basic")
            .icon("input")
            .parameter(NodeParameter::new("fields", "Input fields", "array").required())
            .ports(&[], &["output"])
    }

    fn validate_config(&self, config: &ValueMap) -> Result<(), NodeError> {
        require_config_keys(config, &["fields"])
    }

    async fn execute(&self, input: NodeInput, _ctx: &NodeContext<'_>) -> Result<NodeOutput, NodeError> {
        Ok(NodeOutput::completed(input.data))
    }
}

/// Declares the run output shape. The declaration is not enforced.
pub struct OutputNode;

#[async_trait]
impl Node for OutputNode {
    fn node_type(&self) -> &str {
        "output"
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::new("output", "Output")
            .description("Exposes workflow results")
            .category("basic")
            .icon("output")
            .parameter(NodeParameter::new("fields", "Output fields", "array").required())
            .ports(&["input"], &[])
    }

    fn validate_config(&self, config: &ValueMap) -> Result<(), NodeError> {
        require_config_keys(config, &["fields"])
    }

    async fn execute(&self, input: NodeInput, _ctx: &NodeContext<'_>) -> Result<NodeOutput, NodeError> {
        Ok(NodeOutput::completed(input.data))
    }
}

/// Emits `{result, branch}`. The expression is not interpreted; every
/// condition takes the `true` branch, and edges are never pruned on it.
pub struct ConditionNode;

#[async_trait]
impl Node for ConditionNode {
    fn node_type(&self) -> &str {
        "condition"
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::new("condition", "Condition")
            .description("Branches on a condition expression")
            .category("logic")
            .icon("fork")
            .parameter(NodeParameter::new("condition", "Condition expression", "string").required())
            .ports(&["input"], &["true", "false"])
    }

    fn validate_config(&self, config: &ValueMap) -> Result<(), NodeError> {
        require_config_keys(config, &["condition"])
    }

    async fn execute(&self, input: NodeInput, ctx: &NodeContext<'_>) -> Result<NodeOutput, NodeError> {
        let condition = input.config_str("condition").unwrap_or_default();
        let result = true;
        tracing::debug!("Condition `{}` on node {} evaluated to {}", condition, ctx.node_id, result);

        Ok(NodeOutput::new()
            .with_output("result", result)
            .with_output("branch", if result { "true" } else { "false" }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aiflow_core::{EventEmitter, ExecutionContext};
    use serde_json::json;

    fn data() -> ValueMap {
        let mut data = ValueMap::new();
        data.insert("question".into(), json!("hi"));
        data
    }

    #[tokio::test]
    async fn test_start_passes_input_through() {
        let ctx = ExecutionContext::new("e", "w", data());
        let events = EventEmitter::disabled("e");
        let node_ctx = NodeContext::new("start", &ctx, &events);

        let output = StartNode
            .execute(NodeInput::new(data(), ValueMap::new()), &node_ctx)
            .await
            .unwrap();
        assert_eq!(output.outputs, data());
    }

    #[test]
    fn test_input_and_output_require_fields() {
        assert_eq!(
            InputNode.validate_config(&ValueMap::new()),
            Err(NodeError::missing_config("fields"))
        );
        assert!(OutputNode.validate_config(&ValueMap::new()).is_err());
        assert!(StartNode.validate_config(&ValueMap::new()).is_ok());
    }

    #[tokio::test]
    async fn test_condition_node_always_takes_true_branch() {
        let ctx = ExecutionContext::new("e", "w", ValueMap::new());
        let events = EventEmitter::disabled("e");
        let node_ctx = NodeContext::new("cond", &ctx, &events);
        let mut config = ValueMap::new();
        config.insert("condition".into(), json!("1 > 2"));

        let output = ConditionNode
            .execute(NodeInput::new(ValueMap::new(), config), &node_ctx)
            .await
            .unwrap();
        assert_eq!(output.outputs["result"], json!(true));
        assert_eq!(output.outputs["branch"], json!("true"));
    }
}
