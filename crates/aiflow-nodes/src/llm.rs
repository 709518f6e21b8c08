use aiflow_core::{
    require_config_keys, CompletionChunk, CompletionRequest, CompletionService, Node, NodeContext, NodeError,
    NodeInput, NodeMetadata, NodeOutput, NodeParameter, TokenKind, ValueMap,
};
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;

pub const DEFAULT_TEMPERATURE: f64 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 2048;

/// Calls a completion model with a `{{variable}}` prompt template.
///
/// Tokens are forwarded to the run's event stream as they arrive when the
/// run is streaming. Only content tokens make up `response`.
pub struct LlmNode {
    completion: Arc<dyn CompletionService>,
}

impl LlmNode {
    pub fn new(completion: Arc<dyn CompletionService>) -> Self {
        Self { completion }
    }

    fn build_request(input: &NodeInput, ctx: &NodeContext<'_>) -> Result<CompletionRequest, NodeError> {
        let model_id = input.require_config_str("modelId")?;
        let template = input
            .config_str("prompt")
            .or_else(|| input.config_str("userPromptTemplate"))
            .ok_or_else(|| NodeError::missing_config("prompt"))?;

        let system_prompt = input
            .config_str("systemPrompt")
            .map(|s| ctx.resolve(s))
            .filter(|s| !s.trim().is_empty());
        let max_tokens = input
            .config_f64("maxTokens")
            .filter(|n| *n >= 1.0)
            .map(|n| n as u32)
            .unwrap_or(DEFAULT_MAX_TOKENS);

        Ok(CompletionRequest {
            model_id: model_id.to_string(),
            prompt: ctx.resolve(template),
            system_prompt,
            temperature: input.config_f64("temperature").unwrap_or(DEFAULT_TEMPERATURE),
            max_tokens,
        })
    }
}

#[async_trait]
impl Node for LlmNode {
    fn node_type(&self) -> &str {
        "llm"
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::new("llm", "LLM")
            .description("Calls a large language model")
            .category("ai")
            .icon("brain")
            .parameter(
                NodeParameter::new("modelId", "Model", "select")
                    .describe("Model to call")
                    .required(),
            )
            .parameter(
                NodeParameter::new("prompt", "Prompt", "textarea")
                    .describe("Prompt template; supports {{variable}} and {{nodeId.field}}")
                    .required(),
            )
            .parameter(NodeParameter::new("systemPrompt", "System prompt", "textarea"))
            .parameter(NodeParameter::new("temperature", "Temperature", "number").default_value(DEFAULT_TEMPERATURE))
            .parameter(NodeParameter::new("maxTokens", "Max tokens", "number").default_value(DEFAULT_MAX_TOKENS))
            .ports(&["input"], &["output"])
    }

    fn validate_config(&self, config: &ValueMap) -> Result<(), NodeError> {
        require_config_keys(config, &["modelId", "prompt"])
    }

    async fn execute(&self, input: NodeInput, ctx: &NodeContext<'_>) -> Result<NodeOutput, NodeError> {
        let request = Self::build_request(&input, ctx)?;
        tracing::info!("LLM node {} calling model {}", ctx.node_id, request.model_id);
        tracing::debug!("Resolved prompt for {}: {}", ctx.node_id, request.prompt);

        let mut stream = self.completion.stream_completion(request).await?;
        let streaming = ctx.is_streaming();
        let mut response = String::new();

        loop {
            let chunk = tokio::select! {
                _ = ctx.cancellation.cancelled() => return Err(NodeError::Cancelled),
                chunk = stream.next() => chunk,
            };
            match chunk {
                Some(Ok(CompletionChunk::Content(token))) => {
                    if streaming {
                        ctx.emit_token(token.as_str(), TokenKind::Content).await;
                    }
                    response.push_str(&token);
                }
                Some(Ok(CompletionChunk::Reasoning(token))) => {
                    if streaming {
                        ctx.emit_token(token, TokenKind::Reasoning).await;
                    }
                }
                Some(Err(e)) => return Err(e.into()),
                None => break,
            }
        }

        tracing::info!("LLM node {} produced {} chars", ctx.node_id, response.len());
        Ok(NodeOutput::new().with_output("response", response))
    }
}
