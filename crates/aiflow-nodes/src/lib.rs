//! Built-in node library
//!
//! The node types a workflow editor offers out of the box, plus HTTP
//! clients for the retrieval and completion services they call.

mod basic;
mod knowledge_base;
mod llm;
pub mod mock;
mod openai;
mod retrieval;

pub use basic::{ConditionNode, InputNode, OutputNode, StartNode};
pub use knowledge_base::{KnowledgeBaseNode, DEFAULT_EMBEDDING_MODEL, DEFAULT_TOP_K};
pub use llm::{LlmNode, DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE};
pub use openai::{sse_chunks, OpenAiCompletion};
pub use retrieval::HttpRetriever;

use aiflow_core::{CompletionService, NodeRegistry, Retriever};
use std::sync::Arc;

/// External services the built-in nodes depend on.
#[derive(Clone)]
pub struct NodeServices {
    pub retriever: Arc<dyn Retriever>,
    pub completion: Arc<dyn CompletionService>,
    pub default_embedding_model: String,
}

impl NodeServices {
    pub fn new(retriever: Arc<dyn Retriever>, completion: Arc<dyn CompletionService>) -> Self {
        Self {
            retriever,
            completion,
            default_embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
        }
    }

    pub fn with_default_embedding_model(mut self, model: impl Into<String>) -> Self {
        self.default_embedding_model = model.into();
        self
    }
}

/// Register all built-in nodes with a registry
pub fn register_all(registry: &mut NodeRegistry, services: &NodeServices) {
    registry.register(Arc::new(StartNode));
    registry.register(Arc::new(InputNode));
    registry.register(Arc::new(OutputNode));
    registry.register(Arc::new(ConditionNode));
    registry.register(Arc::new(
        KnowledgeBaseNode::new(services.retriever.clone())
            .with_default_embedding_model(services.default_embedding_model.clone()),
    ));
    registry.register(Arc::new(LlmNode::new(services.completion.clone())));
}

/// A registry with every built-in node registered.
pub fn builtin_registry(services: &NodeServices) -> NodeRegistry {
    let mut registry = NodeRegistry::new();
    register_all(&mut registry, services);
    registry
}
