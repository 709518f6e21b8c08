//! HTTP trigger surface for the aiflow engine
//!
//! REST endpoints for workflows and runs, server-sent events and a
//! WebSocket relay for streaming runs.

pub mod api;
pub mod config;
pub mod error;
pub mod sse;

use aiflow_core::{CompletionService, Retriever};
use aiflow_nodes::{mock::StaticRetriever, HttpRetriever, NodeServices, OpenAiCompletion};
use aiflow_runtime::FlowRuntime;
use config::ServerConfig;
use std::sync::Arc;

pub use api::configure;

/// Application state shared across handlers
pub struct AppState {
    pub runtime: FlowRuntime,
}

impl AppState {
    pub fn new(runtime: FlowRuntime) -> Self {
        Self { runtime }
    }
}

/// Wire the collaborators named in `config` into a runtime with every
/// built-in node registered.
pub fn build_runtime(config: &ServerConfig) -> FlowRuntime {
    let retriever: Arc<dyn Retriever> = match &config.retrieval.base_url {
        Some(url) => Arc::new(HttpRetriever::new(url.clone())),
        None => {
            tracing::warn!("No retrieval endpoint configured; knowledge base nodes will find no corpora");
            Arc::new(StaticRetriever::new())
        }
    };
    let completion: Arc<dyn CompletionService> = Arc::new(OpenAiCompletion::new(
        config.completion.base_url.clone(),
        config.completion.api_key.clone(),
    ));

    let services = NodeServices::new(retriever, completion)
        .with_default_embedding_model(config.runtime.default_embedding_model.clone());
    let registry = aiflow_nodes::builtin_registry(&services);
    FlowRuntime::with_config(registry, config.runtime.clone())
}
