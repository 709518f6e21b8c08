//! Core abstractions for the aiflow engine
//!
//! Definitions, the dependency graph, the per-run execution context, the
//! node contract and registry, run events, and the storage and
//! collaborator seams. Everything else in the workspace builds on these.

mod collaborator;
mod context;
mod error;
mod events;
mod graph;
mod node;
mod record;
mod registry;
mod repository;
pub mod validator;
pub mod value;
mod workflow;

pub use collaborator::{
    CompletionChunk, CompletionRequest, CompletionService, CompletionStream, Corpus, RetrievedSnippet, Retriever,
};
pub use context::{ExecutionContext, ExecutionId};
pub use error::{CollaboratorError, FlowError, NodeError, WorkflowError};
pub use events::{EventEmitter, EventStream, ExecutionCallback, ExecutionEvent, TokenKind};
pub use graph::WorkflowGraph;
pub use node::{
    require_config_keys, Node, NodeContext, NodeInput, NodeMetadata, NodeOutput, NodeParameter, NodeStatus,
};
pub use record::{NodeExecutionRecord, RunRecord, RunStatus, WorkflowRecord, WorkflowStatus};
pub use registry::NodeRegistry;
pub use repository::{ExecutionRepository, WorkflowRepository};
pub use validator::ValidationReport;
pub use value::{Value, ValueExt, ValueMap};
pub use workflow::{
    EdgeCondition, EdgeDefinition, NodeDefinition, NodeId, Position, WorkflowConfig, WorkflowDefinition, WorkflowId,
};

/// Result type for flow operations
pub type Result<T> = std::result::Result<T, FlowError>;
