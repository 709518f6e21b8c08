use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("Node error: {0}")]
    Node(#[from] NodeError),

    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Repository error: {0}")]
    Repository(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failure of a single node. Always fatal to the run that produced it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NodeError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("{service} failed: {message}")]
    Collaborator { service: String, message: String },

    #[error("Timeout after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("Cancelled")]
    Cancelled,
}

impl NodeError {
    pub fn missing_config(key: &str) -> Self {
        NodeError::Configuration(format!("Required configuration '{}' is missing", key))
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum WorkflowError {
    #[error("Workflow not found: {0}")]
    NotFound(String),

    #[error("Invalid workflow definition: {0}")]
    Definition(String),

    #[error("Workflow validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("Cyclic dependency detected")]
    CyclicDependency,

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Unknown node type: {0}")]
    UnknownNodeType(String),

    #[error("Execution not found: {0}")]
    ExecutionNotFound(String),

    #[error("Operation not supported: {0}")]
    Unsupported(String),
}

/// Error reported by an external collaborator (retrieval or completion).
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{service}: {message}")]
pub struct CollaboratorError {
    pub service: String,
    pub message: String,
}

impl CollaboratorError {
    pub fn new(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            message: message.into(),
        }
    }
}

impl From<CollaboratorError> for NodeError {
    fn from(e: CollaboratorError) -> Self {
        NodeError::Collaborator {
            service: e.service,
            message: e.message,
        }
    }
}
