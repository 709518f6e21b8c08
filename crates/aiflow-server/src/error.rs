use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use aiflow_core::{FlowError, WorkflowError};
use serde::Serialize;

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Flow(#[from] FlowError),

    #[error("{0}")]
    BadRequest(String),
}

impl From<WorkflowError> for ApiError {
    fn from(e: WorkflowError) -> Self {
        ApiError::Flow(e.into())
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Flow(FlowError::Workflow(e)) => match e {
                WorkflowError::NotFound(_) | WorkflowError::ExecutionNotFound(_) => StatusCode::NOT_FOUND,
                WorkflowError::Definition(_)
                | WorkflowError::Validation(_)
                | WorkflowError::CyclicDependency
                | WorkflowError::NodeNotFound(_)
                | WorkflowError::UnknownNodeType(_) => StatusCode::BAD_REQUEST,
                WorkflowError::Unsupported(_) => StatusCode::NOT_IMPLEMENTED,
            },
            ApiError::Flow(FlowError::Serialization(_)) => StatusCode::BAD_REQUEST,
            ApiError::Flow(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let details = match self {
            ApiError::Flow(FlowError::Workflow(WorkflowError::Validation(errors))) => errors.clone(),
            _ => Vec::new(),
        };
        HttpResponse::build(self.status_code()).json(ErrorResponse {
            error: self.to_string(),
            details,
        })
    }
}
