use crate::error::ApiError;
use crate::{sse, AppState};
use actix_web::{delete, get, post, put, web, HttpRequest, HttpResponse, Responder};
use actix_ws::Message;
use aiflow_core::{ValueMap, WorkflowDefinition, WorkflowError, WorkflowRecord};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};

type ApiResult = Result<HttpResponse, ApiError>;

/// Request body for creating or replacing a workflow
#[derive(Debug, Deserialize)]
pub struct WorkflowRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Either a definition object or its JSON text. Text is stored as is,
    /// so a malformed document is only rejected when it is run.
    pub definition: serde_json::Value,
}

impl WorkflowRequest {
    fn definition_text(&self) -> Result<String, ApiError> {
        match &self.definition {
            serde_json::Value::String(text) => Ok(text.clone()),
            other => serde_json::to_string(other).map_err(|e| ApiError::BadRequest(e.to_string())),
        }
    }
}

/// Request body for workflow execution
#[derive(Debug, Default, Deserialize)]
pub struct ExecuteRequest {
    #[serde(default)]
    pub input: ValueMap,
}

#[derive(Debug, Deserialize)]
pub struct PreviewRequest {
    pub definition: WorkflowDefinition,
    #[serde(default)]
    pub input: ValueMap,
}

/// Query of the GET streaming endpoints: `input` is a JSON object.
#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    #[serde(default)]
    pub input: Option<String>,
}

impl StreamQuery {
    fn input(&self) -> Result<ValueMap, ApiError> {
        match self.input.as_deref() {
            None | Some("") => Ok(ValueMap::new()),
            Some(text) => serde_json::from_str(text).map_err(|e| ApiError::BadRequest(format!("invalid input: {}", e))),
        }
    }
}

/// Health check endpoint
#[get("/health")]
async fn health_check() -> impl Responder {
    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "aiflow"
    }))
}

/// Node-type catalog for editors
#[get("/api/nodes")]
async fn list_node_types(data: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(data.runtime.registry().all_metadata())
}

#[get("/api/workflows")]
async fn list_workflows(data: web::Data<AppState>) -> ApiResult {
    let workflows = data.runtime.workflows().list().await?;
    Ok(HttpResponse::Ok().json(workflows))
}

#[post("/api/workflows")]
async fn create_workflow(data: web::Data<AppState>, body: web::Json<WorkflowRequest>) -> ApiResult {
    let body = body.into_inner();
    let mut record = WorkflowRecord::new(body.name.clone(), body.definition_text()?);
    record.description = body.description;

    info!("Creating workflow: {} ({})", record.name, record.id);
    let record = data.runtime.workflows().create(record).await?;
    Ok(HttpResponse::Created().json(record))
}

#[get("/api/workflows/{id}")]
async fn get_workflow(data: web::Data<AppState>, path: web::Path<String>) -> ApiResult {
    let id = path.into_inner();
    let record = data
        .runtime
        .workflows()
        .get(&id)
        .await?
        .ok_or(WorkflowError::NotFound(id))?;
    Ok(HttpResponse::Ok().json(record))
}

#[put("/api/workflows/{id}")]
async fn update_workflow(
    data: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<WorkflowRequest>,
) -> ApiResult {
    let id = path.into_inner();
    let body = body.into_inner();
    let mut record = data
        .runtime
        .workflows()
        .get(&id)
        .await?
        .ok_or_else(|| WorkflowError::NotFound(id.clone()))?;
    record.definition = body.definition_text()?;
    record.name = body.name;
    record.description = body.description;
    record.touch();

    let record = data.runtime.workflows().update(record).await?;
    Ok(HttpResponse::Ok().json(record))
}

#[delete("/api/workflows/{id}")]
async fn delete_workflow(data: web::Data<AppState>, path: web::Path<String>) -> ApiResult {
    let id = path.into_inner();
    if !data.runtime.workflows().delete(&id).await? {
        return Err(WorkflowError::NotFound(id).into());
    }
    info!("Deleted workflow: {}", id);
    Ok(HttpResponse::Ok().json(json!({ "message": "Workflow deleted successfully" })))
}

#[post("/api/workflows/{id}/validate")]
async fn validate_workflow(data: web::Data<AppState>, path: web::Path<String>) -> ApiResult {
    let report = data.runtime.validate(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(json!({
        "valid": report.is_valid(),
        "errors": report.errors,
        "warnings": report.warnings,
    })))
}

#[post("/api/workflows/{id}/publish")]
async fn publish_workflow(data: web::Data<AppState>, path: web::Path<String>) -> ApiResult {
    let record = data.runtime.publish(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(record))
}

#[post("/api/workflows/{id}/unpublish")]
async fn unpublish_workflow(data: web::Data<AppState>, path: web::Path<String>) -> ApiResult {
    let record = data.runtime.unpublish(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(record))
}

/// Batch execution. A run that fails still answers 200 with a FAILED record.
#[post("/api/workflows/{id}/execute")]
async fn execute_workflow(
    data: web::Data<AppState>,
    path: web::Path<String>,
    body: Option<web::Json<ExecuteRequest>>,
) -> ApiResult {
    let id = path.into_inner();
    let input = body.map(|b| b.into_inner().input).unwrap_or_default();

    info!("Executing workflow: {}", id);
    let run = data.runtime.execute(&id, input).await?;
    if let Some(e) = &run.error {
        error!("Workflow {} execution {} failed: {}", id, run.id, e);
    }
    Ok(HttpResponse::Ok().json(run))
}

#[get("/api/workflows/{id}/execute-stream")]
async fn execute_stream(
    data: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<StreamQuery>,
) -> ApiResult {
    let input = query.input()?;
    let events = data.runtime.execute_streaming(&path.into_inner(), input).await;
    Ok(sse::respond(events))
}

/// Relay a streaming run over a WebSocket, one JSON event per text frame.
/// The socket closes after the terminal event.
#[get("/api/workflows/{id}/ws")]
async fn execute_ws(
    req: HttpRequest,
    stream: web::Payload,
    data: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<StreamQuery>,
) -> actix_web::Result<HttpResponse> {
    let input = query.input()?;
    let (res, mut session, mut msg_stream) = actix_ws::handle(&req, stream)?;
    let mut events = data.runtime.execute_streaming(&path.into_inner(), input).await;
    info!("WebSocket client attached to execution {}", events.execution_id());

    actix_web::rt::spawn(async move {
        loop {
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else { break };
                    match serde_json::to_string(&event) {
                        Ok(json) => {
                            if session.text(json).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => error!("Failed to serialize event: {}", e),
                    }
                }

                Some(Ok(msg)) = msg_stream.recv() => {
                    match msg {
                        Message::Ping(bytes) => {
                            if session.pong(&bytes).await.is_err() {
                                break;
                            }
                        }
                        Message::Close(_) => break,
                        _ => {}
                    }
                }

                else => break,
            }
        }

        info!("WebSocket client detached");
        let _ = session.close(None).await;
    });

    Ok(res)
}

/// Run a definition that is never stored.
#[post("/api/workflows/preview")]
async fn preview_workflow(data: web::Data<AppState>, body: web::Json<PreviewRequest>) -> ApiResult {
    let body = body.into_inner();
    let run = data.runtime.execute_definition(&body.definition, body.input).await?;
    Ok(HttpResponse::Ok().json(run))
}

#[post("/api/workflows/preview-stream")]
async fn preview_stream(data: web::Data<AppState>, body: web::Json<PreviewRequest>) -> HttpResponse {
    let body = body.into_inner();
    let events = data
        .runtime
        .execute_definition_streaming(body.definition, body.input)
        .await;
    sse::respond(events)
}

#[get("/api/executions/{id}")]
async fn get_execution(data: web::Data<AppState>, path: web::Path<String>) -> ApiResult {
    let run = data.runtime.get_execution(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(run))
}

#[get("/api/executions/{id}/nodes")]
async fn get_node_executions(data: web::Data<AppState>, path: web::Path<String>) -> ApiResult {
    let records = data.runtime.get_node_executions(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(records))
}

#[post("/api/executions/{id}/cancel")]
async fn cancel_execution(data: web::Data<AppState>, path: web::Path<String>) -> ApiResult {
    let cancelled = data.runtime.cancel(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(json!({ "cancelled": cancelled })))
}

#[post("/api/executions/{id}/pause")]
async fn pause_execution(data: web::Data<AppState>, path: web::Path<String>) -> ApiResult {
    data.runtime.pause(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().finish())
}

#[post("/api/executions/{id}/resume")]
async fn resume_execution(data: web::Data<AppState>, path: web::Path<String>) -> ApiResult {
    data.runtime.resume(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().finish())
}

/// Register every route. Literal paths come before `{id}` routes.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(health_check)
        .service(list_node_types)
        .service(preview_workflow)
        .service(preview_stream)
        .service(list_workflows)
        .service(create_workflow)
        .service(get_workflow)
        .service(update_workflow)
        .service(delete_workflow)
        .service(validate_workflow)
        .service(publish_workflow)
        .service(unpublish_workflow)
        .service(execute_workflow)
        .service(execute_stream)
        .service(execute_ws)
        .service(get_execution)
        .service(get_node_executions)
        .service(cancel_execution)
        .service(pause_execution)
        .service(resume_execution);
}
