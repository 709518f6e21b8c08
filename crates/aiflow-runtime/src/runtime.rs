use crate::{
    ExecutionResult, InMemoryExecutionRepository, InMemoryWorkflowRepository, RuntimeConfig, WorkflowExecutor,
};
use aiflow_core::{
    EventEmitter, EventStream, ExecutionCallback, ExecutionContext, ExecutionEvent, ExecutionId,
    ExecutionRepository, FlowError, NodeExecutionRecord, NodeRegistry, RunRecord, RunStatus, ValidationReport,
    ValueMap, WorkflowDefinition, WorkflowError, WorkflowRecord, WorkflowRepository, WorkflowStatus,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{RwLock, Semaphore};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Workflow id recorded for runs of definitions that were never stored.
const PREVIEW_WORKFLOW_ID: &str = "preview";

/// Main runtime for executing workflows
///
/// Owns the node registry (read-only once built), the repositories, and
/// the cancellation tokens of runs in flight. Cheap to clone; clones share
/// all state.
#[derive(Clone)]
pub struct FlowRuntime {
    executor: Arc<WorkflowExecutor>,
    workflows: Arc<dyn WorkflowRepository>,
    executions: Arc<dyn ExecutionRepository>,
    active: Arc<RwLock<HashMap<ExecutionId, CancellationToken>>>,
    run_slots: Arc<Semaphore>,
    config: RuntimeConfig,
}

/// Where a run gets its definition from.
enum DefinitionSource {
    Stored(String),
    Inline(WorkflowDefinition),
}

impl FlowRuntime {
    /// Create a runtime with default settings and in-memory storage
    pub fn new(registry: NodeRegistry) -> Self {
        Self::with_config(registry, RuntimeConfig::default())
    }

    pub fn with_config(registry: NodeRegistry, config: RuntimeConfig) -> Self {
        Self::with_repositories(
            Arc::new(registry),
            config,
            Arc::new(InMemoryWorkflowRepository::new()),
            Arc::new(InMemoryExecutionRepository::new()),
        )
    }

    pub fn with_repositories(
        registry: Arc<NodeRegistry>,
        config: RuntimeConfig,
        workflows: Arc<dyn WorkflowRepository>,
        executions: Arc<dyn ExecutionRepository>,
    ) -> Self {
        Self {
            executor: Arc::new(WorkflowExecutor::new(registry)),
            workflows,
            executions,
            active: Arc::new(RwLock::new(HashMap::new())),
            run_slots: Arc::new(Semaphore::new(config.max_concurrent_runs.max(1))),
            config,
        }
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        self.executor.registry()
    }

    pub fn workflows(&self) -> &Arc<dyn WorkflowRepository> {
        &self.workflows
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Read and parse a stored definition.
    pub async fn load_definition(&self, workflow_id: &str) -> Result<WorkflowDefinition, FlowError> {
        let record = self
            .workflows
            .get(workflow_id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(workflow_id.to_string()))?;
        let mut definition = WorkflowDefinition::from_json(&record.definition)?;
        if definition.id.is_empty() {
            definition.id = record.id;
        }
        Ok(definition)
    }

    /// Batch-execute a stored workflow.
    ///
    /// The run record is persisted at start and at the end; a missing or
    /// unparsable definition yields a FAILED record, not an error.
    pub async fn execute(&self, workflow_id: &str, input: ValueMap) -> Result<RunRecord, FlowError> {
        let mut run = RunRecord::start(workflow_id, &input);
        self.executions.save_run(&run).await?;

        match self.load_definition(workflow_id).await {
            Ok(definition) => {
                let recorder = Some(self.executions.as_ref());
                if let Err(e) = self.run_batch(&mut run, &definition, input, recorder).await {
                    if let Err(save_err) = self.executions.save_run(&run).await {
                        tracing::error!("Could not record failure of execution {}: {}", run.id, save_err);
                    }
                    return Err(e);
                }
            }
            Err(FlowError::Workflow(e)) => {
                tracing::error!("Execution {} cannot begin: {}", run.id, e);
                run.fail(e.to_string());
            }
            Err(e) => return Err(e),
        }

        self.executions.save_run(&run).await?;
        Ok(run)
    }

    /// Batch-execute a definition that is never stored. Nothing about the
    /// run is persisted.
    pub async fn execute_definition(
        &self,
        definition: &WorkflowDefinition,
        input: ValueMap,
    ) -> Result<RunRecord, FlowError> {
        let workflow_id = if definition.id.is_empty() {
            PREVIEW_WORKFLOW_ID
        } else {
            definition.id.as_str()
        };
        let mut run = RunRecord::start(workflow_id, &input);
        self.run_batch(&mut run, definition, input, None).await?;
        Ok(run)
    }

    async fn run_batch(
        &self,
        run: &mut RunRecord,
        definition: &WorkflowDefinition,
        input: ValueMap,
        recorder: Option<&dyn ExecutionRepository>,
    ) -> Result<(), FlowError> {
        // Registered before waiting for a slot so a queued run can be cancelled
        let token = self.register(&run.id).await;
        let result = match self.run_slots.acquire().await {
            Ok(_permit) => {
                let ctx =
                    ExecutionContext::seeded(run.id.clone(), run.workflow_id.clone(), &definition.variables, input);
                let events = EventEmitter::disabled(run.id.clone());
                self.executor.execute(definition, ctx, &events, token, recorder).await
            }
            Err(e) => Err(FlowError::Execution(e.to_string())),
        };
        self.unregister(&run.id).await;

        match result {
            Ok(result) => {
                apply_result(run, result);
                Ok(())
            }
            Err(e) => {
                tracing::error!("Execution {} aborted: {}", run.id, e);
                run.fail(e.to_string());
                Err(e)
            }
        }
    }

    /// Stream-execute a stored workflow. Events arrive on the returned
    /// stream, which ends after the terminal event.
    pub async fn execute_streaming(&self, workflow_id: &str, input: ValueMap) -> EventStream {
        self.spawn_streaming(DefinitionSource::Stored(workflow_id.to_string()), input)
            .await
    }

    /// Stream-execute a definition that is never stored.
    pub async fn execute_definition_streaming(&self, definition: WorkflowDefinition, input: ValueMap) -> EventStream {
        self.spawn_streaming(DefinitionSource::Inline(definition), input).await
    }

    /// Stream-execute a stored workflow, delivering events to `callback`
    /// in order. Returns an error when the run failed or could not begin,
    /// after the callback has seen the failure.
    pub async fn execute_with_callback(
        &self,
        workflow_id: &str,
        input: ValueMap,
        callback: &mut dyn ExecutionCallback,
    ) -> Result<(), FlowError> {
        let mut stream = self.execute_streaming(workflow_id, input).await;
        let mut terminal = None;
        while let Some(event) = stream.recv().await {
            event.dispatch(callback);
            if event.is_terminal() {
                terminal = Some(event);
            }
        }

        match terminal {
            Some(ExecutionEvent::NodeFailed { node_id, error, .. }) => {
                Err(FlowError::Execution(format!("Node {} failed: {}", node_id, error)))
            }
            Some(ExecutionEvent::Error { message }) => Err(FlowError::Execution(message)),
            Some(_) => Ok(()),
            None => Err(FlowError::Execution("event stream closed before the run finished".to_string())),
        }
    }

    async fn spawn_streaming(&self, source: DefinitionSource, input: ValueMap) -> EventStream {
        let execution_id = Uuid::new_v4().to_string();
        let (events, stream) = EventEmitter::channel(execution_id.clone(), self.config.event_buffer_size);
        let token = self.register(&execution_id).await;
        let runtime = self.clone();

        tokio::spawn(async move {
            let definition = match source {
                DefinitionSource::Inline(definition) => Ok(definition),
                DefinitionSource::Stored(id) => runtime.load_definition(&id).await,
            };

            match definition {
                Ok(definition) => match runtime.run_slots.clone().acquire_owned().await {
                    Ok(_permit) => {
                        let workflow_id = if definition.id.is_empty() {
                            PREVIEW_WORKFLOW_ID.to_string()
                        } else {
                            definition.id.clone()
                        };
                        let ctx =
                            ExecutionContext::seeded(execution_id.clone(), workflow_id, &definition.variables, input);
                        if let Err(e) = runtime.executor.execute(&definition, ctx, &events, token, None).await {
                            tracing::error!("Streaming execution {} aborted: {}", execution_id, e);
                        }
                    }
                    Err(e) => {
                        events.emit(ExecutionEvent::Error { message: e.to_string() }).await;
                    }
                },
                Err(e) => {
                    let message = match e {
                        FlowError::Workflow(e) => e.to_string(),
                        other => other.to_string(),
                    };
                    tracing::error!("Execution {} cannot begin: {}", execution_id, message);
                    events.emit(ExecutionEvent::Error { message }).await;
                }
            }

            runtime.unregister(&execution_id).await;
        });

        stream
    }

    pub async fn get_execution(&self, execution_id: &str) -> Result<RunRecord, FlowError> {
        self.executions
            .get_run(execution_id)
            .await?
            .ok_or_else(|| WorkflowError::ExecutionNotFound(execution_id.to_string()).into())
    }

    pub async fn get_node_executions(&self, execution_id: &str) -> Result<Vec<NodeExecutionRecord>, FlowError> {
        self.executions.node_executions(execution_id).await
    }

    /// Request cancellation of a run in flight. Nodes not yet started are
    /// never scheduled; a node already running finishes unless it observes
    /// the cancellation itself.
    ///
    /// Returns `false` when the run exists but has already finished.
    pub async fn cancel(&self, execution_id: &str) -> Result<bool, FlowError> {
        if let Some(token) = self.active.read().await.get(execution_id) {
            tracing::info!("Cancelling execution {}", execution_id);
            token.cancel();
            return Ok(true);
        }
        match self.executions.get_run(execution_id).await? {
            Some(_) => Ok(false),
            None => Err(WorkflowError::ExecutionNotFound(execution_id.to_string()).into()),
        }
    }

    pub async fn pause(&self, _execution_id: &str) -> Result<(), FlowError> {
        Err(WorkflowError::Unsupported("pause".to_string()).into())
    }

    pub async fn resume(&self, _execution_id: &str) -> Result<(), FlowError> {
        Err(WorkflowError::Unsupported("resume".to_string()).into())
    }

    /// Validate a stored workflow. A definition that does not parse is
    /// reported as an error in the report.
    pub async fn validate(&self, workflow_id: &str) -> Result<ValidationReport, FlowError> {
        match self.load_definition(workflow_id).await {
            Ok(definition) => Ok(self.validate_definition(&definition)),
            Err(FlowError::Workflow(WorkflowError::Definition(msg))) => {
                let mut report = ValidationReport::default();
                report.add_error(format!("Invalid workflow definition: {}", msg));
                Ok(report)
            }
            Err(e) => Err(e),
        }
    }

    /// Structural checks plus node types and node config.
    pub fn validate_definition(&self, definition: &WorkflowDefinition) -> ValidationReport {
        self.registry().validate_definition(definition)
    }

    pub async fn publish(&self, workflow_id: &str) -> Result<WorkflowRecord, FlowError> {
        self.validate(workflow_id).await?.into_result()?;
        self.set_status(workflow_id, WorkflowStatus::Published).await
    }

    pub async fn unpublish(&self, workflow_id: &str) -> Result<WorkflowRecord, FlowError> {
        self.set_status(workflow_id, WorkflowStatus::Draft).await
    }

    async fn set_status(&self, workflow_id: &str, status: WorkflowStatus) -> Result<WorkflowRecord, FlowError> {
        let mut record = self
            .workflows
            .get(workflow_id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(workflow_id.to_string()))?;
        record.status = status;
        record.touch();
        tracing::info!("Workflow {} is now {:?}", workflow_id, status);
        self.workflows.update(record).await
    }

    async fn register(&self, execution_id: &str) -> CancellationToken {
        let token = CancellationToken::new();
        self.active
            .write()
            .await
            .insert(execution_id.to_string(), token.clone());
        token
    }

    async fn unregister(&self, execution_id: &str) {
        self.active.write().await.remove(execution_id);
    }

    /// Executions currently in flight.
    pub async fn active_executions(&self) -> Vec<ExecutionId> {
        self.active.read().await.keys().cloned().collect()
    }
}

fn apply_result(run: &mut RunRecord, result: ExecutionResult) {
    match result.status {
        RunStatus::Completed => run.complete(&result.variables),
        RunStatus::Cancelled => run.cancel(&result.variables),
        _ => run.fail(result.error.unwrap_or_else(|| "execution failed".to_string())),
    }
}
