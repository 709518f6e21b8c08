use aiflow_core::{
    validator, EventEmitter, ExecutionContext, ExecutionEvent, ExecutionRepository, FlowError, Node,
    NodeContext, NodeDefinition, NodeError, NodeExecutionRecord, NodeId, NodeInput, NodeRegistry,
    NodeStatus, RunStatus, ValueMap, WorkflowDefinition, WorkflowError, WorkflowGraph,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{timeout_at, Duration};
use tokio_util::sync::CancellationToken;

/// Runs one definition to completion, one node at a time, in topological
/// order.
pub struct WorkflowExecutor {
    registry: Arc<NodeRegistry>,
}

/// A node resolved against the registry, ready to run.
struct PlannedNode<'a> {
    definition: &'a NodeDefinition,
    node: Arc<dyn Node>,
}

impl WorkflowExecutor {
    pub fn new(registry: Arc<NodeRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    /// Execute `definition` against `ctx`.
    ///
    /// Every lifecycle event goes to `events`; a disabled emitter makes this
    /// a batch run. When `recorder` is given, one node execution record is
    /// written per node and per transition. The returned error is reserved
    /// for recorder failures; node and definition failures are reported in
    /// the result.
    pub async fn execute(
        &self,
        definition: &WorkflowDefinition,
        mut ctx: ExecutionContext,
        events: &EventEmitter,
        cancellation: CancellationToken,
        recorder: Option<&dyn ExecutionRepository>,
    ) -> Result<ExecutionResult, FlowError> {
        let started = Instant::now();
        tracing::info!(
            "Starting execution {} of workflow {}",
            ctx.execution_id,
            definition.id
        );

        let plan = match self.plan(definition) {
            Ok(plan) => plan,
            Err(e) => {
                tracing::error!("Execution {} cannot begin: {}", ctx.execution_id, e);
                events.emit(ExecutionEvent::Error { message: e.to_string() }).await;
                return Ok(ExecutionResult::failed(ctx.into_variables(), Vec::new(), e.to_string()));
            }
        };

        // A budget too large to represent as an instant means no deadline
        let deadline = definition.config.max_execution_time.and_then(|secs| {
            tokio::time::Instant::now()
                .checked_add(Duration::from_secs(secs))
                .map(|at| (secs, at))
        });
        let mut executed = Vec::with_capacity(plan.len());

        for planned in &plan {
            let node_def = planned.definition;

            if cancellation.is_cancelled() {
                tracing::info!("Execution {} cancelled before node {}", ctx.execution_id, node_def.id);
                let variables = ctx.into_variables();
                events
                    .emit(ExecutionEvent::Cancelled {
                        variables: variables.clone(),
                    })
                    .await;
                return Ok(ExecutionResult::cancelled(variables, executed));
            }

            events
                .emit(ExecutionEvent::NodeStarted {
                    node_id: node_def.id.clone(),
                    node_name: node_def.name.clone(),
                    node_type: node_def.node_type.clone(),
                })
                .await;

            let input = NodeInput::new(ctx.variables().clone(), node_def.config.clone());
            let mut record = NodeExecutionRecord::pending(
                ctx.execution_id.clone(),
                node_def.id.clone(),
                node_def.name.clone(),
                node_def.node_type.clone(),
            );
            record.start(&input.data);
            if let Some(repo) = recorder {
                repo.save_node_execution(&record).await?;
            }

            let node_started = Instant::now();
            let result = {
                let node_ctx =
                    NodeContext::new(&node_def.id, &ctx, events).with_cancellation(cancellation.child_token());
                let fut = planned.node.execute(input, &node_ctx);
                match deadline {
                    Some((secs, at)) => match timeout_at(at, fut).await {
                        Ok(result) => result,
                        Err(_) => Err(NodeError::Timeout { seconds: secs }),
                    },
                    None => fut.await,
                }
            };
            executed.push(node_def.id.clone());

            let failure = match result {
                Ok(output) if output.status == NodeStatus::Failed => {
                    Err(NodeError::ExecutionFailed(
                        output.error.unwrap_or_else(|| "node reported failure".to_string()),
                    ))
                }
                Ok(output) => Ok(output),
                Err(e) => Err(e),
            };

            match failure {
                Ok(output) => {
                    tracing::info!(
                        "Node {} completed in {}ms",
                        node_def.id,
                        node_started.elapsed().as_millis()
                    );
                    if output.status == NodeStatus::Skipped {
                        tracing::debug!("Node {} skipped; outputs not merged", node_def.id);
                    } else {
                        ctx.record_output(node_def.id.clone(), &output.outputs);
                    }
                    record.finish(output.status, &output.outputs);
                    if let Some(repo) = recorder {
                        repo.save_node_execution(&record).await?;
                    }
                    events
                        .emit(ExecutionEvent::NodeCompleted {
                            node_id: node_def.id.clone(),
                            node_name: node_def.name.clone(),
                            outputs: output.outputs,
                        })
                        .await;
                }
                Err(NodeError::Cancelled) if cancellation.is_cancelled() => {
                    tracing::info!("Node {} stopped by cancellation", node_def.id);
                    record.fail(NodeError::Cancelled.to_string());
                    if let Some(repo) = recorder {
                        repo.save_node_execution(&record).await?;
                    }
                    let variables = ctx.into_variables();
                    events
                        .emit(ExecutionEvent::Cancelled {
                            variables: variables.clone(),
                        })
                        .await;
                    return Ok(ExecutionResult::cancelled(variables, executed));
                }
                Err(e) => {
                    tracing::error!("Node {} failed: {}", node_def.id, e);
                    record.fail(e.to_string());
                    if let Some(repo) = recorder {
                        repo.save_node_execution(&record).await?;
                    }
                    events
                        .emit(ExecutionEvent::NodeFailed {
                            node_id: node_def.id.clone(),
                            node_name: node_def.name.clone(),
                            error: e.to_string(),
                        })
                        .await;
                    let message = format!("Node {} failed: {}", node_def.id, e);
                    return Ok(ExecutionResult::failed(ctx.into_variables(), executed, message));
                }
            }
        }

        tracing::info!(
            "Execution {} completed {} nodes in {}ms",
            ctx.execution_id,
            executed.len(),
            started.elapsed().as_millis()
        );
        let variables = ctx.into_variables();
        events
            .emit(ExecutionEvent::Completed {
                variables: variables.clone(),
            })
            .await;
        Ok(ExecutionResult::completed(variables, executed))
    }

    /// Validate the definition and resolve every node, in execution order.
    fn plan<'a>(&self, definition: &'a WorkflowDefinition) -> Result<Vec<PlannedNode<'a>>, WorkflowError> {
        validator::validate(definition).into_result()?;

        let graph = WorkflowGraph::build(definition);
        let order = graph.topological_order()?;
        let by_id: HashMap<&str, &NodeDefinition> = definition.nodes.iter().map(|n| (n.id.as_str(), n)).collect();

        order
            .into_iter()
            .map(|id| {
                let node_def = *by_id
                    .get(id)
                    .ok_or_else(|| WorkflowError::NodeNotFound(id.to_string()))?;
                let node = self.registry.lookup(&node_def.node_type)?;
                Ok(PlannedNode {
                    definition: node_def,
                    node,
                })
            })
            .collect()
    }
}

/// Final state of one run.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub status: RunStatus,
    pub variables: ValueMap,
    /// Nodes that were started, in order.
    pub executed: Vec<NodeId>,
    pub error: Option<String>,
}

impl ExecutionResult {
    fn completed(variables: ValueMap, executed: Vec<NodeId>) -> Self {
        Self {
            status: RunStatus::Completed,
            variables,
            executed,
            error: None,
        }
    }

    fn failed(variables: ValueMap, executed: Vec<NodeId>, error: String) -> Self {
        Self {
            status: RunStatus::Failed,
            variables,
            executed,
            error: Some(error),
        }
    }

    fn cancelled(variables: ValueMap, executed: Vec<NodeId>) -> Self {
        Self {
            status: RunStatus::Cancelled,
            variables,
            executed,
            error: None,
        }
    }
}
