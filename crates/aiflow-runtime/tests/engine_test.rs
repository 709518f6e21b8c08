use aiflow_core::{
    ExecutionCallback, ExecutionEvent, ExecutionRepository, FlowError, Node, NodeContext, NodeDefinition, NodeError,
    NodeExecutionRecord, NodeInput, NodeMetadata, NodeOutput, NodeStatus, RunRecord, RunStatus, TokenKind, ValueMap,
    WorkflowDefinition, WorkflowError, WorkflowRecord, WorkflowStatus,
};
use aiflow_nodes::mock::{ScriptedCompletion, StaticRetriever};
use aiflow_nodes::NodeServices;
use aiflow_runtime::{FlowRuntime, InMemoryExecutionRepository, InMemoryWorkflowRepository, RuntimeConfig};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

/// Outputs the object in its `values` config entry.
struct SetNode;

#[async_trait]
impl Node for SetNode {
    fn node_type(&self) -> &str {
        "set"
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::new("set", "Set")
    }

    async fn execute(&self, input: NodeInput, _ctx: &NodeContext<'_>) -> Result<NodeOutput, NodeError> {
        let values = match input.config.get("values") {
            Some(Value::Object(obj)) => obj.clone().into_iter().collect(),
            _ => ValueMap::new(),
        };
        Ok(NodeOutput::completed(values))
    }
}

struct FailNode;

#[async_trait]
impl Node for FailNode {
    fn node_type(&self) -> &str {
        "fail"
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::new("fail", "Fail")
    }

    async fn execute(&self, _input: NodeInput, _ctx: &NodeContext<'_>) -> Result<NodeOutput, NodeError> {
        Err(NodeError::ExecutionFailed("boom".to_string()))
    }
}

/// Blocks until the run is cancelled, then completes normally.
struct WaitNode;

#[async_trait]
impl Node for WaitNode {
    fn node_type(&self) -> &str {
        "wait"
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::new("wait", "Wait")
    }

    async fn execute(&self, _input: NodeInput, ctx: &NodeContext<'_>) -> Result<NodeOutput, NodeError> {
        ctx.cancellation.cancelled().await;
        Ok(NodeOutput::new().with_output("waited", true))
    }
}

struct SkipNode;

#[async_trait]
impl Node for SkipNode {
    fn node_type(&self) -> &str {
        "skip"
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::new("skip", "Skip")
    }

    async fn execute(&self, _input: NodeInput, _ctx: &NodeContext<'_>) -> Result<NodeOutput, NodeError> {
        Ok(NodeOutput::skipped().with_output("hidden", true))
    }
}

fn registry(tokens: &[&str]) -> aiflow_core::NodeRegistry {
    let services = NodeServices::new(
        Arc::new(StaticRetriever::new()),
        Arc::new(ScriptedCompletion::tokens(tokens)),
    );
    let mut registry = aiflow_nodes::builtin_registry(&services);
    registry.register(Arc::new(SetNode));
    registry.register(Arc::new(FailNode));
    registry.register(Arc::new(WaitNode));
    registry.register(Arc::new(SkipNode));
    registry
}

// Helper: runtime with the built-in nodes, scripted completion tokens and
// the test-only nodes above
fn runtime(tokens: &[&str]) -> FlowRuntime {
    FlowRuntime::new(registry(tokens))
}

async fn store(runtime: &FlowRuntime, definition: &WorkflowDefinition) -> String {
    let record =
        WorkflowRecord::new(definition.name.clone(), definition.to_json().unwrap()).with_id(definition.id.clone());
    runtime.workflows().create(record).await.unwrap();
    definition.id.clone()
}

fn set(id: &str, values: Value) -> NodeDefinition {
    NodeDefinition::new(id, "set").with_config("values", values)
}

fn input(value: Value) -> ValueMap {
    match value {
        Value::Object(obj) => obj.into_iter().collect(),
        _ => ValueMap::new(),
    }
}

fn linear(nodes: Vec<NodeDefinition>) -> WorkflowDefinition {
    let mut def = WorkflowDefinition::new("test");
    let ids: Vec<String> = nodes.iter().map(|n| n.id.clone()).collect();
    for node in nodes {
        def.add_node(node);
    }
    for pair in ids.windows(2) {
        def.connect(pair[0].clone(), pair[1].clone());
    }
    def
}

fn started_ids(events: &[ExecutionEvent]) -> Vec<&str> {
    events
        .iter()
        .filter_map(|e| match e {
            ExecutionEvent::NodeStarted { node_id, .. } => Some(node_id.as_str()),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_linear_workflow_runs_in_order_and_completes() {
    let runtime = runtime(&["hello"]);
    let def = linear(vec![
        NodeDefinition::new("start", "start"),
        NodeDefinition::new("llm", "llm")
            .with_config("modelId", "m")
            .with_config("prompt", "{{question}}"),
        NodeDefinition::new("output", "output").with_config("fields", json!(["response"])),
    ]);
    let id = store(&runtime, &def).await;

    let run = runtime.execute(&id, input(json!({"question": "hi"}))).await.unwrap();

    assert_eq!(run.status, RunStatus::Completed);
    let output = run.output.clone().unwrap();
    assert_eq!(output["response"], json!("hello"));
    assert_eq!(output["question"], json!("hi"));
    assert!(run.end_time.is_some());

    let stored = runtime.get_execution(&run.id).await.unwrap();
    assert_eq!(stored, run);

    let nodes = runtime.get_node_executions(&run.id).await.unwrap();
    let order: Vec<&str> = nodes.iter().map(|n| n.node_id.as_str()).collect();
    assert_eq!(order, vec!["start", "llm", "output"]);
    for node in &nodes {
        assert_eq!(node.status, NodeStatus::Completed);
        assert_eq!(node.retry_count, 0);
        assert!(node.start_time.is_some() && node.end_time.is_some());
    }
}

#[tokio::test]
async fn test_later_output_overwrites_earlier_variable() {
    let runtime = runtime(&[]);
    let def = linear(vec![set("a", json!({"x": 1})), set("b", json!({"x": 2}))]);

    let run = runtime.execute_definition(&def, ValueMap::new()).await.unwrap();

    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.output.unwrap()["x"], json!(2));
}

#[tokio::test]
async fn test_node_outputs_are_addressable_by_node_id() {
    let completion = Arc::new(ScriptedCompletion::tokens(&["done"]));
    let services = NodeServices::new(Arc::new(StaticRetriever::new()), completion.clone());
    let mut registry = aiflow_nodes::builtin_registry(&services);
    registry.register(Arc::new(SetNode));
    let runtime = FlowRuntime::new(registry);

    let def = linear(vec![
        set("a", json!({"x": "first"})),
        set("b", json!({"x": "second"})),
        NodeDefinition::new("llm", "llm")
            .with_config("modelId", "m")
            .with_config("prompt", "{{a.x}}/{{x}}"),
    ]);

    let run = runtime.execute_definition(&def, ValueMap::new()).await.unwrap();

    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(completion.requests()[0].prompt, "first/second");
}

#[tokio::test]
async fn test_streaming_llm_event_sequence() {
    let runtime = runtime(&["a", "b", "c"]);
    let mut def = WorkflowDefinition::new("one llm");
    def.add_node(
        NodeDefinition::new("llm", "llm")
            .with_name("LLM")
            .with_config("modelId", "m")
            .with_config("prompt", "p"),
    );
    let id = store(&runtime, &def).await;

    let events = runtime.execute_streaming(&id, ValueMap::new()).await.collect_all().await;

    let mut response = ValueMap::new();
    response.insert("response".into(), json!("abc"));
    let token = |t: &str| ExecutionEvent::LlmToken {
        node_id: "llm".into(),
        token: t.into(),
        kind: TokenKind::Content,
    };
    assert_eq!(
        events,
        vec![
            ExecutionEvent::NodeStarted {
                node_id: "llm".into(),
                node_name: "LLM".into(),
                node_type: "llm".into(),
            },
            token("a"),
            token("b"),
            token("c"),
            ExecutionEvent::NodeCompleted {
                node_id: "llm".into(),
                node_name: "LLM".into(),
                outputs: response.clone(),
            },
            ExecutionEvent::Completed { variables: response },
        ]
    );
}

#[derive(Default)]
struct Recorder {
    calls: Vec<String>,
}

impl ExecutionCallback for Recorder {
    fn on_node_start(&mut self, node_id: &str, _node_name: &str, _node_type: &str) {
        self.calls.push(format!("start:{}", node_id));
    }

    fn on_node_complete(&mut self, node_id: &str, _node_name: &str, _output: &ValueMap) {
        self.calls.push(format!("complete:{}", node_id));
    }

    fn on_node_error(&mut self, node_id: &str, _node_name: &str, error: &str) {
        self.calls.push(format!("error:{}:{}", node_id, error));
    }

    fn on_llm_token(&mut self, _node_id: &str, token: &str, _kind: TokenKind) {
        self.calls.push(format!("token:{}", token));
    }

    fn on_complete(&mut self, _variables: &ValueMap) {
        self.calls.push("done".to_string());
    }

    fn on_error(&mut self, message: &str) {
        self.calls.push(format!("fatal:{}", message));
    }
}

#[tokio::test]
async fn test_callback_receives_events_in_order() {
    let runtime = runtime(&["a", "b"]);
    let def = linear(vec![
        NodeDefinition::new("start", "start"),
        NodeDefinition::new("llm", "llm")
            .with_config("modelId", "m")
            .with_config("prompt", "p"),
    ]);
    let id = store(&runtime, &def).await;

    let mut recorder = Recorder::default();
    runtime
        .execute_with_callback(&id, ValueMap::new(), &mut recorder)
        .await
        .unwrap();

    assert_eq!(
        recorder.calls,
        vec!["start:start", "complete:start", "start:llm", "token:a", "token:b", "complete:llm", "done"]
    );
}

#[tokio::test]
async fn test_mid_run_failure_stops_remaining_nodes() {
    let runtime = runtime(&[]);
    let def = linear(vec![
        set("n1", json!({"kept": true})),
        NodeDefinition::new("n2", "fail"),
        set("n3", json!({"never": true})),
    ]);
    let id = store(&runtime, &def).await;

    let mut recorder = Recorder::default();
    let err = runtime
        .execute_with_callback(&id, ValueMap::new(), &mut recorder)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("boom"));
    assert_eq!(
        recorder.calls,
        vec!["start:n1", "complete:n1", "start:n2", "error:n2:Execution failed: boom"]
    );

    let run = runtime.execute(&id, ValueMap::new()).await.unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    assert!(run.error.as_deref().unwrap().contains("boom"));
    let nodes = runtime.get_node_executions(&run.id).await.unwrap();
    assert_eq!(nodes.len(), 2);
    assert_eq!(nodes[1].status, NodeStatus::Failed);
    assert_eq!(nodes[1].error.as_deref(), Some("Execution failed: boom"));
}

#[tokio::test]
async fn test_missing_definition_reports_single_error() {
    let runtime = runtime(&[]);

    let events = runtime
        .execute_streaming("does-not-exist", ValueMap::new())
        .await
        .collect_all()
        .await;
    assert_eq!(events.len(), 1);
    assert!(matches!(&events[0], ExecutionEvent::Error { message } if message.contains("does-not-exist")));

    let run = runtime.execute("does-not-exist", ValueMap::new()).await.unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    assert!(runtime.get_node_executions(&run.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unparsable_definition_reports_single_error() {
    let runtime = runtime(&[]);
    let record = WorkflowRecord::new("broken", "{ not json").with_id("broken");
    runtime.workflows().create(record).await.unwrap();

    let mut recorder = Recorder::default();
    let result = runtime
        .execute_with_callback("broken", ValueMap::new(), &mut recorder)
        .await;

    assert!(result.is_err());
    assert_eq!(recorder.calls.len(), 1);
    assert!(recorder.calls[0].starts_with("fatal:Invalid workflow definition"));

    let report = runtime.validate("broken").await.unwrap();
    assert!(!report.is_valid());
}

#[tokio::test]
async fn test_cyclic_definition_fails_before_any_node() {
    let runtime = runtime(&[]);
    let mut def = linear(vec![set("a", json!({})), set("b", json!({}))]);
    def.connect("b", "a");

    let run = runtime.execute_definition(&def, ValueMap::new()).await.unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    assert!(run.error.unwrap().contains("circular dependency"));

    let events = runtime
        .execute_definition_streaming(def, ValueMap::new())
        .await
        .collect_all()
        .await;
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], ExecutionEvent::Error { .. }));
}

#[tokio::test]
async fn test_unknown_node_type_fails_before_any_node() {
    let runtime = runtime(&[]);
    let def = linear(vec![set("a", json!({})), NodeDefinition::new("b", "mystery")]);

    let events = runtime
        .execute_definition_streaming(def, ValueMap::new())
        .await
        .collect_all()
        .await;
    assert_eq!(events.len(), 1);
    assert!(matches!(&events[0], ExecutionEvent::Error { message } if message.contains("mystery")));
}

#[tokio::test]
async fn test_cancel_stops_scheduling_and_keeps_variables() {
    let runtime = runtime(&[]);
    let def = linear(vec![
        set("first", json!({"a": 1})),
        NodeDefinition::new("wait", "wait"),
        set("after", json!({"b": 2})),
    ]);

    let mut stream = runtime.execute_definition_streaming(def, ValueMap::new()).await;
    let execution_id = stream.execution_id().to_string();

    let mut events = Vec::new();
    while let Some(event) = stream.recv().await {
        let waiting = matches!(&event, ExecutionEvent::NodeStarted { node_id, .. } if node_id == "wait");
        events.push(event);
        if waiting {
            assert!(runtime.cancel(&execution_id).await.unwrap());
        }
    }

    assert_eq!(started_ids(&events), vec!["first", "wait"]);
    match events.last() {
        Some(ExecutionEvent::Cancelled { variables }) => {
            assert_eq!(variables["a"], json!(1));
            assert_eq!(variables["waited"], json!(true));
            assert!(!variables.contains_key("b"));
        }
        other => panic!("expected cancelled event, got {:?}", other),
    }
    assert!(!events.iter().any(|e| matches!(e, ExecutionEvent::Completed { .. })));
}

#[tokio::test]
async fn test_cancel_unknown_execution_is_not_found() {
    let runtime = runtime(&[]);
    let err = runtime.cancel("nope").await.unwrap_err();
    assert!(matches!(err, FlowError::Workflow(WorkflowError::ExecutionNotFound(_))));

    let err = runtime.pause("nope").await.unwrap_err();
    assert!(matches!(err, FlowError::Workflow(WorkflowError::Unsupported(_))));
}

#[tokio::test]
async fn test_max_execution_time_fails_node_with_timeout() {
    let runtime = runtime(&[]);
    let mut def = linear(vec![NodeDefinition::new("wait", "wait"), set("after", json!({"b": 2}))]);
    def.config.max_execution_time = Some(1);

    let events = runtime
        .execute_definition_streaming(def, ValueMap::new())
        .await
        .collect_all()
        .await;

    assert_eq!(started_ids(&events), vec!["wait"]);
    assert!(matches!(
        events.last(),
        Some(ExecutionEvent::NodeFailed { node_id, error, .. }) if node_id == "wait" && error == "Timeout after 1s"
    ));
}

#[tokio::test]
async fn test_edges_with_conditions_are_not_pruned() {
    let runtime = runtime(&[]);
    let mut def = WorkflowDefinition::new("branching");
    def.add_node(NodeDefinition::new("cond", "condition").with_config("condition", "x > 1"));
    def.add_node(set("yes", json!({"took_true": true})));
    def.add_node(set("no", json!({"took_false": true})));
    def.connect("cond", "yes").with_condition("branch", "true");
    def.connect("cond", "no").with_condition("branch", "false");

    let run = runtime.execute_definition(&def, ValueMap::new()).await.unwrap();

    assert_eq!(run.status, RunStatus::Completed);
    let output = run.output.unwrap();
    assert_eq!(output["branch"], json!("true"));
    assert_eq!(output["took_true"], json!(true));
    assert_eq!(output["took_false"], json!(true));
}

#[tokio::test]
async fn test_global_variables_seed_context_and_input_wins() {
    let runtime = runtime(&[]);
    let def = linear(vec![NodeDefinition::new("start", "start")])
        .with_variable("lang", "en")
        .with_variable("tone", "formal");

    let run = runtime
        .execute_definition(&def, input(json!({"lang": "de"})))
        .await
        .unwrap();

    let output = run.output.unwrap();
    assert_eq!(output["lang"], json!("de"));
    assert_eq!(output["tone"], json!("formal"));
}

#[tokio::test]
async fn test_skipped_output_is_not_merged() {
    let runtime = runtime(&[]);
    let def = linear(vec![NodeDefinition::new("s", "skip"), set("after", json!({"b": 2}))]);

    let run = runtime.execute_definition(&def, ValueMap::new()).await.unwrap();

    let output = run.output.unwrap();
    assert!(output.get("hidden").is_none());
    assert_eq!(output["b"], json!(2));
}

#[tokio::test]
async fn test_preview_runs_are_not_persisted() {
    let runtime = runtime(&[]);
    let def = linear(vec![set("a", json!({"x": 1}))]);

    let run = runtime.execute_definition(&def, ValueMap::new()).await.unwrap();
    assert_eq!(run.status, RunStatus::Completed);

    let err = runtime.get_execution(&run.id).await.unwrap_err();
    assert!(matches!(err, FlowError::Workflow(WorkflowError::ExecutionNotFound(_))));
}

#[tokio::test]
async fn test_publish_requires_valid_definition() {
    let runtime = runtime(&[]);

    let good = linear(vec![
        NodeDefinition::new("start", "start"),
        NodeDefinition::new("llm", "llm")
            .with_config("modelId", "m")
            .with_config("prompt", "p"),
    ]);
    let good_id = store(&runtime, &good).await;
    let published = runtime.publish(&good_id).await.unwrap();
    assert_eq!(published.status, WorkflowStatus::Published);
    let drafted = runtime.unpublish(&good_id).await.unwrap();
    assert_eq!(drafted.status, WorkflowStatus::Draft);

    let bad = linear(vec![
        NodeDefinition::new("start", "start"),
        NodeDefinition::new("llm", "llm").with_config("modelId", "m"),
    ]);
    let bad_id = store(&runtime, &bad).await;
    match runtime.publish(&bad_id).await.unwrap_err() {
        FlowError::Workflow(WorkflowError::Validation(errors)) => {
            assert_eq!(
                errors,
                vec!["node `llm`: Configuration error: Required configuration 'prompt' is missing".to_string()]
            );
        }
        other => panic!("unexpected error: {:?}", other),
    }

    let record = runtime.workflows().get(&bad_id).await.unwrap().unwrap();
    assert_eq!(record.status, WorkflowStatus::Draft);
}

#[tokio::test]
async fn test_concurrent_runs_keep_separate_contexts() {
    let runtime = runtime(&[]);
    let def = linear(vec![NodeDefinition::new("start", "start")]);

    let a = runtime.execute_definition(&def, input(json!({"who": "a"})));
    let b = runtime.execute_definition(&def, input(json!({"who": "b"})));
    let (a, b) = tokio::join!(a, b);

    assert_eq!(a.unwrap().output.unwrap()["who"], json!("a"));
    assert_eq!(b.unwrap().output.unwrap()["who"], json!("b"));
}

#[tokio::test]
async fn test_unrepresentable_deadline_runs_without_limit() {
    let runtime = runtime(&[]);
    let mut def = linear(vec![set("a", json!({"x": 1}))]);
    def.config.max_execution_time = Some(u64::MAX);

    let run = runtime.execute_definition(&def, ValueMap::new()).await.unwrap();
    assert_eq!(run.status, RunStatus::Completed);

    let events = runtime
        .execute_definition_streaming(def, ValueMap::new())
        .await
        .collect_all()
        .await;
    assert!(matches!(events.last(), Some(ExecutionEvent::Completed { .. })));
    assert!(runtime.active_executions().await.is_empty());
}

/// Stores runs but refuses node execution records.
#[derive(Default)]
struct NodeRecordsFail {
    inner: InMemoryExecutionRepository,
    refused_run: std::sync::Mutex<Option<String>>,
}

#[async_trait]
impl ExecutionRepository for NodeRecordsFail {
    async fn save_run(&self, run: &RunRecord) -> Result<(), FlowError> {
        self.inner.save_run(run).await
    }

    async fn get_run(&self, id: &str) -> Result<Option<RunRecord>, FlowError> {
        self.inner.get_run(id).await
    }

    async fn save_node_execution(&self, record: &NodeExecutionRecord) -> Result<(), FlowError> {
        *self.refused_run.lock().unwrap() = Some(record.execution_id.clone());
        Err(FlowError::Repository("disk full".to_string()))
    }

    async fn node_executions(&self, execution_id: &str) -> Result<Vec<NodeExecutionRecord>, FlowError> {
        self.inner.node_executions(execution_id).await
    }
}

#[tokio::test]
async fn test_recorder_failure_marks_run_failed() {
    let executions = Arc::new(NodeRecordsFail::default());
    let runtime = FlowRuntime::with_repositories(
        Arc::new(registry(&[])),
        RuntimeConfig::default(),
        Arc::new(InMemoryWorkflowRepository::new()),
        executions.clone(),
    );
    let def = linear(vec![set("a", json!({"x": 1}))]);
    let id = store(&runtime, &def).await;

    let err = runtime.execute(&id, ValueMap::new()).await.unwrap_err();
    assert!(matches!(err, FlowError::Repository(ref msg) if msg == "disk full"));

    let run_id = executions.refused_run.lock().unwrap().clone().unwrap();
    let run = runtime.get_execution(&run_id).await.unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.error.as_deref(), Some("Repository error: disk full"));
    assert!(run.end_time.is_some());
    assert!(runtime.active_executions().await.is_empty());
}

#[tokio::test]
async fn test_queued_batch_run_can_be_cancelled() {
    let config = RuntimeConfig {
        max_concurrent_runs: 1,
        ..RuntimeConfig::default()
    };
    let runtime = FlowRuntime::with_config(registry(&[]), config);

    // Hold the only slot with a run that waits for cancellation
    let mut blocker = runtime
        .execute_definition_streaming(linear(vec![NodeDefinition::new("wait", "wait")]), ValueMap::new())
        .await;
    let blocker_id = blocker.execution_id().to_string();
    assert!(matches!(blocker.recv().await, Some(ExecutionEvent::NodeStarted { .. })));

    let queued = {
        let runtime = runtime.clone();
        let def = linear(vec![set("a", json!({"x": 1}))]);
        tokio::spawn(async move { runtime.execute_definition(&def, ValueMap::new()).await })
    };

    let queued_id = loop {
        let active = runtime.active_executions().await;
        if let Some(id) = active.into_iter().find(|id| *id != blocker_id) {
            break id;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    };

    assert!(runtime.cancel(&queued_id).await.unwrap());
    assert!(runtime.cancel(&blocker_id).await.unwrap());
    blocker.collect_all().await;

    let run = queued.await.unwrap().unwrap();
    assert_eq!(run.id, queued_id);
    assert_eq!(run.status, RunStatus::Cancelled);
    assert!(run.output.unwrap().get("x").is_none());
}
