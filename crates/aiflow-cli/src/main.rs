use aiflow_core::{
    CompletionService, ExecutionCallback, NodeDefinition, Retriever, RunStatus, TokenKind, ValueMap, WorkflowDefinition,
};
use aiflow_nodes::mock::{ScriptedCompletion, StaticRetriever};
use aiflow_nodes::{HttpRetriever, NodeServices, OpenAiCompletion};
use aiflow_runtime::FlowRuntime;
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "aiflow")]
#[command(about = "AI workflow engine CLI", long_about = None)]
struct Cli {
    /// Show debug logs
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a workflow file
    Run {
        /// Path to workflow JSON file
        #[arg(short, long)]
        file: PathBuf,

        /// Input data as a JSON object
        #[arg(short, long)]
        input: Option<String>,

        /// Print node events and LLM tokens as they happen
        #[arg(short, long)]
        stream: bool,

        #[command(flatten)]
        services: ServiceArgs,
    },

    /// Validate a workflow file
    Validate {
        /// Path to workflow JSON file
        file: PathBuf,
    },

    /// List available node types
    Nodes,

    /// Create a new example workflow
    Init {
        /// Output file path
        #[arg(short, long, default_value = "workflow.json")]
        output: PathBuf,
    },
}

#[derive(Args)]
struct ServiceArgs {
    /// OpenAI-compatible completion endpoint
    #[arg(long, env = "AIFLOW_BASE_URL", default_value = "https://api.openai.com")]
    base_url: String,

    /// API key for the completion endpoint
    #[arg(long, env = "AIFLOW_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Retrieval service endpoint; without it no corpora are available
    #[arg(long, env = "AIFLOW_RETRIEVAL_URL")]
    retrieval_url: Option<String>,

    /// Answer LLM prompts by echoing them instead of calling a model
    #[arg(long)]
    offline: bool,
}

impl ServiceArgs {
    fn node_services(&self) -> NodeServices {
        let retriever: Arc<dyn Retriever> = match &self.retrieval_url {
            Some(url) => Arc::new(HttpRetriever::new(url.clone())),
            None => Arc::new(StaticRetriever::new()),
        };
        let completion: Arc<dyn CompletionService> = if self.offline {
            Arc::new(ScriptedCompletion::echo())
        } else {
            Arc::new(OpenAiCompletion::new(self.base_url.clone(), self.api_key.clone()))
        };
        NodeServices::new(retriever, completion)
    }
}

/// Services for commands that inspect nodes without running them.
fn offline_services() -> NodeServices {
    NodeServices::new(Arc::new(StaticRetriever::new()), Arc::new(ScriptedCompletion::echo()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    match cli.command {
        Commands::Run {
            file,
            input,
            stream,
            services,
        } => {
            run_workflow(&file, input.as_deref(), stream, &services).await?;
        }

        Commands::Validate { file } => {
            validate_workflow(&file)?;
        }

        Commands::Nodes => {
            list_nodes();
        }

        Commands::Init { output } => {
            create_example_workflow(&output)?;
        }
    }

    Ok(())
}

fn load_definition(file: &Path) -> Result<WorkflowDefinition> {
    let text = std::fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
    let definition = WorkflowDefinition::from_json(&text)?;
    tracing::debug!("Loaded definition {} from {}", definition.id, file.display());
    Ok(definition)
}

fn parse_input(input: Option<&str>) -> Result<ValueMap> {
    match input {
        None => Ok(ValueMap::new()),
        Some(text) => match serde_json::from_str::<serde_json::Value>(text)? {
            serde_json::Value::Object(obj) => Ok(obj.into_iter().collect()),
            _ => Err(anyhow::anyhow!("Input must be a JSON object")),
        },
    }
}

async fn run_workflow(file: &Path, input: Option<&str>, stream: bool, services: &ServiceArgs) -> Result<()> {
    let definition = load_definition(file)?;
    let input = parse_input(input)?;

    println!("Workflow: {}", definition.name);
    println!("   Nodes: {}", definition.nodes.len());
    println!("   Edges: {}", definition.edges.len());
    println!();

    let registry = aiflow_nodes::builtin_registry(&services.node_services());
    let runtime = FlowRuntime::new(registry);

    if stream {
        let mut printer = ConsolePrinter::default();
        runtime
            .execute_definition_streaming(definition, input)
            .await
            .forward_to(&mut printer)
            .await;
        if printer.failed {
            anyhow::bail!("workflow failed");
        }
        return Ok(());
    }

    let run = runtime.execute_definition(&definition, input).await?;
    println!("Execution Summary:");
    println!("   Execution ID: {}", run.id);
    println!("   Status: {:?}", run.status);
    if let Some(end) = run.end_time {
        println!("   Duration: {}ms", (end - run.start_time).num_milliseconds());
    }
    if let Some(output) = &run.output {
        println!();
        println!("Variables:");
        println!("{}", serde_json::to_string_pretty(output)?);
    }

    match run.status {
        RunStatus::Completed => Ok(()),
        _ => Err(anyhow::anyhow!(run.error.unwrap_or_else(|| "workflow did not complete".to_string()))),
    }
}

/// Prints a streaming run as it happens.
#[derive(Default)]
struct ConsolePrinter {
    in_tokens: bool,
    failed: bool,
}

impl ConsolePrinter {
    fn end_tokens(&mut self) {
        if self.in_tokens {
            println!();
            self.in_tokens = false;
        }
    }
}

impl ExecutionCallback for ConsolePrinter {
    fn on_node_start(&mut self, node_id: &str, node_name: &str, node_type: &str) {
        self.end_tokens();
        println!("  > {} [{}] ({})", node_name, node_id, node_type);
    }

    fn on_node_complete(&mut self, node_id: &str, _node_name: &str, output: &ValueMap) {
        self.end_tokens();
        let mut keys: Vec<&str> = output.keys().map(String::as_str).collect();
        keys.sort();
        println!("  ok {} -> {}", node_id, keys.join(", "));
    }

    fn on_node_error(&mut self, node_id: &str, _node_name: &str, error: &str) {
        self.end_tokens();
        self.failed = true;
        println!("  FAILED {}: {}", node_id, error);
    }

    fn on_llm_token(&mut self, _node_id: &str, token: &str, kind: TokenKind) {
        if !self.in_tokens {
            print!("    ");
            self.in_tokens = true;
        }
        match kind {
            TokenKind::Content => print!("{}", token),
            TokenKind::Reasoning => print!("\x1b[2m{}\x1b[0m", token),
        }
        let _ = std::io::stdout().flush();
    }

    fn on_complete(&mut self, variables: &ValueMap) {
        self.end_tokens();
        println!();
        println!("Workflow completed. Variables:");
        match serde_json::to_string_pretty(variables) {
            Ok(text) => println!("{}", text),
            Err(e) => println!("<unprintable: {}>", e),
        }
    }

    fn on_error(&mut self, message: &str) {
        self.end_tokens();
        self.failed = true;
        println!("Workflow could not start: {}", message);
    }

    fn on_cancelled(&mut self, _variables: &ValueMap) {
        self.end_tokens();
        self.failed = true;
        println!("Workflow cancelled");
    }
}

fn validate_workflow(file: &Path) -> Result<()> {
    println!("Validating workflow: {}", file.display());

    let definition = load_definition(file)?;
    let registry = aiflow_nodes::builtin_registry(&offline_services());
    let report = registry.validate_definition(&definition);

    for warning in &report.warnings {
        println!("   warning: {}", warning);
    }
    for error in &report.errors {
        println!("   error: {}", error);
    }

    if !report.is_valid() {
        anyhow::bail!("{} validation error(s)", report.errors.len());
    }

    println!("Workflow is valid:");
    println!("   Name: {}", definition.name);
    println!("   Nodes: {}", definition.nodes.len());
    println!("   Edges: {}", definition.edges.len());
    Ok(())
}

fn list_nodes() {
    println!("Available Node Types:");
    println!();

    let registry = aiflow_nodes::builtin_registry(&offline_services());
    for metadata in registry.all_metadata() {
        println!("  * {} ({})", metadata.node_type, metadata.category);
        println!("    {}", metadata.description);
        for param in &metadata.parameters {
            let required = if param.required { ", required" } else { "" };
            println!("      - {}: {}{}", param.name, param.param_type, required);
        }
    }
}

fn example_workflow() -> WorkflowDefinition {
    let mut workflow = WorkflowDefinition::new("Knowledge base Q&A");
    workflow.description = Some("Answers a question using retrieved context".to_string());

    workflow.add_node(
        NodeDefinition::new("start", "start")
            .with_name("Start")
            .with_config("fields", json!(["question"]))
            .with_position(100.0, 100.0),
    );
    workflow.add_node(
        NodeDefinition::new("search", "knowledge_base")
            .with_name("Search")
            .with_config("topK", 3)
            .with_position(300.0, 100.0),
    );
    workflow.add_node(
        NodeDefinition::new("answer", "llm")
            .with_name("Answer")
            .with_config("modelId", "gpt-4o-mini")
            .with_config(
                "prompt",
                "Context:\n{{search.context}}\n\nQuestion: {{question}}",
            )
            .with_position(500.0, 100.0),
    );
    workflow.add_node(
        NodeDefinition::new("end", "output")
            .with_name("Output")
            .with_config("fields", json!(["response"]))
            .with_position(700.0, 100.0),
    );

    workflow.connect("start", "search");
    workflow.connect("search", "answer");
    workflow.connect("answer", "end");
    workflow
}

fn create_example_workflow(output: &Path) -> Result<()> {
    let json = example_workflow().to_json()?;
    std::fs::write(output, json)?;

    println!("Created example workflow: {}", output.display());
    println!();
    println!("Run it with:");
    println!(
        "  aiflow run --file {} --input '{{\"question\": \"What is Rust?\"}}' --stream --offline",
        output.display()
    );

    Ok(())
}
