use aiflow_core::{
    Node, NodeContext, NodeError, NodeInput, NodeMetadata, NodeOutput, NodeParameter, RetrievedSnippet, Retriever,
    ValueExt, ValueMap,
};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

pub const DEFAULT_TOP_K: usize = 5;
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";
const FILTERED_PREVIEW_CHARS: usize = 100;

/// Retrieves ranked snippets from one or more corpora.
///
/// Reads `query` (falling back to `input`) from the run variables and
/// `knowledgeBaseIds` / `knowledgeBaseId`, `topK` and
/// `similarityThreshold` from its config. With no ids configured every
/// known corpus is searched.
pub struct KnowledgeBaseNode {
    retriever: Arc<dyn Retriever>,
    default_embedding_model: String,
}

impl KnowledgeBaseNode {
    pub fn new(retriever: Arc<dyn Retriever>) -> Self {
        Self {
            retriever,
            default_embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
        }
    }

    pub fn with_default_embedding_model(mut self, model: impl Into<String>) -> Self {
        self.default_embedding_model = model.into();
        self
    }

    fn corpus_ids(config: &ValueMap) -> Vec<String> {
        config
            .get("knowledgeBaseIds")
            .filter(|v| !v.is_null())
            .or_else(|| config.get("knowledgeBaseId"))
            .map(|v| v.as_id_list())
            .unwrap_or_default()
    }

    /// The first requested corpus decides the embedding model.
    async fn embedding_model(&self, corpus_ids: &[String]) -> String {
        let Some(first) = corpus_ids.first() else {
            return self.default_embedding_model.clone();
        };
        match self.retriever.list_corpora().await {
            Ok(corpora) => corpora
                .into_iter()
                .find(|c| &c.id == first)
                .and_then(|c| c.embedding_model)
                .unwrap_or_else(|| self.default_embedding_model.clone()),
            Err(e) => {
                tracing::warn!("Failed to look up embedding model for corpus {}: {}", first, e);
                self.default_embedding_model.clone()
            }
        }
    }
}

#[async_trait]
impl Node for KnowledgeBaseNode {
    fn node_type(&self) -> &str {
        "knowledge_base"
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::new("knowledge_base", "Knowledge base")
            .description("Retrieves relevant passages from knowledge bases")
            .category("ai")
            .icon("database")
            .parameter(
                NodeParameter::new("knowledgeBaseIds", "Knowledge bases", "array")
                    .describe("Leave empty to search every knowledge base"),
            )
            .parameter(NodeParameter::new("topK", "Result count", "number").default_value(DEFAULT_TOP_K))
            .parameter(
                NodeParameter::new("similarityThreshold", "Similarity threshold", "number")
                    .describe("Results scoring below this are dropped; 0 keeps everything")
                    .default_value(0.0),
            )
            .ports(&["input"], &["output"])
    }

    async fn execute(&self, input: NodeInput, ctx: &NodeContext<'_>) -> Result<NodeOutput, NodeError> {
        let query = input.data_str(&["query", "input"]).unwrap_or_default().to_string();
        let top_k = input
            .config_f64("topK")
            .filter(|k| *k >= 1.0)
            .map(|k| k as usize)
            .unwrap_or(DEFAULT_TOP_K);
        let threshold = input.config_f64("similarityThreshold").unwrap_or(0.0);

        let mut corpus_ids = Self::corpus_ids(&input.config);
        if corpus_ids.is_empty() {
            corpus_ids = self
                .retriever
                .list_corpora()
                .await?
                .into_iter()
                .map(|c| c.id)
                .collect();
            tracing::info!("No knowledge base configured on {}; searching all: {:?}", ctx.node_id, corpus_ids);
        }
        if corpus_ids.is_empty() {
            tracing::warn!("No knowledge bases available for node {}", ctx.node_id);
            return Ok(NodeOutput::new()
                .with_output("results", json!([]))
                .with_output("context", ""));
        }

        let embedding_model = self.embedding_model(&corpus_ids).await;
        tracing::info!(
            "Knowledge base query on {}: corpora={:?} topK={} threshold={} model={}",
            ctx.node_id,
            corpus_ids,
            top_k,
            threshold,
            embedding_model
        );

        let retrieved = self
            .retriever
            .retrieve(&query, &corpus_ids, top_k, &embedding_model)
            .await?;
        let total_retrieved = retrieved.len();

        let (kept, filtered_out): (Vec<RetrievedSnippet>, Vec<RetrievedSnippet>) = if threshold > 0.0 {
            retrieved.into_iter().partition(|s| s.score >= threshold)
        } else {
            (retrieved, Vec::new())
        };
        tracing::debug!(
            "Retrieved {} snippets, {} kept after threshold {}",
            total_retrieved,
            kept.len(),
            threshold
        );

        let results: Vec<_> = kept
            .iter()
            .map(|s| {
                json!({
                    "content": s.content,
                    "documentName": s.source_doc_name,
                    "documentId": s.source_doc_id,
                    "score": s.score,
                })
            })
            .collect();
        let context = kept
            .iter()
            .map(|s| s.content.as_str())
            .collect::<Vec<_>>()
            .join(CONTEXT_SEPARATOR);

        let mut output = NodeOutput::new()
            .with_output("results", results)
            .with_output("context", context)
            .with_output("query", query)
            .with_output(
                "_stats",
                json!({
                    "totalRetrieved": total_retrieved,
                    "afterFilter": kept.len(),
                    "filteredOut": filtered_out.len(),
                    "threshold": threshold,
                    "topK": top_k,
                }),
            );

        if !filtered_out.is_empty() {
            let dropped: Vec<_> = filtered_out
                .iter()
                .map(|s| {
                    json!({
                        "content": preview(&s.content),
                        "documentName": s.source_doc_name,
                        "score": s.score,
                        "reason": format!("similarity {:.2} below threshold {:.2}", s.score, threshold),
                    })
                })
                .collect();
            output = output.with_output("_filteredOut", dropped);
        }

        Ok(output)
    }
}

fn preview(content: &str) -> String {
    if content.chars().count() > FILTERED_PREVIEW_CHARS {
        let head: String = content.chars().take(FILTERED_PREVIEW_CHARS).collect();
        format!("{}...", head)
    } else {
        content.to_string()
    }
}
