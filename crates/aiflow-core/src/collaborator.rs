//! External services called by node implementations.

use crate::CollaboratorError;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

/// A named document collection known to the retrieval service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Corpus {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,
}

/// One ranked retrieval hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievedSnippet {
    pub content: String,
    pub source_doc_id: String,
    pub source_doc_name: String,
    pub score: f64,
}

#[async_trait]
pub trait Retriever: Send + Sync {
    /// Ranked snippets, highest score first.
    async fn retrieve(
        &self,
        query: &str,
        corpus_ids: &[String],
        top_k: usize,
        embedding_model: &str,
    ) -> Result<Vec<RetrievedSnippet>, CollaboratorError>;

    /// Every corpus available for retrieval.
    async fn list_corpora(&self) -> Result<Vec<Corpus>, CollaboratorError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionRequest {
    pub model_id: String,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    pub temperature: f64,
    pub max_tokens: u32,
}

/// A piece of a streamed completion. Reasoning text travels on its own
/// channel and is never part of the final response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionChunk {
    Content(String),
    Reasoning(String),
}

pub type CompletionStream = BoxStream<'static, Result<CompletionChunk, CollaboratorError>>;

#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Start a streamed completion. The stream's end is the end-of-stream
    /// signal.
    async fn stream_completion(&self, request: CompletionRequest) -> Result<CompletionStream, CollaboratorError>;
}
