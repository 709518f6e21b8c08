//! In-process collaborators for offline runs and tests.

use aiflow_core::{
    CollaboratorError, CompletionChunk, CompletionRequest, CompletionService, CompletionStream, Corpus,
    RetrievedSnippet, Retriever,
};
use async_trait::async_trait;
use std::sync::Mutex;

/// Arguments of one `retrieve` call, as seen by a [`StaticRetriever`].
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalCall {
    pub query: String,
    pub corpus_ids: Vec<String>,
    pub top_k: usize,
    pub embedding_model: String,
}

/// Retriever over a fixed corpus list and a fixed result set.
#[derive(Default)]
pub struct StaticRetriever {
    corpora: Vec<Corpus>,
    snippets: Vec<RetrievedSnippet>,
    failure: Option<String>,
    calls: Mutex<Vec<RetrievalCall>>,
}

impl StaticRetriever {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_corpus(mut self, id: impl Into<String>, embedding_model: Option<&str>) -> Self {
        let id = id.into();
        self.corpora.push(Corpus {
            name: id.clone(),
            id,
            embedding_model: embedding_model.map(str::to_string),
        });
        self
    }

    pub fn with_snippet(mut self, content: impl Into<String>, doc: impl Into<String>, score: f64) -> Self {
        let doc = doc.into();
        self.snippets.push(RetrievedSnippet {
            content: content.into(),
            source_doc_id: doc.clone(),
            source_doc_name: doc,
            score,
        });
        self
    }

    /// Make every `retrieve` call fail with `message`.
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    pub fn calls(&self) -> Vec<RetrievalCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Retriever for StaticRetriever {
    async fn retrieve(
        &self,
        query: &str,
        corpus_ids: &[String],
        top_k: usize,
        embedding_model: &str,
    ) -> Result<Vec<RetrievedSnippet>, CollaboratorError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(RetrievalCall {
                query: query.to_string(),
                corpus_ids: corpus_ids.to_vec(),
                top_k,
                embedding_model: embedding_model.to_string(),
            });
        }
        if let Some(message) = &self.failure {
            return Err(CollaboratorError::new("retrieval", message.clone()));
        }

        let mut snippets = self.snippets.clone();
        snippets.sort_by(|a, b| b.score.total_cmp(&a.score));
        snippets.truncate(top_k);
        Ok(snippets)
    }

    async fn list_corpora(&self) -> Result<Vec<Corpus>, CollaboratorError> {
        Ok(self.corpora.clone())
    }
}

enum Script {
    Chunks(Vec<CompletionChunk>),
    Echo,
    Fail(String),
}

/// Completion service that replays a script instead of calling a model.
pub struct ScriptedCompletion {
    script: Script,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedCompletion {
    /// Stream the given content tokens.
    pub fn tokens(tokens: &[&str]) -> Self {
        Self::chunks(tokens.iter().map(|t| CompletionChunk::Content(t.to_string())).collect())
    }

    pub fn chunks(chunks: Vec<CompletionChunk>) -> Self {
        Self::with_script(Script::Chunks(chunks))
    }

    /// Stream the resolved prompt back, one word per token.
    pub fn echo() -> Self {
        Self::with_script(Script::Echo)
    }

    /// Refuse every request with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self::with_script(Script::Fail(message.into()))
    }

    fn with_script(script: Script) -> Self {
        Self {
            script,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl CompletionService for ScriptedCompletion {
    async fn stream_completion(&self, request: CompletionRequest) -> Result<CompletionStream, CollaboratorError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }

        let chunks: Vec<Result<CompletionChunk, CollaboratorError>> = match &self.script {
            Script::Chunks(chunks) => chunks.iter().cloned().map(Ok).collect(),
            Script::Echo => request
                .prompt
                .split_inclusive(' ')
                .map(|word| Ok(CompletionChunk::Content(word.to_string())))
                .collect(),
            Script::Fail(message) => return Err(CollaboratorError::new("completion", message.clone())),
        };
        Ok(Box::pin(futures::stream::iter(chunks)))
    }
}
