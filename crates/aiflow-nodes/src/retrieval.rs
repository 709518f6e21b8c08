use aiflow_core::{CollaboratorError, Corpus, RetrievedSnippet, Retriever};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

const SERVICE: &str = "retrieval";

/// Retrieval service reached over HTTP.
///
/// `POST {base}/retrieve` with `{query, corpusIds, topK, embeddingModel}`
/// answers a ranked snippet list; `GET {base}/corpora` lists corpora.
pub struct HttpRetriever {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RetrieveRequest<'a> {
    query: &'a str,
    corpus_ids: &'a [String],
    top_k: usize,
    embedding_model: &'a str,
}

impl HttpRetriever {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn read<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, CollaboratorError> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_else(|_| "unknown".to_string());
            return Err(CollaboratorError::new(SERVICE, format!("HTTP {}: {}", status, body)));
        }
        response
            .json()
            .await
            .map_err(|e| CollaboratorError::new(SERVICE, format!("invalid response: {}", e)))
    }
}

#[async_trait]
impl Retriever for HttpRetriever {
    async fn retrieve(
        &self,
        query: &str,
        corpus_ids: &[String],
        top_k: usize,
        embedding_model: &str,
    ) -> Result<Vec<RetrievedSnippet>, CollaboratorError> {
        let request = RetrieveRequest {
            query,
            corpus_ids,
            top_k,
            embedding_model,
        };
        let response = self
            .http
            .post(format!("{}/retrieve", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| CollaboratorError::new(SERVICE, format!("request failed: {}", e)))?;

        let mut snippets: Vec<RetrievedSnippet> = Self::read(response).await?;
        snippets.sort_by(|a, b| b.score.total_cmp(&a.score));
        Ok(snippets)
    }

    async fn list_corpora(&self) -> Result<Vec<Corpus>, CollaboratorError> {
        let response = self
            .http
            .get(format!("{}/corpora", self.base_url))
            .send()
            .await
            .map_err(|e| CollaboratorError::new(SERVICE, format!("request failed: {}", e)))?;
        Self::read(response).await
    }
}
