use aiflow_core::{CollaboratorError, CompletionChunk, CompletionRequest, CompletionService, CompletionStream};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt::Display;
use std::pin::Pin;

const SERVICE: &str = "completion";

/// OpenAI-compatible streaming chat client. Works with any endpoint that
/// speaks `/v1/chat/completions` with `stream: true`.
pub struct OpenAiCompletion {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl OpenAiCompletion {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key,
        }
    }

    fn endpoint(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        if base.ends_with("/v1") {
            format!("{}/chat/completions", base)
        } else {
            format!("{}/v1/chat/completions", base)
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f64,
    max_tokens: u32,
    stream: bool,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Option<StreamDelta>,
}

#[derive(Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning_content: Option<String>,
}

#[async_trait]
impl CompletionService for OpenAiCompletion {
    async fn stream_completion(&self, request: CompletionRequest) -> Result<CompletionStream, CollaboratorError> {
        let mut messages = Vec::new();
        if let Some(system) = request.system_prompt.as_deref() {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: &request.prompt,
        });
        let body = ChatRequest {
            model: &request.model_id,
            messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            stream: true,
        };

        tracing::info!("Sending completion request for model {}", request.model_id);
        let mut builder = self.http.post(self.endpoint()).json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder
            .send()
            .await
            .map_err(|e| CollaboratorError::new(SERVICE, format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_else(|_| "unknown".to_string());
            return Err(CollaboratorError::new(SERVICE, format!("HTTP {}: {}", status, body)));
        }

        Ok(sse_chunks(response.bytes_stream()))
    }
}

struct SseState<S> {
    bytes: Pin<Box<S>>,
    buffer: Vec<u8>,
    pending: VecDeque<Result<CompletionChunk, CollaboratorError>>,
    done: bool,
}

impl<S> SseState<S> {
    /// Consume every complete line in the buffer.
    fn drain_lines(&mut self) {
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            let Some(data) = line.trim_end().strip_prefix("data:") else {
                continue;
            };
            let data = data.trim_start();
            if data == "[DONE]" {
                tracing::debug!("Completion stream finished");
                self.done = true;
                self.buffer.clear();
                return;
            }
            self.pending.extend(parse_data(data).into_iter().map(Ok));
        }
    }
}

/// Turn a raw `text/event-stream` body into completion chunks. The stream
/// ends at `data: [DONE]` or when the body ends.
pub fn sse_chunks<S, B, E>(bytes: S) -> CompletionStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: Display + Send,
{
    let state = SseState {
        bytes: Box::pin(bytes),
        buffer: Vec::new(),
        pending: VecDeque::new(),
        done: false,
    };

    let stream = futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.done {
                return None;
            }
            match state.bytes.next().await {
                Some(Ok(bytes)) => {
                    state.buffer.extend_from_slice(bytes.as_ref());
                    state.drain_lines();
                }
                Some(Err(e)) => {
                    state.done = true;
                    state
                        .pending
                        .push_back(Err(CollaboratorError::new(SERVICE, format!("stream failed: {}", e))));
                }
                None => {
                    state.buffer.push(b'\n');
                    state.drain_lines();
                    state.done = true;
                }
            }
        }
    });

    Box::pin(stream)
}

fn parse_data(data: &str) -> Vec<CompletionChunk> {
    let chunk: StreamChunk = match serde_json::from_str(data) {
        Ok(chunk) => chunk,
        Err(e) => {
            tracing::warn!("Skipping unparsable stream chunk: {}", e);
            return Vec::new();
        }
    };

    let mut out = Vec::new();
    for delta in chunk.choices.into_iter().take(1).filter_map(|c| c.delta) {
        if let Some(reasoning) = delta.reasoning_content.filter(|s| !s.is_empty()) {
            out.push(CompletionChunk::Reasoning(reasoning));
        }
        if let Some(content) = delta.content.filter(|s| !s.is_empty()) {
            out.push(CompletionChunk::Content(content));
        }
    }
    out
}
