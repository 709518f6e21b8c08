use crate::{ExecutionId, NodeId, ValueMap};
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

/// Which channel of a completion stream a token came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Content,
    Reasoning,
}

/// Lifecycle events of a streaming run, in the order they happen.
///
/// A stream ends with exactly one terminal event: `Completed`, `NodeFailed`,
/// `Cancelled` or `Error`. `Error` is only produced when the run could not
/// begin, so no node event precedes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutionEvent {
    #[serde(rename_all = "camelCase")]
    NodeStarted {
        node_id: NodeId,
        node_name: String,
        node_type: String,
    },
    #[serde(rename_all = "camelCase")]
    LlmToken {
        node_id: NodeId,
        token: String,
        kind: TokenKind,
    },
    #[serde(rename_all = "camelCase")]
    NodeCompleted {
        node_id: NodeId,
        node_name: String,
        outputs: ValueMap,
    },
    #[serde(rename_all = "camelCase")]
    NodeFailed {
        node_id: NodeId,
        node_name: String,
        error: String,
    },
    Completed { variables: ValueMap },
    Cancelled { variables: ValueMap },
    Error { message: String },
}

impl ExecutionEvent {
    /// Short wire name, used as the SSE event name.
    pub fn name(&self) -> &'static str {
        match self {
            ExecutionEvent::NodeStarted { .. } => "node_start",
            ExecutionEvent::LlmToken { .. } => "llm_token",
            ExecutionEvent::NodeCompleted { .. } => "node_complete",
            ExecutionEvent::NodeFailed { .. } => "node_error",
            ExecutionEvent::Completed { .. } => "complete",
            ExecutionEvent::Cancelled { .. } => "cancelled",
            ExecutionEvent::Error { .. } => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionEvent::Completed { .. }
                | ExecutionEvent::Cancelled { .. }
                | ExecutionEvent::NodeFailed { .. }
                | ExecutionEvent::Error { .. }
        )
    }

    /// Forward this event to the matching callback method.
    pub fn dispatch(&self, callback: &mut dyn ExecutionCallback) {
        match self {
            ExecutionEvent::NodeStarted {
                node_id,
                node_name,
                node_type,
            } => callback.on_node_start(node_id, node_name, node_type),
            ExecutionEvent::LlmToken { node_id, token, kind } => {
                callback.on_llm_token(node_id, token, *kind)
            }
            ExecutionEvent::NodeCompleted {
                node_id,
                node_name,
                outputs,
            } => callback.on_node_complete(node_id, node_name, outputs),
            ExecutionEvent::NodeFailed {
                node_id,
                node_name,
                error,
            } => callback.on_node_error(node_id, node_name, error),
            ExecutionEvent::Completed { variables } => callback.on_complete(variables),
            ExecutionEvent::Cancelled { variables } => callback.on_cancelled(variables),
            ExecutionEvent::Error { message } => callback.on_error(message),
        }
    }
}

/// Callback surface for callers that prefer methods over an event stream.
pub trait ExecutionCallback: Send {
    fn on_node_start(&mut self, node_id: &str, node_name: &str, node_type: &str);
    fn on_node_complete(&mut self, node_id: &str, node_name: &str, output: &ValueMap);
    fn on_node_error(&mut self, node_id: &str, node_name: &str, error: &str);
    fn on_llm_token(&mut self, node_id: &str, token: &str, kind: TokenKind);
    fn on_complete(&mut self, variables: &ValueMap);
    fn on_error(&mut self, message: &str);

    fn on_cancelled(&mut self, _variables: &ValueMap) {}
}

/// Producer half of a run's event channel.
///
/// A disabled emitter (batch runs) drops every event. Send failures after
/// the consumer went away are ignored; the run carries on to completion.
#[derive(Clone)]
pub struct EventEmitter {
    execution_id: ExecutionId,
    sender: Option<mpsc::Sender<ExecutionEvent>>,
}

impl EventEmitter {
    /// Create a connected emitter/stream pair for one run.
    pub fn channel(execution_id: impl Into<ExecutionId>, capacity: usize) -> (Self, EventStream) {
        let execution_id = execution_id.into();
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let emitter = Self {
            execution_id: execution_id.clone(),
            sender: Some(sender),
        };
        (emitter, EventStream { execution_id, receiver })
    }

    pub fn disabled(execution_id: impl Into<ExecutionId>) -> Self {
        Self {
            execution_id: execution_id.into(),
            sender: None,
        }
    }

    pub fn execution_id(&self) -> &str {
        &self.execution_id
    }

    pub fn is_enabled(&self) -> bool {
        self.sender.is_some()
    }

    pub async fn emit(&self, event: ExecutionEvent) {
        if let Some(sender) = &self.sender {
            if sender.send(event).await.is_err() {
                tracing::debug!("Event consumer for execution {} is gone", self.execution_id);
            }
        }
    }

    pub async fn token(&self, node_id: &str, token: impl Into<String>, kind: TokenKind) {
        self.emit(ExecutionEvent::LlmToken {
            node_id: node_id.to_string(),
            token: token.into(),
            kind,
        })
        .await;
    }
}

/// Consumer half of a run's event channel. Ends when the run finishes and
/// the producer is dropped.
pub struct EventStream {
    execution_id: ExecutionId,
    receiver: mpsc::Receiver<ExecutionEvent>,
}

impl EventStream {
    pub fn execution_id(&self) -> &str {
        &self.execution_id
    }

    pub async fn recv(&mut self) -> Option<ExecutionEvent> {
        self.receiver.recv().await
    }

    /// Drain the whole stream into a callback.
    pub async fn forward_to(mut self, callback: &mut dyn ExecutionCallback) {
        while let Some(event) = self.recv().await {
            event.dispatch(callback);
        }
    }

    /// Drain the whole stream into a vector.
    pub async fn collect_all(mut self) -> Vec<ExecutionEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.recv().await {
            events.push(event);
        }
        events
    }
}

impl Stream for EventStream {
    type Item = ExecutionEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_camel_case_fields() {
        let event = ExecutionEvent::NodeStarted {
            node_id: "llm".into(),
            node_name: "LLM".into(),
            node_type: "llm".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "node_started");
        assert_eq!(json["nodeId"], "llm");
        assert_eq!(event.name(), "node_start");
        assert!(!event.is_terminal());
    }

    #[tokio::test]
    async fn stream_ends_when_emitter_dropped() {
        let (emitter, stream) = EventEmitter::channel("exec", 8);
        emitter.token("n", "a", TokenKind::Content).await;
        drop(emitter);

        let events = stream.collect_all().await;
        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn disabled_emitter_drops_events() {
        let emitter = EventEmitter::disabled("exec");
        assert!(!emitter.is_enabled());
        emitter.token("n", "a", TokenKind::Content).await;
    }
}
