use actix_web::web::Bytes;
use actix_web::HttpResponse;
use aiflow_core::{EventStream, ExecutionEvent};
use futures::StreamExt;
use serde_json::json;
use std::convert::Infallible;

/// Render one server-sent event frame.
pub fn frame(name: &str, data: &serde_json::Value) -> Bytes {
    Bytes::from(format!("event: {}\ndata: {}\n\n", name, data))
}

pub fn event_frame(event: &ExecutionEvent) -> Bytes {
    let data = serde_json::to_value(event).unwrap_or_else(|e| json!({ "type": "error", "message": e.to_string() }));
    frame(event.name(), &data)
}

/// Relay a run's events as `text/event-stream`, preceded by a `start`
/// frame carrying the execution id. The response ends with the run.
///
/// A node failure ends the stream at its `node_error` frame; no trailing
/// `error` frame follows it. `error` is sent only for runs that never start.
pub fn respond(events: EventStream) -> HttpResponse {
    let start = frame("start", &json!({ "executionId": events.execution_id() }));
    let body = futures::stream::once(async move { start })
        .chain(events.map(|event| event_frame(&event)))
        .map(Ok::<_, Infallible>);

    HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header(("Cache-Control", "no-cache"))
        .insert_header(("X-Accel-Buffering", "no"))
        .streaming(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_frame_uses_event_name() {
        let event = ExecutionEvent::LlmToken {
            node_id: "llm".into(),
            token: "a".into(),
            kind: aiflow_core::TokenKind::Content,
        };
        let text = String::from_utf8(event_frame(&event).to_vec()).unwrap();
        assert!(text.starts_with("event: llm_token\ndata: {"));
        assert!(text.ends_with("\n\n"));
    }
}
