//! Encoding of bridge stream events as SSE frames.

use bridge_core::{ErrorCode, StreamEvent};
use serde::Serialize;
use warp::sse::Event;

#[derive(Serialize)]
struct ErrorEventBody<'a> {
    code: &'a str,
    message: &'a str,
}

/// Encode one stream event as an SSE frame.
///
/// Heartbeats are unnamed comment frames; everything else is a named event.
/// Error events carry a JSON `{code, message}` body.
pub fn encode(event: StreamEvent) -> Event {
    match event {
        StreamEvent::Subscribed { topic } => Event::default()
            .event("subscribed")
            .data(format!("listening on {topic}")),
        StreamEvent::Message { text } => Event::default().event("message").data(text),
        StreamEvent::Error { code, message } => {
            let body = ErrorEventBody {
                code: code.as_str(),
                message: &message,
            };
            match Event::default().event("error").json_data(&body) {
                Ok(event) => event,
                // A frame that cannot be encoded is itself an emitter failure.
                Err(_) => Event::default().event("error").data(format!(
                    "{{\"code\":\"{}\",\"message\":\"event encoding failed\"}}",
                    ErrorCode::EmitterIo.as_str()
                )),
            }
        }
        StreamEvent::Heartbeat => Event::default().comment("keep-alive"),
    }
}
