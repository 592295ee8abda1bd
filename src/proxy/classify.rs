//! Streaming vs buffered classification of inbound requests

use serde_json::Value;

/// How a request is forwarded. Decided once per request from its body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardingDecision {
    /// Relay the upstream response line by line as SSE
    Stream,
    /// Read the whole upstream response, then answer
    Buffered,
}

impl ForwardingDecision {
    pub fn is_stream(self) -> bool {
        self == Self::Stream
    }
}

/// `Stream` only for a JSON object whose `stream` field is boolean `true`.
///
/// Bodies that don't parse are not an error: they are forwarded opaquely on
/// the buffered path.
pub fn classify(body: &[u8]) -> ForwardingDecision {
    if body.is_empty() {
        return ForwardingDecision::Buffered;
    }

    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) if map.get("stream") == Some(&Value::Bool(true)) => {
            ForwardingDecision::Stream
        }
        _ => ForwardingDecision::Buffered,
    }
}
