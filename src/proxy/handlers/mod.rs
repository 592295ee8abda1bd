//! Request and response handlers for the proxy
//!
//! This module contains the forwarding engine (`forward`), the axum entry
//! points (`proxy_handler`, `health_check`) and the two response paths:
//! streaming (SSE relay) and buffered.

mod buffered;
mod request;
mod streaming;

pub use request::{health_check, proxy_handler};

use axum::body::Body;
use axum::http::{HeaderMap, Method, Response};
use bytes::Bytes;
use chrono::Utc;

use super::classify::{classify, ForwardingDecision};
use super::error::ProxyError;
use super::headers::prepare_outbound_headers;
use super::state::ProxyState;

/// An inbound request, fully read. The engine only borrows from it.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Forward one request to the upstream and produce the client response.
///
/// The forwarding decision is made here, once, from the request body.
pub(crate) async fn forward(
    state: &ProxyState,
    req: InboundRequest,
) -> Result<Response<Body>, ProxyError> {
    let request_id = generate_id();
    let url = state.target.url_for(&req.path, req.query.as_deref());
    let decision = classify(&req.body);
    let headers = prepare_outbound_headers(&req.headers);

    tracing::info!(
        request_id = %request_id,
        method = %req.method,
        "Forwarding request to {}, stream: {}",
        url,
        decision.is_stream()
    );

    match decision {
        ForwardingDecision::Stream => Ok(streaming::forward_streaming(
            state, request_id, req.method, url, headers, req.body,
        )),
        ForwardingDecision::Buffered => {
            buffered::forward_buffered(state, &request_id, req.method, &url, headers, req.body)
                .await
        }
    }
}

/// Request id for log correlation: millisecond timestamp plus a counter
pub fn generate_id() -> String {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let count = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{}-{}", Utc::now().timestamp_millis(), count)
}
