//! Buffered path: read the whole upstream response, then answer

use std::convert::Infallible;

use axum::body::Body;
use axum::http::{header, HeaderMap, Method, Response};
use bytes::Bytes;

use crate::proxy::error::ProxyError;
use crate::proxy::headers::filter_inbound_headers;
use crate::proxy::state::ProxyState;

/// Forward and relay status, headers and body unmodified.
///
/// Any upstream failure becomes a single 500 (see `ProxyError`).
pub(super) async fn forward_buffered(
    state: &ProxyState,
    request_id: &str,
    method: Method,
    url: &str,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response<Body>, ProxyError> {
    let upstream = state
        .upstream
        .request(method, url, headers, body)
        .await
        .map_err(|e| {
            tracing::error!(request_id = %request_id, "Request forwarding failed: {}", e);
            ProxyError::from(e)
        })?;

    tracing::info!(
        request_id = %request_id,
        "Received buffered response, status: {}, {} bytes",
        upstream.status,
        upstream.body.len()
    );

    // A relayed `Transfer-Encoding` must not meet a computed length
    let chunked = upstream.headers.contains_key(header::TRANSFER_ENCODING);

    let mut builder = Response::builder().status(upstream.status);
    for (key, value) in filter_inbound_headers(&upstream.headers) {
        if chunked && key.eq_ignore_ascii_case(header::CONTENT_LENGTH.as_str()) {
            continue;
        }
        builder = builder.header(key, value);
    }

    builder
        .body(relay_body(upstream.body, chunked))
        .map_err(|e| ProxyError::ResponseBuild(e.to_string()))
}

/// Body for the client. Chunked upstream replies are served without an exact
/// size so hyper chunk-encodes them again.
fn relay_body(bytes: Bytes, chunked: bool) -> Body {
    if chunked {
        Body::from_stream(futures::stream::once(async move {
            Ok::<_, Infallible>(bytes)
        }))
    } else {
        Body::from(bytes)
    }
}
