//! Streaming path: relay the upstream SSE body line by line
//!
//! The client gets its response headers immediately. A relay task opens the
//! upstream stream and pushes one body frame per upstream line through a
//! bounded channel. Failures become a trailing `data: {"error": ...}` frame.
//!
//! The task also watches the channel: once the client side is gone it stops
//! reading and drops the upstream handle, which frees its pool slot.

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, HeaderMap, Method, Response, StatusCode};
use axum::response::IntoResponse;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::proxy::sse::{error_frame, line_frame};
use crate::proxy::state::ProxyState;
use crate::proxy::upstream::{StreamHandle, StreamStep, UpstreamClient};

/// Frames queued between the relay task and the client connection
const RELAY_CHANNEL_CAPACITY: usize = 16;

type FrameSender = mpsc::Sender<Result<Bytes, Infallible>>;

/// Start the relay and return the SSE response that drains it.
pub(super) fn forward_streaming(
    state: &ProxyState,
    request_id: String,
    method: Method,
    url: String,
    headers: HeaderMap,
    body: Bytes,
) -> Response<Body> {
    let (tx, rx) = mpsc::channel(RELAY_CHANNEL_CAPACITY);

    let upstream = state.upstream.clone();
    tokio::spawn(async move {
        relay(upstream, &request_id, method, &url, headers, body, tx).await;
    });

    sse_response(Body::from_stream(ReceiverStream::new(rx)))
}

/// Fixed SSE response headers; nothing is taken from the upstream
fn sse_response(body: Body) -> Response<Body> {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .header("x-accel-buffering", "no") // Disable nginx buffering
        .body(body)
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

fn stream_failure(message: impl std::fmt::Display) -> Bytes {
    error_frame(&format!("stream request failed: {}", message))
}

async fn relay(
    upstream: Arc<UpstreamClient>,
    request_id: &str,
    method: Method,
    url: &str,
    headers: HeaderMap,
    body: Bytes,
    tx: FrameSender,
) {
    let opened = tokio::select! {
        opened = upstream.open_stream(method, url, headers, body) => opened,
        _ = tx.closed() => {
            tracing::debug!(request_id = %request_id, "Client disconnected before upstream answered");
            return;
        }
    };

    let handle = match opened {
        Ok(handle) => handle,
        Err(e) => {
            tracing::error!(request_id = %request_id, "Stream request failed: {}", e);
            let _ = tx.send(Ok(stream_failure(&e))).await;
            return;
        }
    };

    tracing::info!(
        request_id = %request_id,
        "Received stream response, status: {}",
        handle.status()
    );
    tracing::debug!(
        request_id = %request_id,
        "Upstream content type: {:?}",
        handle.headers().get(header::CONTENT_TYPE)
    );

    if handle.status() != StatusCode::OK {
        relay_upstream_error(handle, request_id, &tx).await;
        return;
    }

    relay_lines(handle, request_id, &tx).await;
}

/// Non-200 upstream: one error event carrying the upstream body
async fn relay_upstream_error(handle: StreamHandle, request_id: &str, tx: &FrameSender) {
    let status = handle.status();
    let frame = tokio::select! {
        body = handle.read_body() => match body {
            Ok(text) if text.is_empty() => error_frame("unknown"),
            Ok(text) => error_frame(&text),
            Err(e) => stream_failure(&e),
        },
        _ = tx.closed() => {
            tracing::debug!(request_id = %request_id, "Client disconnected while reading upstream error");
            return;
        }
    };

    tracing::warn!(request_id = %request_id, "Upstream rejected stream request with {}", status);
    let _ = tx.send(Ok(frame)).await;
}

/// 200 upstream: every line out, in order, one frame each
async fn relay_lines(mut handle: StreamHandle, request_id: &str, tx: &FrameSender) {
    let mut relayed = 0usize;

    loop {
        let step = tokio::select! {
            step = handle.next_step() => step,
            _ = tx.closed() => {
                tracing::debug!(
                    request_id = %request_id,
                    "Client disconnected after {} lines, releasing upstream",
                    relayed
                );
                break;
            }
        };

        match step {
            StreamStep::Line(line) => {
                if tx.send(Ok(line_frame(&line))).await.is_err() {
                    tracing::debug!(request_id = %request_id, "Client disconnected, releasing upstream");
                    break;
                }
                relayed += 1;
            }
            StreamStep::EndOfStream => {
                tracing::debug!(request_id = %request_id, "Stream complete, {} lines relayed", relayed);
                break;
            }
            StreamStep::Failure(message) => {
                tracing::error!(request_id = %request_id, "Stream interrupted: {}", message);
                let _ = tx.send(Ok(stream_failure(&message))).await;
                break;
            }
        }
    }

    handle.close();
}
