//! Upstream client: the one connection pool shared by every forwarded request
//!
//! Owns the only two timeouts in the relay (connect and total request) and the
//! pool bound. `reqwest` caps idle connections but not total ones, so the
//! total is enforced with a semaphore: each exchange holds a slot until its
//! response is fully read or its stream handle is dropped. Waiting for a slot
//! counts against the connect timeout.
//!
//! Buffered and streamed calls go through two `reqwest` clients that differ
//! only in redirect policy. The semaphore bounds both together.

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderMap, Method, StatusCode};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::redirect::Policy;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use super::sse::LineBuffer;
use crate::config::UpstreamConfig;

// ─────────────────────────────────────────────────────────────────────────────
// Settings and errors
// ─────────────────────────────────────────────────────────────────────────────

/// Construction parameters for [`UpstreamClient`]
#[derive(Debug, Clone)]
pub struct UpstreamSettings {
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub max_connections: usize,
    pub max_idle: usize,
    /// Accept invalid or self-signed certificates when false
    pub tls_verify: bool,
    /// Negotiate HTTP/2 when offered; HTTP/1.1 only otherwise
    pub http2: bool,
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        Self::from(&UpstreamConfig::default())
    }
}

impl From<&UpstreamConfig> for UpstreamSettings {
    fn from(config: &UpstreamConfig) -> Self {
        Self {
            request_timeout: config.request_timeout(),
            connect_timeout: config.connect_timeout(),
            max_connections: config.max_connections,
            max_idle: config.max_keepalive_connections,
            tls_verify: config.verify_ssl,
            http2: config.enable_http2,
        }
    }
}

/// Failures talking to the upstream
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("failed to connect to upstream: {0}")]
    Connect(String),

    #[error("upstream request timed out: {0}")]
    Timeout(String),

    #[error("upstream request failed: {0}")]
    Request(String),

    #[error("upstream stream interrupted: {0}")]
    Interrupted(String),

    #[error("upstream client is closed")]
    Closed,
}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        // reqwest's Display hides the cause chain; include it
        let message = error_chain(&err);
        if err.is_timeout() {
            UpstreamError::Timeout(message)
        } else if err.is_connect() {
            UpstreamError::Connect(message)
        } else {
            UpstreamError::Request(message)
        }
    }
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

// ─────────────────────────────────────────────────────────────────────────────
// Client
// ─────────────────────────────────────────────────────────────────────────────

/// Shared upstream client. Build exactly one per process and hand it out by
/// `Arc`; call [`UpstreamClient::close`] once at shutdown.
pub struct UpstreamClient {
    http: reqwest::Client,
    stream_http: reqwest::Client,
    slots: Arc<Semaphore>,
    settings: UpstreamSettings,
    closed: AtomicBool,
}

fn build_http(
    settings: &UpstreamSettings,
    redirect: Policy,
) -> Result<reqwest::Client, UpstreamError> {
    // NOTE: No default User-Agent set - the client's own User-Agent is
    // forwarded with the rest of its headers.
    let mut builder = reqwest::Client::builder()
        .timeout(settings.request_timeout)
        .connect_timeout(settings.connect_timeout)
        .pool_max_idle_per_host(settings.max_idle)
        .redirect(redirect)
        // Bodies are relayed byte for byte, never decompressed
        .no_gzip()
        .danger_accept_invalid_certs(!settings.tls_verify);

    if !settings.http2 {
        builder = builder.http1_only();
    }

    builder
        .build()
        .map_err(|e| UpstreamError::Request(format!("failed to create HTTP client: {}", e)))
}

/// A fully read upstream response
#[derive(Debug)]
pub struct BufferedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl UpstreamClient {
    pub fn new(settings: UpstreamSettings) -> Result<Self, UpstreamError> {
        // Buffered calls follow redirects; a redirect on the stream path is
        // relayed to the client as a non-200 answer.
        let http = build_http(&settings, Policy::default())?;
        let stream_http = build_http(&settings, Policy::none())?;

        Ok(Self {
            http,
            stream_http,
            slots: Arc::new(Semaphore::new(settings.max_connections)),
            settings,
            closed: AtomicBool::new(false),
        })
    }

    /// Pool slots not currently held by an in-flight exchange
    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }

    pub fn max_connections(&self) -> usize {
        self.settings.max_connections
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Release the pool. Later calls fail with [`UpstreamError::Closed`];
    /// exchanges already holding a slot run to completion. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.slots.close();
        tracing::info!("Upstream client closed");
    }

    async fn acquire_slot(&self) -> Result<OwnedSemaphorePermit, UpstreamError> {
        if self.is_closed() {
            return Err(UpstreamError::Closed);
        }
        let wait = self.settings.connect_timeout;
        match tokio::time::timeout(wait, self.slots.clone().acquire_owned()).await {
            Ok(Ok(permit)) => Ok(permit),
            Ok(Err(_)) => Err(UpstreamError::Closed),
            Err(_) => Err(UpstreamError::Timeout(format!(
                "no free upstream connection within {:?} ({} in use)",
                wait, self.settings.max_connections
            ))),
        }
    }

    async fn send(
        &self,
        http: &reqwest::Client,
        method: Method,
        url: &str,
        headers: HeaderMap,
        body: Bytes,
    ) -> Result<(reqwest::Response, OwnedSemaphorePermit), UpstreamError> {
        let permit = self.acquire_slot().await?;
        let response = http
            .request(method, url)
            .headers(headers)
            .body(body)
            .send()
            .await?;
        Ok((response, permit))
    }

    /// Buffered exchange: send the request and read the whole response.
    pub async fn request(
        &self,
        method: Method,
        url: &str,
        headers: HeaderMap,
        body: Bytes,
    ) -> Result<BufferedResponse, UpstreamError> {
        let (response, _permit) = self.send(&self.http, method, url, headers, body).await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        Ok(BufferedResponse {
            status,
            headers,
            body,
        })
    }

    /// Streaming exchange: send the request and hand back a handle that reads
    /// the response body line by line. The total request timeout keeps running
    /// while the body is read.
    pub async fn open_stream(
        &self,
        method: Method,
        url: &str,
        headers: HeaderMap,
        body: Bytes,
    ) -> Result<StreamHandle, UpstreamError> {
        let (response, permit) = self
            .send(&self.stream_http, method, url, headers, body)
            .await?;
        Ok(StreamHandle::new(response, permit))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Stream handle
// ─────────────────────────────────────────────────────────────────────────────

/// Outcome of one read from a [`StreamHandle`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamStep {
    /// One upstream line, terminator removed
    Line(String),
    /// The upstream finished the body
    EndOfStream,
    /// Reading failed; the handle yields nothing after this
    Failure(String),
}

type ByteStream = Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>;

/// An open upstream response consumed incrementally.
///
/// Holds its pool slot until dropped, so every exit path (end of stream,
/// failure, client disconnect) releases the connection.
pub struct StreamHandle {
    status: StatusCode,
    headers: HeaderMap,
    body: ByteStream,
    lines: LineBuffer,
    done: bool,
    _slot: OwnedSemaphorePermit,
}

impl StreamHandle {
    fn new(response: reqwest::Response, slot: OwnedSemaphorePermit) -> Self {
        Self {
            status: response.status(),
            headers: response.headers().clone(),
            body: Box::pin(response.bytes_stream()),
            lines: LineBuffer::new(),
            done: false,
            _slot: slot,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Read until the next complete line, the end, or a failure.
    pub async fn next_step(&mut self) -> StreamStep {
        loop {
            if let Some(line) = self.lines.next_line() {
                return StreamStep::Line(line);
            }
            if self.done {
                return StreamStep::EndOfStream;
            }

            match self.body.next().await {
                Some(Ok(chunk)) => self.lines.push(&chunk),
                Some(Err(e)) => {
                    self.done = true;
                    let err = match UpstreamError::from(e) {
                        UpstreamError::Request(message) => UpstreamError::Interrupted(message),
                        other => other,
                    };
                    return StreamStep::Failure(err.to_string());
                }
                None => {
                    self.done = true;
                    if let Some(tail) = self.lines.finish() {
                        return StreamStep::Line(tail);
                    }
                }
            }
        }
    }

    /// Read the rest of the body as text (used for upstream error bodies).
    pub async fn read_body(mut self) -> Result<String, UpstreamError> {
        let mut raw = Vec::new();
        while let Some(line) = self.lines.next_line() {
            raw.extend_from_slice(line.as_bytes());
            raw.push(b'\n');
        }
        if let Some(tail) = self.lines.finish() {
            raw.extend_from_slice(tail.as_bytes());
        }
        while let Some(chunk) = self.body.next().await {
            raw.extend_from_slice(&chunk?);
        }
        Ok(String::from_utf8_lossy(&raw).into_owned())
    }

    /// Release the upstream connection without reading further.
    pub fn close(self) {}
}
