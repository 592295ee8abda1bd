use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    response::{IntoResponse, Redirect, Response},
    routing::{any, get, post},
    Json, Router,
};
use bytes::Bytes;
use futures::StreamExt;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tower::ServiceExt;

use super::server::{build_router, serve};
use super::*;

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

async fn spawn_upstream(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

/// A base URL nothing is listening on
async fn dead_upstream() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

fn relay_for(base: &str) -> (Router, Arc<UpstreamClient>) {
    relay_with(base, UpstreamSettings::default())
}

fn relay_with(base: &str, settings: UpstreamSettings) -> (Router, Arc<UpstreamClient>) {
    let upstream = Arc::new(UpstreamClient::new(settings).unwrap());
    let state = ProxyState::new(upstream.clone(), ProxyTarget::new(base));
    (build_router(state), upstream)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("host", "relay.local:8000")
        .header("content-type", "application/json")
        .header("authorization", "Bearer sk-test")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_text(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn data_frames(response: Response) -> Vec<Bytes> {
    let mut body = response.into_body();
    let mut frames = Vec::new();
    while let Some(frame) = body.frame().await {
        if let Ok(data) = frame.unwrap().into_data() {
            frames.push(data);
        }
    }
    frames
}

/// Echoes what the upstream actually received
async fn echo(req: Request<Body>) -> Json<Value> {
    let (parts, body) = req.into_parts();
    let body = to_bytes(body, usize::MAX).await.unwrap();
    let header = |name: &str| {
        parts
            .headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    Json(json!({
        "method": parts.method.as_str(),
        "uri": parts.uri.to_string(),
        "host": header("host"),
        "authorization": header("authorization"),
        "body": String::from_utf8_lossy(&body),
    }))
}

/// An upstream that reads one request, writes `response` verbatim and closes
async fn spawn_raw_upstream(response: &'static [u8]) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        read_request(&mut socket).await;
        socket.write_all(response).await.unwrap();
        socket.shutdown().await.unwrap();
    });
    format!("http://{}", addr)
}

/// Consume request head and a `Content-Length` body
async fn read_request(socket: &mut TcpStream) {
    let mut raw = Vec::new();
    let mut buf = [0u8; 1024];
    let head_end = loop {
        let n = socket.read(&mut buf).await.unwrap();
        assert!(n > 0, "request ended early");
        raw.extend_from_slice(&buf[..n]);
        if let Some(pos) = raw.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };
    let head = String::from_utf8_lossy(&raw[..head_end]).to_ascii_lowercase();
    let length: usize = head
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .map(|v| v.trim().parse().unwrap())
        .unwrap_or(0);
    while raw.len() < head_end + length {
        let n = socket.read(&mut buf).await.unwrap();
        assert!(n > 0, "request body ended early");
        raw.extend_from_slice(&buf[..n]);
    }
}

/// Send one raw HTTP/1.1 request through `serve` and return the raw reply
async fn serve_once(relay: Router, request: &[u8]) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let server = tokio::spawn(serve(listener, relay, shutdown_rx));

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request).await.unwrap();
    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).await.unwrap();

    shutdown_tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("server did not shut down")
        .unwrap()
        .unwrap();

    String::from_utf8_lossy(&raw).into_owned()
}

fn sse_body(chunks: &[&'static str]) -> Body {
    let chunks: Vec<Result<Bytes, Infallible>> = chunks
        .iter()
        .map(|c| Ok(Bytes::from_static(c.as_bytes())))
        .collect();
    Body::from_stream(futures::stream::iter(chunks))
}

// ─────────────────────────────────────────────────────────────────────────────
// Buffered path
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_buffered_relays_status_headers_and_body() {
    let base = spawn_upstream(Router::new().route(
        "/v1/items",
        post(|| async {
            (
                StatusCode::CREATED,
                [("x-upstream", "yes")],
                Json(json!({ "ok": true })),
            )
        }),
    ))
    .await;
    let (relay, _) = relay_for(&base);

    let response = relay
        .oneshot(post_json("/v1/items", json!({ "name": "a" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(response.headers()["x-upstream"], "yes");
    assert_eq!(response.headers()["content-type"], "application/json");
    assert_eq!(body_text(response).await, r#"{"ok":true}"#);
}

#[tokio::test]
async fn test_forwards_path_query_body_and_headers() {
    let base = spawn_upstream(Router::new().route("/*path", any(echo))).await;
    let upstream_host = base.trim_start_matches("http://").to_string();
    let (relay, _) = relay_for(&format!("{}/", base));

    let request = Request::builder()
        .method(Method::PUT)
        .uri("/v1/models?limit=5&order=desc")
        .header("host", "relay.local:8000")
        .header("authorization", "Bearer sk-test")
        .body(Body::from("raw bytes, not json"))
        .unwrap();

    let response = relay.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let seen: Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(seen["method"], "PUT");
    assert_eq!(seen["uri"], "/v1/models?limit=5&order=desc");
    assert_eq!(seen["authorization"], "Bearer sk-test");
    assert_eq!(seen["body"], "raw bytes, not json");
    assert_eq!(seen["host"], upstream_host.as_str());
}

#[tokio::test]
async fn test_stream_false_is_buffered() {
    let base = spawn_upstream(Router::new().route("/*path", any(echo))).await;
    let (relay, _) = relay_for(&base);

    let response = relay
        .oneshot(post_json("/v1/chat/completions", json!({ "stream": false })))
        .await
        .unwrap();

    assert_eq!(response.headers()["content-type"], "application/json");
    let seen: Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(seen["body"], r#"{"stream":false}"#);
}

#[tokio::test]
async fn test_buffered_failure_is_500_with_detail() {
    let (relay, upstream) = relay_for(&dead_upstream().await);

    let response = relay
        .oneshot(post_json("/v1/chat/completions", json!({ "model": "m" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
    let detail = body["detail"].as_str().unwrap();
    assert!(detail.starts_with("proxy request failed: "), "{detail}");
    assert_eq!(upstream.available_slots(), upstream.max_connections());
}

fn chunked_upstream() -> Router {
    Router::new().route(
        "/v1/files",
        get(|| async {
            (
                [(header::CONTENT_TYPE, "text/plain")],
                sse_body(&["hel", "lo"]),
            )
        }),
    )
}

#[tokio::test]
async fn test_buffered_chunked_upstream_has_no_content_length() {
    let base = spawn_upstream(chunked_upstream()).await;
    let (relay, _) = relay_for(&base);

    let response = relay
        .oneshot(Request::builder().uri("/v1/files").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["transfer-encoding"], "chunked");
    assert!(response.headers().get("content-length").is_none());
    assert_eq!(body_text(response).await, "hello");
}

#[tokio::test]
async fn test_buffered_chunked_upstream_is_served_chunked() {
    let base = spawn_upstream(chunked_upstream()).await;
    let (relay, _) = relay_for(&base);

    let raw = serve_once(
        relay,
        b"GET /v1/files HTTP/1.1\r\nHost: relay.local\r\nConnection: close\r\n\r\n",
    )
    .await;

    assert!(raw.starts_with("HTTP/1.1 200 OK\r\n"), "{raw}");
    assert!(raw.contains("\r\nTransfer-Encoding: chunked\r\n"), "{raw}");
    assert!(!raw.to_ascii_lowercase().contains("content-length"), "{raw}");
    assert!(raw.ends_with("\r\n\r\n5\r\nhello\r\n0\r\n\r\n"), "{raw}");
}

fn redirecting_upstream() -> Router {
    Router::new()
        .route(
            "/v1/moved",
            post(|| async { Redirect::temporary("/v1/target") }),
        )
        .route("/v1/target", post(|| async { "target" }))
}

#[tokio::test]
async fn test_buffered_follows_redirects() {
    let base = spawn_upstream(redirecting_upstream()).await;
    let (relay, _) = relay_for(&base);

    let response = relay
        .oneshot(post_json("/v1/moved", json!({ "model": "m" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "target");
}

// ─────────────────────────────────────────────────────────────────────────────
// Streaming path
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_stream_relays_lines_in_order() {
    let base = spawn_upstream(Router::new().route(
        "/v1/chat/completions",
        post(|| async {
            (
                [(header::CONTENT_TYPE, "text/event-stream")],
                sse_body(&["data: {\"a\":1}\n\nda", "ta: [DONE]\r\n", "\n"]),
            )
        }),
    ))
    .await;
    let (relay, _) = relay_for(&base);

    let response = relay
        .oneshot(post_json(
            "/v1/chat/completions",
            json!({ "model": "m", "stream": true }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert!(headers["content-type"]
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));
    assert_eq!(headers["cache-control"], "no-cache");
    assert_eq!(headers["connection"], "keep-alive");
    assert_eq!(headers["x-accel-buffering"], "no");

    let frames = data_frames(response).await;
    assert_eq!(
        frames,
        vec![
            Bytes::from("data: {\"a\":1}\n"),
            Bytes::from("\n"),
            Bytes::from("data: [DONE]\n"),
            Bytes::from("\n"),
        ]
    );
}

#[tokio::test]
async fn test_stream_upstream_error_becomes_single_event() {
    let base = spawn_upstream(Router::new().route(
        "/v1/chat/completions",
        post(|| async { (StatusCode::SERVICE_UNAVAILABLE, "Service Unavailable") }),
    ))
    .await;
    let (relay, upstream) = relay_for(&base);

    let response = relay
        .oneshot(post_json("/v1/chat/completions", json!({ "stream": true })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_text(response).await,
        "data: {\"error\": \"Service Unavailable\"}\n\n"
    );
    assert_eq!(upstream.available_slots(), upstream.max_connections());
}

#[tokio::test]
async fn test_stream_empty_error_body_reports_unknown() {
    let base = spawn_upstream(Router::new().route(
        "/v1/chat/completions",
        post(|| async { StatusCode::BAD_GATEWAY }),
    ))
    .await;
    let (relay, _) = relay_for(&base);

    let response = relay
        .oneshot(post_json("/v1/chat/completions", json!({ "stream": true })))
        .await
        .unwrap();

    assert_eq!(
        body_text(response).await,
        "data: {\"error\": \"unknown\"}\n\n"
    );
}

#[tokio::test]
async fn test_stream_connect_failure_becomes_error_event() {
    let (relay, _) = relay_for(&dead_upstream().await);

    let response = relay
        .oneshot(post_json("/v1/chat/completions", json!({ "stream": true })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let text = body_text(response).await;
    assert!(
        text.starts_with("data: {\"error\": \"stream request failed: "),
        "{text}"
    );
    assert!(text.ends_with("\"}\n\n"), "{text}");
}

#[tokio::test]
async fn test_client_disconnect_releases_upstream_slot() {
    let base = spawn_upstream(Router::new().route(
        "/v1/chat/completions",
        post(|| async {
            let first = futures::stream::once(async {
                Ok::<_, Infallible>(Bytes::from_static(b"data: first\n"))
            });
            let body = Body::from_stream(first.chain(futures::stream::pending()));
            ([(header::CONTENT_TYPE, "text/event-stream")], body).into_response()
        }),
    ))
    .await;
    let (relay, upstream) = relay_for(&base);

    let response = relay
        .oneshot(post_json("/v1/chat/completions", json!({ "stream": true })))
        .await
        .unwrap();

    let mut body = response.into_body();
    let first = body.frame().await.unwrap().unwrap().into_data().unwrap();
    assert_eq!(first, Bytes::from("data: first\n"));
    assert!(upstream.available_slots() < upstream.max_connections());

    drop(body);

    let released = tokio::time::timeout(Duration::from_secs(5), async {
        while upstream.available_slots() < upstream.max_connections() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(released.is_ok(), "upstream slot was never released");
}

#[tokio::test]
async fn test_stream_truncated_body_ends_with_error_event() {
    let base = spawn_raw_upstream(
        b"HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nContent-Length: 1000\r\n\r\ndata: one\n\n",
    )
    .await;
    let (relay, upstream) = relay_for(&base);

    let response = relay
        .oneshot(post_json("/v1/chat/completions", json!({ "stream": true })))
        .await
        .unwrap();

    let frames = data_frames(response).await;
    assert_eq!(frames.len(), 3, "{frames:?}");
    assert_eq!(frames[0], Bytes::from("data: one\n"));
    assert_eq!(frames[1], Bytes::from("\n"));
    let last = String::from_utf8(frames[2].to_vec()).unwrap();
    assert!(
        last.starts_with("data: {\"error\": \"stream request failed: "),
        "{last}"
    );
    assert!(last.ends_with("\"}\n\n"), "{last}");
    assert_eq!(upstream.available_slots(), upstream.max_connections());
}

#[tokio::test]
async fn test_stream_timeout_mid_body_ends_with_error_event() {
    let base = spawn_upstream(Router::new().route(
        "/v1/chat/completions",
        post(|| async {
            let first = futures::stream::once(async {
                Ok::<_, Infallible>(Bytes::from_static(b"data: first\n"))
            });
            let body = Body::from_stream(first.chain(futures::stream::pending()));
            ([(header::CONTENT_TYPE, "text/event-stream")], body).into_response()
        }),
    ))
    .await;
    let settings = UpstreamSettings {
        request_timeout: Duration::from_millis(300),
        ..Default::default()
    };
    let (relay, upstream) = relay_with(&base, settings);

    let response = relay
        .oneshot(post_json("/v1/chat/completions", json!({ "stream": true })))
        .await
        .unwrap();

    let frames = tokio::time::timeout(Duration::from_secs(5), data_frames(response))
        .await
        .expect("stream never ended");
    assert_eq!(frames.len(), 2, "{frames:?}");
    assert_eq!(frames[0], Bytes::from("data: first\n"));
    let last = String::from_utf8(frames[1].to_vec()).unwrap();
    assert!(
        last.starts_with("data: {\"error\": \"stream request failed: "),
        "{last}"
    );
    assert!(last.contains("timed out"), "{last}");
    assert_eq!(upstream.available_slots(), upstream.max_connections());
}

#[tokio::test]
async fn test_stream_redirect_is_relayed_as_error_event() {
    let base = spawn_upstream(redirecting_upstream()).await;
    let (relay, _) = relay_for(&base);

    let response = relay
        .oneshot(post_json("/v1/moved", json!({ "stream": true })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_text(response).await,
        "data: {\"error\": \"unknown\"}\n\n"
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// Routing
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_health_is_answered_locally() {
    let (relay, _) = relay_for(&dead_upstream().await);

    let response = relay
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(body, json!({ "status": "healthy" }));
}

#[tokio::test]
async fn test_unlisted_method_is_rejected() {
    let (relay, _) = relay_for(&dead_upstream().await);

    let response = relay
        .oneshot(
            Request::builder()
                .method(Method::TRACE)
                .uri("/v1/chat/completions")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_root_path_is_forwarded() {
    let base = spawn_upstream(Router::new().route("/", get(|| async { "root" }))).await;
    let (relay, _) = relay_for(&base);

    let response = relay
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "root");
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire format
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_served_headers_use_title_case() {
    let base = spawn_upstream(Router::new().route(
        "/v1/models",
        get(|| async {
            (
                [
                    ("x-oneapi-request-id", "req-1"),
                    ("x-ratelimit-remaining", "99"),
                ],
                Json(json!({ "data": [] })),
            )
        }),
    ))
    .await;
    let (relay, _) = relay_for(&base);

    let raw = serve_once(
        relay,
        b"GET /v1/models HTTP/1.1\r\nHost: relay.local\r\nConnection: close\r\n\r\n",
    )
    .await;

    assert!(raw.starts_with("HTTP/1.1 200 OK\r\n"), "{raw}");
    assert!(raw.contains("\r\nContent-Type: application/json\r\n"), "{raw}");
    assert!(raw.contains("\r\nX-Oneapi-Request-Id: req-1\r\n"), "{raw}");
    // Keys outside the canonical table are title-cased too
    assert!(raw.contains("\r\nX-Ratelimit-Remaining: 99\r\n"), "{raw}");
    assert!(raw.ends_with(r#"{"data":[]}"#), "{raw}");
}
