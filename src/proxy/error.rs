//! Proxy error types and response handling

use axum::{
    body::Body,
    http::{header, Response, StatusCode},
    response::IntoResponse,
};

use super::upstream::UpstreamError;

/// Errors that can occur during proxying
#[derive(Debug)]
pub enum ProxyError {
    /// The inbound body could not be read
    BodyRead(String),
    /// The buffered upstream exchange failed
    Upstream(UpstreamError),
    /// The client response could not be assembled
    ResponseBuild(String),
}

impl From<UpstreamError> for ProxyError {
    fn from(err: UpstreamError) -> Self {
        ProxyError::Upstream(err)
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response<Body> {
        let (status, message) = match self {
            ProxyError::BodyRead(msg) => (StatusCode::BAD_REQUEST, msg),
            ProxyError::Upstream(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
            ProxyError::ResponseBuild(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        tracing::error!("Proxy error: {} - {}", status, message);

        let detail = serde_json::json!({ "detail": format!("proxy request failed: {}", message) });

        Response::builder()
            .status(status)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(detail.to_string()))
            .unwrap_or_else(|_| Response::new(Body::from("Internal error building error response")))
    }
}
