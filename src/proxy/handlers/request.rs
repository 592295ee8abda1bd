//! axum entry points

use axum::{
    body::Body,
    extract::State,
    http::{Request, Response},
    Json,
};
use serde_json::{json, Value};

use super::{forward, InboundRequest};
use crate::proxy::error::ProxyError;
use crate::proxy::state::ProxyState;

/// Main proxy handler - reads the request and hands it to the engine
pub async fn proxy_handler(
    State(state): State<ProxyState>,
    req: Request<Body>,
) -> Result<Response<Body>, ProxyError> {
    let inbound = InboundRequest::read(req).await?;
    forward(&state, inbound).await
}

/// Liveness probe, answered locally
pub async fn health_check() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

impl InboundRequest {
    /// Take the request apart and read its body in full.
    pub async fn read(req: Request<Body>) -> Result<Self, ProxyError> {
        let (parts, body) = req.into_parts();

        let body = axum::body::to_bytes(body, usize::MAX)
            .await
            .map_err(|e| ProxyError::BodyRead(e.to_string()))?;

        Ok(Self {
            method: parts.method,
            path: parts.uri.path().to_string(),
            query: parts.uri.query().map(str::to_string),
            headers: parts.headers,
            body,
        })
    }
}
