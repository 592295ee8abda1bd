//! Header normalization for both directions of a forwarded exchange
//!
//! Outbound: drop the headers the upstream call recomputes.
//! Inbound (upstream response → client): keys and values pass through in
//! upstream order. Values are never touched.

use axum::http::{header, HeaderMap, HeaderValue};

/// Strip `host` and `content-length` before forwarding.
///
/// The upstream client derives both from the target URL and the body.
pub fn prepare_outbound_headers(headers: &HeaderMap) -> HeaderMap {
    let mut outbound = headers.clone();
    outbound.remove(header::HOST);
    outbound.remove(header::CONTENT_LENGTH);
    outbound
}

/// Canonical display form for the keys clients expect in exact case.
///
/// Input must already be lower-case, which `HeaderName` guarantees.
pub fn canonical_name(lower: &str) -> Option<&'static str> {
    match lower {
        "content-type" => Some("Content-Type"),
        "transfer-encoding" => Some("Transfer-Encoding"),
        "connection" => Some("Connection"),
        "cache-control" => Some("Cache-Control"),
        "x-oneapi-request-id" => Some("X-Oneapi-Request-Id"),
        "server" => Some("Server"),
        "date" => Some("Date"),
        _ => None,
    }
}

/// Map upstream response headers to the (key, value) pairs sent to the
/// client, in upstream order. Repeated headers stay repeated.
///
/// `HeaderName` stores keys lower-case, so the canonical spelling from
/// [`canonical_name`] does not survive into the response map. The casing
/// clients see on HTTP/1 comes from the server writing every key in
/// Title-Case (`title_case_headers`), which also applies to keys outside the
/// table: `x-ratelimit-remaining` goes out as `X-Ratelimit-Remaining`.
/// HTTP/2 keys stay lower-case.
pub fn filter_inbound_headers(headers: &HeaderMap) -> Vec<(String, HeaderValue)> {
    headers
        .iter()
        .map(|(name, value)| {
            let key = canonical_name(name.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| name.as_str().to_string());
            (key, value.clone())
        })
        .collect()
}
