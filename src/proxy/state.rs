//! Proxy state shared by every request handler

use std::sync::Arc;

use super::target::ProxyTarget;
use super::upstream::UpstreamClient;

/// Shared state for the proxy server
#[derive(Clone)]
pub struct ProxyState {
    /// The process-wide upstream client (owned by `main`, closed at shutdown)
    pub(crate) upstream: Arc<UpstreamClient>,
    /// Where every forwarded request goes
    pub(crate) target: Arc<ProxyTarget>,
}

impl ProxyState {
    pub fn new(upstream: Arc<UpstreamClient>, target: ProxyTarget) -> Self {
        Self {
            upstream,
            target: Arc::new(target),
        }
    }
}
