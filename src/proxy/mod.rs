// Proxy module - HTTP server that relays requests to a single upstream
//
// Every inbound request except `/health` is forwarded unchanged to the
// configured target. Requests asking for `"stream": true` are relayed as
// server-sent events line by line; everything else is buffered.

mod classify;
mod error;
mod handlers;
mod headers;
mod server;
mod sse;
mod state;
mod target;
mod upstream;

#[cfg(test)]
mod tests;

pub use server::start_proxy;
pub use state::ProxyState;
pub use target::ProxyTarget;
pub use upstream::{UpstreamClient, UpstreamSettings};
