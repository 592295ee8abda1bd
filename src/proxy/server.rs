//! Proxy server setup and the connection loop

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    routing::{on, MethodFilter},
    Router,
};
use futures::FutureExt;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder;
use hyper_util::service::TowerToHyperService;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, watch};

use crate::config::Config;

use super::handlers::{health_check, proxy_handler};
use super::state::ProxyState;

/// Methods the relay accepts; anything else gets 405
fn accepted_methods() -> MethodFilter {
    MethodFilter::GET
        .or(MethodFilter::POST)
        .or(MethodFilter::PUT)
        .or(MethodFilter::DELETE)
        .or(MethodFilter::PATCH)
        .or(MethodFilter::HEAD)
        .or(MethodFilter::OPTIONS)
}

/// Build the router: `/health` answered locally, every other path forwarded
pub fn build_router(state: ProxyState) -> Router {
    Router::new()
        .route("/health", on(accepted_methods(), health_check))
        .route("/", on(accepted_methods(), proxy_handler))
        .route("/*path", on(accepted_methods(), proxy_handler))
        .with_state(state)
}

/// Start the proxy server and run it until `shutdown_rx` fires
pub async fn start_proxy(
    config: &Config,
    state: ProxyState,
    shutdown_rx: oneshot::Receiver<()>,
) -> Result<()> {
    let (host, port) = config.listen_addr()?;
    tracing::info!(
        "Forwarding to {} ({} upstream connections max)",
        state.target,
        state.upstream.max_connections()
    );
    let app = build_router(state);

    tracing::info!("Starting proxy on {}:{}", host, port);

    let listener = TcpListener::bind((host, port))
        .await
        .with_context(|| format!("Failed to bind to {}:{}", host, port))?;

    tracing::info!("Proxy listening on {}", listener.local_addr()?);

    serve(listener, app, shutdown_rx).await?;

    tracing::info!("Proxy server shut down gracefully");
    Ok(())
}

/// Accept connections until shutdown, then wait for open connections to drain.
///
/// HTTP/1 responses are written with title-case header names
/// (`Content-Type`), HTTP/2 is negotiated per connection.
pub async fn serve(
    listener: TcpListener,
    app: Router,
    mut shutdown_rx: oneshot::Receiver<()>,
) -> Result<()> {
    // Dropping signal_rx tells every connection to finish up; close_tx
    // resolves once every connection task has dropped its close_rx.
    let (signal_tx, signal_rx) = watch::channel(());
    let signal_tx = Arc::new(signal_tx);
    let (close_tx, close_rx) = watch::channel(());

    loop {
        let (stream, remote) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::warn!("Failed to accept connection: {}", e);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    continue;
                }
            },
            _ = &mut shutdown_rx => {
                tracing::info!("Shutdown signal received, no longer accepting connections");
                break;
            }
        };

        tracing::trace!("Accepted connection from {}", remote);

        let service = TowerToHyperService::new(app.clone());
        let signal_tx = Arc::clone(&signal_tx);
        let close_rx = close_rx.clone();

        tokio::spawn(async move {
            let mut builder = Builder::new(TokioExecutor::new());
            builder.http1().title_case_headers(true);

            let conn = builder.serve_connection(TokioIo::new(stream), service);
            tokio::pin!(conn);

            let shutting_down = signal_tx.closed().fuse();
            tokio::pin!(shutting_down);

            loop {
                tokio::select! {
                    result = conn.as_mut() => {
                        if let Err(e) = result {
                            tracing::debug!("Connection from {} ended with error: {}", remote, e);
                        }
                        break;
                    }
                    _ = &mut shutting_down => {
                        conn.as_mut().graceful_shutdown();
                    }
                }
            }

            drop(close_rx);
        });
    }

    drop(signal_rx);
    drop(close_rx);
    drop(listener);

    let open = close_tx.receiver_count();
    if open > 0 {
        tracing::info!("Waiting for {} open connection(s) to finish", open);
    }
    close_tx.closed().await;

    Ok(())
}
