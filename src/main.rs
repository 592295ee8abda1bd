// AI Relay - transparent reverse proxy for AI chat APIs
//
// Forwards every inbound request to a single configured upstream and relays
// the answer. Requests that ask for `"stream": true` get their response
// relayed as server-sent events, line by line, as it arrives.
//
// Architecture:
// - Config: CLI > env > file > defaults, validated before anything starts
// - Proxy server (axum + hyper-util): routes, forwarding engine, SSE relay
// - Upstream client (reqwest): one pool shared by every request
// - Logging (tracing): stdout plus optional rolling JSON files

mod cli;
mod config;
mod logging;
mod proxy;
mod startup;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use config::Config;
use proxy::{ProxyState, ProxyTarget, UpstreamClient, UpstreamSettings};
use tokio::task::JoinError;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    // Handle CLI commands first (config --show, --path)
    // If a command was handled, exit early
    if cli::handle_command(&cli) {
        return Ok(());
    }

    // Ensure config template exists (helps users discover options)
    Config::ensure_config_exists();

    // Invalid configuration never gets as far as binding a socket
    let config = match Config::load(cli.overrides()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    // The guard must be kept alive for the duration of the program to ensure logs flush
    let _log_guard = logging::init(&config.logging);

    startup::print_startup(&config);
    startup::log_startup(&config);

    // The one upstream client for the whole process
    let upstream = Arc::new(
        UpstreamClient::new(UpstreamSettings::from(&config.upstream))
            .context("Failed to create upstream client")?,
    );
    let state = ProxyState::new(upstream.clone(), ProxyTarget::new(&config.target_api_url));

    // Create shutdown channel for graceful proxy shutdown
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

    let proxy_config = config.clone();
    let mut proxy_handle = tokio::spawn(async move {
        proxy::start_proxy(&proxy_config, state, shutdown_rx).await
    });

    let joined = tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::error!("Failed to listen for Ctrl+C: {}", e);
            }
            tracing::info!("Shutting down...");
            let _ = shutdown_tx.send(());
            // Wait for in-flight connections to finish
            (&mut proxy_handle).await
        }
        // The server only returns on its own if it failed to start
        result = &mut proxy_handle => result,
    };

    finish(&upstream, joined)
}

/// Log how the proxy task ended, then close the upstream pool exactly once.
fn finish(
    upstream: &UpstreamClient,
    joined: std::result::Result<Result<()>, JoinError>,
) -> Result<()> {
    let outcome = match joined {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            tracing::error!("Proxy failed: {:#}", e);
            Err(e)
        }
        Err(e) => {
            tracing::error!("Proxy task aborted: {}", e);
            Err(anyhow::Error::new(e).context("Proxy task aborted"))
        }
    };

    upstream.close();
    tracing::info!("Shutdown complete");
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    type Joined = std::result::Result<Result<()>, JoinError>;

    fn client() -> UpstreamClient {
        UpstreamClient::new(UpstreamSettings::default()).unwrap()
    }

    #[tokio::test]
    async fn test_finish_closes_upstream_after_panicked_task() {
        let upstream = client();
        let joined: Joined = tokio::spawn(async { panic!("boom") }).await;

        let outcome = finish(&upstream, joined);
        assert!(outcome.is_err());
        assert!(upstream.is_closed());
    }

    #[tokio::test]
    async fn test_finish_closes_upstream_after_failed_start() {
        let upstream = client();
        let joined: Joined = tokio::spawn(async { Err(anyhow::anyhow!("address in use")) }).await;

        let outcome = finish(&upstream, joined);
        assert_eq!(outcome.unwrap_err().to_string(), "address in use");
        assert!(upstream.is_closed());
    }

    #[tokio::test]
    async fn test_finish_after_clean_shutdown() {
        let upstream = client();
        let joined: Joined = tokio::spawn(async { Ok(()) }).await;

        assert!(finish(&upstream, joined).is_ok());
        assert!(upstream.is_closed());
    }
}
