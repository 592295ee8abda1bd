//! Upstream client settings: timeouts, connection pool bounds, TLS and HTTP/2

use serde::Deserialize;
use std::time::Duration;

use super::{parse_env, parse_env_flag, ConfigError};

/// Upstream client configuration
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamConfig {
    /// Total request timeout in seconds (covers reading the whole body)
    pub timeout: f64,
    /// Connect timeout in seconds; also bounds the wait for a free pool slot
    pub connect_timeout: f64,
    /// Maximum concurrent upstream exchanges
    pub max_connections: usize,
    /// Maximum idle keep-alive connections kept in the pool
    pub max_keepalive_connections: usize,
    /// Prefer HTTP/2 when the upstream negotiates it
    pub enable_http2: bool,
    /// Verify upstream TLS certificates. Off by default so self-signed
    /// endpoints work; this trades transport security for reachability.
    pub verify_ssl: bool,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            timeout: 300.0,
            connect_timeout: 30.0,
            max_connections: 100,
            max_keepalive_connections: 20,
            enable_http2: true,
            verify_ssl: false,
        }
    }
}

/// Upstream settings as loaded from config file
#[derive(Debug, Deserialize, Default)]
pub struct FileUpstream {
    pub timeout: Option<f64>,
    pub connect_timeout: Option<f64>,
    pub max_connections: Option<usize>,
    pub max_keepalive_connections: Option<usize>,
    pub enable_http2: Option<bool>,
    pub verify_ssl: Option<bool>,
}

impl UpstreamConfig {
    /// env > file > default for every field
    pub fn from_sources<F>(file: Option<FileUpstream>, env: &F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let file = file.unwrap_or_default();

        Ok(Self {
            timeout: parse_env(env, "TIMEOUT")?
                .or(file.timeout)
                .unwrap_or(defaults.timeout),
            connect_timeout: parse_env(env, "CONNECT_TIMEOUT")?
                .or(file.connect_timeout)
                .unwrap_or(defaults.connect_timeout),
            max_connections: parse_env(env, "MAX_CONNECTIONS")?
                .or(file.max_connections)
                .unwrap_or(defaults.max_connections),
            max_keepalive_connections: parse_env(env, "MAX_KEEPALIVE_CONNECTIONS")?
                .or(file.max_keepalive_connections)
                .unwrap_or(defaults.max_keepalive_connections),
            enable_http2: parse_env_flag(env, "ENABLE_HTTP2")
                .or(file.enable_http2)
                .unwrap_or(defaults.enable_http2),
            verify_ssl: parse_env_flag(env, "VERIFY_SSL")
                .or(file.verify_ssl)
                .unwrap_or(defaults.verify_ssl),
        })
    }

    pub fn request_timeout(&self) -> Duration {
        seconds(self.timeout)
    }

    pub fn connect_timeout(&self) -> Duration {
        seconds(self.connect_timeout)
    }
}

/// Validated seconds to a Duration; absurdly large values saturate
fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::MAX)
}
