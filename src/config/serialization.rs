//! Config serialization to TOML
//!
//! Single source of truth for config file format.

use super::Config;

impl Config {
    /// Render the configuration as a commented TOML document.
    ///
    /// Used both for the first-run template and for `config --show`.
    pub fn to_toml(&self) -> String {
        let upstream = &self.upstream;
        let logging = &self.logging;

        format!(
            r#"# ai-relay configuration
#
# Precedence: command-line flags > environment variables > this file > defaults.
# Command-line flags only cover target_api_url, host, port and log_level.

# Upstream API every request is forwarded to (env: TARGET_API_URL)
target_api_url = {target:?}

# Listen address (env: HOST, PORT)
host = {host:?}
port = {port}

# debug, info, warning, error (env: LOG_LEVEL; RUST_LOG overrides for tracing filters)
log_level = {level:?}

[upstream]
# Total request timeout in seconds, including streamed bodies (env: TIMEOUT)
timeout = {timeout:?}
# Connect timeout in seconds; also the longest wait for a free connection (env: CONNECT_TIMEOUT)
connect_timeout = {connect_timeout:?}
# Connection pool bounds (env: MAX_CONNECTIONS, MAX_KEEPALIVE_CONNECTIONS)
max_connections = {max_connections}
max_keepalive_connections = {max_keepalive}
# Negotiate HTTP/2 when the upstream offers it (env: ENABLE_HTTP2)
enable_http2 = {http2}
# Verify upstream TLS certificates. Disabled by default to allow
# self-signed endpoints (env: VERIFY_SSL)
verify_ssl = {verify_ssl}

[logging]
# File logging (in addition to stdout)
file_enabled = {file_enabled}
file_dir = {file_dir:?}
file_rotation = "{file_rotation}"  # hourly, daily, never
file_prefix = {file_prefix:?}
"#,
            target = self.target_api_url,
            host = self.host,
            port = self.port,
            level = logging.level,
            timeout = upstream.timeout,
            connect_timeout = upstream.connect_timeout,
            max_connections = upstream.max_connections,
            max_keepalive = upstream.max_keepalive_connections,
            http2 = upstream.enable_http2,
            verify_ssl = upstream.verify_ssl,
            file_enabled = logging.file_enabled,
            file_dir = logging.file_dir.display().to_string(),
            file_rotation = logging.file_rotation.as_str(),
            file_prefix = logging.file_prefix,
        )
    }
}
