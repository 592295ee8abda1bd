//! Configuration for the relay
//!
//! Configuration is loaded in order of precedence:
//! 1. Command-line flags (target URL, host, port, log level only)
//! 2. Environment variables
//! 3. Config file (~/.config/ai-relay/config.toml)
//! 4. Built-in defaults (lowest priority)
//!
//! Everything is validated once, before any socket is opened.

use serde::Deserialize;
use std::path::{Path, PathBuf};

// ─────────────────────────────────────────────────────────────────────────────
// Submodules
// ─────────────────────────────────────────────────────────────────────────────

mod error;
mod observability;
mod serialization;
mod upstream;


// ─────────────────────────────────────────────────────────────────────────────
// Re-exports (maintain public API)
// ─────────────────────────────────────────────────────────────────────────────

pub use error::ConfigError;
pub use observability::{FileLogging, LogRotation, LoggingConfig, LOG_LEVELS};
pub use upstream::{FileUpstream, UpstreamConfig};

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Upstream used when nothing else is configured
pub const DEFAULT_TARGET_URL: &str = "https://api.deepseek.com/v1";

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u32 = 8000;

// ─────────────────────────────────────────────────────────────────────────────
// Application Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the single upstream API
    pub target_api_url: String,

    /// Interface to listen on
    pub host: String,

    /// Port to listen on. Kept wider than `u16` so out-of-range input
    /// reaches validation instead of wrapping.
    pub port: u32,

    /// Logging configuration (level, optional file output)
    pub logging: LoggingConfig,

    /// Upstream client settings (timeouts, pool bounds, TLS, HTTP/2)
    pub upstream: UpstreamConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            target_api_url: DEFAULT_TARGET_URL.to_string(),
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            logging: LoggingConfig::default(),
            upstream: UpstreamConfig::default(),
        }
    }
}

/// Values given on the command line. Only these four keys can be overridden
/// from the CLI; everything else comes from the environment or the file.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub target_api_url: Option<String>,
    pub host: Option<String>,
    pub port: Option<u32>,
    pub log_level: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// File Configuration (deserialization layer)
// ─────────────────────────────────────────────────────────────────────────────

/// Config file structure
#[derive(Debug, Deserialize, Default)]
pub(crate) struct FileConfig {
    pub target_api_url: Option<String>,
    pub host: Option<String>,
    pub port: Option<u32>,
    pub log_level: Option<String>,

    /// Optional [upstream] section
    pub upstream: Option<FileUpstream>,

    /// Optional [logging] section
    pub logging: Option<FileLogging>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Configuration Loading
// ─────────────────────────────────────────────────────────────────────────────

impl Config {
    /// Get the config file path: ~/.config/ai-relay/config.toml
    /// Uses Unix-style ~/.config on all platforms for consistency
    pub fn config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|p| p.join(".config").join("ai-relay").join("config.toml"))
    }

    /// Create config file with defaults if it doesn't exist
    /// Called during startup to help users discover configuration options
    pub fn ensure_config_exists() {
        let Some(path) = Self::config_path() else {
            return;
        };

        if path.exists() {
            return;
        }

        if let Some(parent) = path.parent() {
            if std::fs::create_dir_all(parent).is_err() {
                return; // Config is optional
            }
        }

        let _ = std::fs::write(&path, Self::default().to_toml());
    }

    /// Load and validate configuration from CLI overrides, the process
    /// environment and the config file.
    pub fn load(cli: CliOverrides) -> Result<Self, ConfigError> {
        let file = match Self::config_path() {
            Some(path) => Self::read_file_config(&path)?,
            None => FileConfig::default(),
        };

        let config = Self::from_sources(file, |key| std::env::var(key).ok(), cli)?;
        config.validate()?;
        Ok(config)
    }

    /// Read the config file if it exists.
    ///
    /// A missing file means defaults. A file that exists but can't be read or
    /// parsed is an error: a broken config should fail fast, not silently fall
    /// back to defaults while the user debugs the wrong thing.
    pub(crate) fn read_file_config(path: &Path) -> Result<FileConfig, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).map_err(|e| ConfigError::FileParse {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(FileConfig::default()),
            Err(e) => Err(ConfigError::FileRead {
                path: path.to_path_buf(),
                source: e,
            }),
        }
    }

    /// Merge the three sources: cli > env > file > defaults.
    ///
    /// `env` is a lookup function so tests can supply variables without
    /// touching the process environment.
    pub(crate) fn from_sources<F>(
        file: FileConfig,
        env: F,
        cli: CliOverrides,
    ) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let target_api_url = cli
            .target_api_url
            .or_else(|| env("TARGET_API_URL"))
            .or(file.target_api_url)
            .unwrap_or_else(|| DEFAULT_TARGET_URL.to_string());

        let host = cli
            .host
            .or_else(|| env("HOST"))
            .or(file.host)
            .unwrap_or_else(|| DEFAULT_HOST.to_string());

        let port = match cli.port {
            Some(port) => port,
            None => parse_env(&env, "PORT")?
                .or(file.port)
                .unwrap_or(DEFAULT_PORT),
        };

        let log_level = cli
            .log_level
            .or_else(|| env("LOG_LEVEL"))
            .or(file.log_level);

        let logging = LoggingConfig::from_file(file.logging, log_level);
        let upstream = UpstreamConfig::from_sources(file.upstream, &env)?;

        Ok(Self {
            target_api_url,
            host,
            port,
            logging,
            upstream,
        })
    }

    /// Reject configurations the relay can't run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target_api_url.trim().is_empty() {
            return Err(ConfigError::EmptyTargetUrl);
        }

        if !(1..=65535).contains(&self.port) {
            return Err(ConfigError::PortOutOfRange(self.port));
        }

        if !LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.logging.level.clone()));
        }

        // `!(x > 0.0)` also catches NaN
        if !(self.upstream.timeout > 0.0) || !self.upstream.timeout.is_finite() {
            return Err(ConfigError::InvalidTimeout {
                key: "timeout",
                value: self.upstream.timeout,
            });
        }

        if !(self.upstream.connect_timeout > 0.0) || !self.upstream.connect_timeout.is_finite() {
            return Err(ConfigError::InvalidTimeout {
                key: "connect_timeout",
                value: self.upstream.connect_timeout,
            });
        }

        if self.upstream.max_connections == 0 {
            return Err(ConfigError::InvalidConnectionLimit);
        }

        Ok(())
    }

    /// Host and port to bind. Only meaningful after `validate()`.
    pub fn listen_addr(&self) -> Result<(&str, u16), ConfigError> {
        let port = u16::try_from(self.port).map_err(|_| ConfigError::PortOutOfRange(self.port))?;
        Ok((self.host.as_str(), port))
    }
}

/// Parse an optional env var, failing on values that are present but malformed
pub(crate) fn parse_env<F, T>(env: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match env(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { key, value: raw }),
    }
}

/// Boolean env flags accept `1` or `true` (any case); anything else is false
pub(crate) fn parse_env_flag<F>(env: &F, key: &str) -> Option<bool>
where
    F: Fn(&str) -> Option<String>,
{
    env(key).map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}
