use std::path::PathBuf;

/// Startup configuration problems. All of them are fatal: the process exits
/// before binding a socket.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("TARGET_API_URL must not be empty")]
    EmptyTargetUrl,

    #[error("port must be between 1 and 65535, got {0}")]
    PortOutOfRange(u32),

    #[error("invalid log level '{0}' (expected one of: debug, info, warning, error)")]
    InvalidLogLevel(String),

    #[error("{key} must be greater than 0, got {value}")]
    InvalidTimeout { key: &'static str, value: f64 },

    #[error("max_connections must be at least 1")]
    InvalidConnectionLimit,

    #[error("invalid value for {key}: '{value}'")]
    InvalidValue { key: &'static str, value: String },

    #[error("failed to parse config file {}: {message}", path.display())]
    FileParse { path: PathBuf, message: String },

    #[error("cannot read config file {}: {source}", path.display())]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
