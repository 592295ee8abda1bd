// Startup module - displays banner and effective settings
//
// Printed once, after logging is initialized and before the listener is
// bound, so misconfiguration is visible before the first request arrives.

use crate::config::{Config, VERSION};

/// ANSI color codes for terminal output
mod colors {
    pub const RESET: &str = "\x1b[0m";
    pub const BOLD: &str = "\x1b[1m";
    pub const DIM: &str = "\x1b[2m";
    pub const CYAN: &str = "\x1b[36m";
    pub const GREEN: &str = "\x1b[32m";
    pub const YELLOW: &str = "\x1b[33m";
}

/// One line of the settings table
struct Setting {
    name: &'static str,
    value: String,
}

fn settings(config: &Config) -> Vec<Setting> {
    let upstream = &config.upstream;
    vec![
        Setting {
            name: "Target",
            value: config.target_api_url.clone(),
        },
        Setting {
            name: "Listen",
            value: format!("{}:{}", config.host, config.port),
        },
        Setting {
            name: "Timeouts",
            value: format!(
                "{}s request, {}s connect",
                upstream.timeout, upstream.connect_timeout
            ),
        },
        Setting {
            name: "Pool",
            value: format!(
                "{} max, {} keep-alive",
                upstream.max_connections, upstream.max_keepalive_connections
            ),
        },
        Setting {
            name: "HTTP/2",
            value: if upstream.enable_http2 { "on" } else { "off" }.to_string(),
        },
        Setting {
            name: "Log level",
            value: config.logging.level.clone(),
        },
    ]
}

/// Print the startup banner to stdout
pub fn print_startup(config: &Config) {
    use colors::*;

    println!();
    println!("  {BOLD}{CYAN}AI Relay{RESET} {DIM}v{VERSION}{RESET}");
    println!("  {DIM}Transparent reverse proxy for AI chat APIs{RESET}");
    println!();

    if let Some(path) = Config::config_path() {
        if path.exists() {
            println!("  {DIM}Config:{RESET} {GREEN}✓{RESET} {}", path.display());
        } else {
            println!("  {DIM}Config:{RESET} {DIM}(using defaults){RESET}");
        }
    }
    println!();

    for setting in settings(config) {
        println!("  {DIM}{:<10}{RESET} {}", setting.name, setting.value);
    }

    if !config.upstream.verify_ssl {
        println!();
        println!("  {YELLOW}▸ TLS certificate verification is disabled{RESET}");
    }
    if config.logging.file_enabled {
        println!(
            "  {DIM}▸ Logging to {}{RESET}",
            config.logging.file_dir.display()
        );
    }

    println!();
}

/// Write the same information to the log
pub fn log_startup(config: &Config) {
    tracing::info!("AI Relay v{}", VERSION);
    for setting in settings(config) {
        tracing::info!("  {}: {}", setting.name, setting.value);
    }

    if !config.upstream.verify_ssl {
        tracing::warn!("TLS certificate verification is disabled for upstream requests");
    }
}
