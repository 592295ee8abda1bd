// CLI module - command-line argument parsing and handlers
//
// Top-level flags override the four most commonly changed settings. The
// `config` subcommand inspects configuration without starting the relay:
// - config --show: Display effective configuration as TOML
// - config --path: Show config file path

use crate::config::{CliOverrides, Config, VERSION};
use clap::{Parser, Subcommand};

/// AI Relay - transparent reverse proxy for AI chat APIs
#[derive(Parser, Debug)]
#[command(name = "ai-relay")]
#[command(version = VERSION)]
#[command(about = "Transparent reverse proxy for AI chat APIs", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Upstream base URL (overrides TARGET_API_URL)
    #[arg(long, value_name = "URL")]
    pub target_url: Option<String>,

    /// Interface to listen on (overrides HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on (overrides PORT)
    #[arg(long)]
    pub port: Option<u32>,

    /// debug, info, warning or error (overrides LOG_LEVEL)
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Inspect configuration
    Config {
        /// Show effective configuration
        #[arg(long)]
        show: bool,

        /// Show config file path
        #[arg(long)]
        path: bool,
    },
}

impl Cli {
    /// The flags that take precedence over env and file
    pub fn overrides(&self) -> CliOverrides {
        CliOverrides {
            target_api_url: self.target_url.clone(),
            host: self.host.clone(),
            port: self.port,
            log_level: self.log_level.clone(),
        }
    }
}

/// Handle CLI subcommands. Returns true if a command was handled (exit after).
pub fn handle_command(cli: &Cli) -> bool {
    match &cli.command {
        Some(Commands::Config { show, path }) => {
            if *path {
                handle_config_path();
            } else if *show {
                handle_config_show(cli.overrides());
            } else {
                // No flag provided, show help
                println!("Usage: ai-relay config [--show|--path]");
                println!();
                println!("Options:");
                println!("  --show    Display effective configuration");
                println!("  --path    Show config file path");
            }
            true
        }
        None => false, // No subcommand, run the relay
    }
}

fn handle_config_path() {
    match Config::config_path() {
        Some(path) => println!("{}", path.display()),
        None => {
            eprintln!("Error: Could not determine config path");
            std::process::exit(1);
        }
    }
}

fn handle_config_show(overrides: CliOverrides) {
    let config = match Config::load(overrides) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    println!("# Effective configuration (cli > env > file > defaults)");
    if let Some(path) = Config::config_path() {
        if path.exists() {
            println!("# Source: {}", path.display());
        } else {
            println!("# Source: defaults (no config file)");
        }
    }
    println!();
    print!("{}", config.to_toml());
}
