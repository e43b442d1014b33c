//! convoy CLI, the main entry point.
//!
//! Commands:
//! - `serve`        Start the webhook gateway and the dispatcher
//! - `init-config`  Write a default config file
//! - `check-config` Load, validate, and summarize the config

use anyhow::Result;
use clap::{Parser, Subcommand};
use convoy_config::{AppConfig, LogFormat};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(
    name = "convoy",
    about = "convoy: chat orchestration for an LLM assistant",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (default: ~/.convoy/config.toml)
    #[arg(short, long, global = true, env = "CONVOY_CONFIG")]
    config: Option<PathBuf>,

    /// Log filter when RUST_LOG is unset (e.g. "debug", "convoy_agent=trace")
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Enable verbose logging (same as --log-level debug)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway and process incoming messages
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,

        /// Override the workflow mode ("inline" or "durable")
        #[arg(long)]
        mode: Option<String>,
    },

    /// Write a default configuration file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Validate the configuration and print a summary
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(AppConfig::default_path);

    match cli.command {
        Commands::InitConfig { force } => commands::config_cmd::init(&config_path, force),
        Commands::CheckConfig => commands::config_cmd::check(&config_path),
        Commands::Serve { port, mode } => {
            let config = commands::config_cmd::load(&config_path)?;
            let filter = if cli.verbose { "debug" } else { cli.log_level.as_str() };
            init_tracing(filter, config.logging.format);
            commands::serve::run(config, port, mode).await
        }
    }
}

fn init_tracing(default_filter: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}
