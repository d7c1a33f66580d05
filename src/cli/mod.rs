//! CLI subcommand definitions and handlers.
//!
//! Uses clap derive to define the subcommand hierarchy:
//! - `start` (default) -- start the poll server
//! - `config show|path` -- inspect configuration
//! - `version` -- print build/version info

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use crate::config::{self, Config};
use crate::logging;
use crate::server;

/// Live classroom polling server.
#[derive(Parser, Debug)]
#[command(
    name = "classpoll",
    version = env!("CARGO_PKG_VERSION"),
    about = "classpoll: live classroom polls over WebSocket"
)]
pub struct Cli {
    /// Path to the JSON5 config file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Listen host, overriding config and environment.
    #[arg(long, global = true)]
    pub host: Option<String>,

    /// Listen port, overriding config and environment.
    #[arg(short, long, global = true)]
    pub port: Option<u16>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the poll server (default when no subcommand is given).
    Start,

    /// Inspect configuration.
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Print version, build date, and git commit information.
    Version,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the fully loaded configuration as JSON.
    Show,

    /// Print the resolved configuration file path.
    Path,
}

// ---------------------------------------------------------------------------
// Subcommand handlers
// ---------------------------------------------------------------------------

/// Dispatch the parsed command line.
pub async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        None | Some(Command::Start) => handle_start(&cli).await,
        Some(Command::Config(ConfigCommand::Show)) => handle_config_show(&cli),
        Some(Command::Config(ConfigCommand::Path)) => {
            handle_config_path(cli.config.as_deref());
            Ok(())
        }
        Some(Command::Version) => {
            handle_version();
            Ok(())
        }
    }
}

/// Load config and layer the command-line overrides on top.
pub fn resolve_config(cli: &Cli) -> Result<Config, config::ConfigError> {
    let mut cfg = config::load_config(cli.config.as_deref())?;
    if let Some(host) = &cli.host {
        cfg.server.host = host.clone();
    }
    if let Some(port) = cli.port {
        cfg.server.port = port;
    }
    cfg.validate()?;
    Ok(cfg)
}

/// Run the `start` subcommand.
pub async fn handle_start(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let cfg = resolve_config(cli)?;
    logging::init_logging(&cfg.logging)?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config::get_config_path(cli.config.as_deref()).display(),
        timeout_secs = cfg.poll.timeout_seconds,
        "starting classpoll"
    );
    server::run(cfg).await?;
    Ok(())
}

/// Run the `config show` subcommand.
pub fn handle_config_show(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let cfg = resolve_config(cli)?;
    println!("{}", serde_json::to_string_pretty(&cfg)?);
    Ok(())
}

/// Run the `config path` subcommand.
pub fn handle_config_path(explicit: Option<&Path>) {
    println!("{}", config::get_config_path(explicit).display());
}

/// Run the `version` subcommand.
pub fn handle_version() {
    println!("classpoll {}", env!("CARGO_PKG_VERSION"));
    println!("  Build date: {}", env!("CLASSPOLL_BUILD_DATE"));
    println!("  Git commit: {}", env!("CLASSPOLL_GIT_HASH"));
    println!(
        "  Platform:   {} ({})",
        std::env::consts::OS,
        std::env::consts::ARCH
    );
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
