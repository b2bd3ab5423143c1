//! VOID Omega CLI
//!
//! Runs the tool server or a single resolve, search or chat from the shell.

mod commands;

use std::path::Path;

use clap::Parser;
use omega_core::config::OmegaConfig;
use omega_core::tracing_setup::{CliLogLevel, init_tracing};

#[derive(Parser)]
#[command(name = "omega")]
#[command(about = "Media discovery gateway with tiered stream resolution")]
struct Cli {
    /// Console log level
    #[arg(long, global = true, default_value_t = CliLogLevel::Info)]
    log_level: CliLogLevel,

    #[command(subcommand)]
    command: commands::Commands,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_tracing_level(), Some(Path::new("logs")))?;

    let config = OmegaConfig::load();
    commands::handle_command(cli.command, config).await
}
